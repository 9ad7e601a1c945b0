//! UART

use pinion_hal::uart::RawUartConfig;
use pinion_hal::{Timeout, UartHal};

pub use pinion_hal::uart::{DataBits, Parity, StopBits};

use crate::cache::Cached;
use crate::error::{check, check_len, span, Error, Invalid, Peripheral, Result};
use crate::handle::{open_device, Owned};

/// Line settings and receive buffer size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UartConfig {
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub data_bits: DataBits,
    /// Native receive ring size in bytes
    pub read_buf_len: u32,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            parity: Parity::None,
            stop_bits: StopBits::One,
            data_bits: DataBits::Eight,
            read_buf_len: 1024,
        }
    }
}

impl UartConfig {
    fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            warn!("UART baud rate must be non-zero");
            return Err(Error::InvalidArgument(Invalid::Speed));
        }
        if self.read_buf_len == 0 {
            warn!("UART receive buffer must be non-empty");
            return Err(Error::InvalidArgument(Invalid::BufferLength));
        }
        Ok(())
    }

    fn raw(&self) -> RawUartConfig {
        RawUartConfig {
            baud_rate: self.baud_rate,
            parity: self.parity,
            stop_bits: self.stop_bits,
            data_bits: self.data_bits,
            read_buf_len: self.read_buf_len,
        }
    }
}

pub struct Uart<H: UartHal> {
    handle: Owned<H>,
    id: u8,
    config: Cached<UartConfig>,
}

impl<H: UartHal> Uart<H> {
    pub fn new(hal: &H, id: u8, config: UartConfig) -> Result<Self> {
        config.validate()?;
        let raw = config.raw();
        let handle = open_device(
            hal,
            Peripheral::Uart,
            id,
            hal.uart_device_count(),
            |hal| hal.uart_open(id, &raw),
            H::uart_close,
        )?;
        Ok(Self {
            handle,
            id,
            config: Cached::new(config),
        })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn config(&self) -> UartConfig {
        self.config.get()
    }

    pub fn set_config(&mut self, config: UartConfig) -> Result<()> {
        config.validate()?;
        let handle = &self.handle;
        self.config.update(config, |c| {
            check(handle.hal().uart_configure(handle.raw(), &c.raw())).map(|_| ())
        })
    }

    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.set_config(UartConfig {
            baud_rate,
            ..self.config.get()
        })
    }

    pub fn set_parity(&mut self, parity: Parity) -> Result<()> {
        self.set_config(UartConfig {
            parity,
            ..self.config.get()
        })
    }

    pub fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<()> {
        self.set_config(UartConfig {
            stop_bits,
            ..self.config.get()
        })
    }

    pub fn set_data_bits(&mut self, data_bits: DataBits) -> Result<()> {
        self.set_config(UartConfig {
            data_bits,
            ..self.config.get()
        })
    }

    /// Resize the receive ring
    pub fn set_read_buf_len(&mut self, read_buf_len: u32) -> Result<()> {
        self.set_config(UartConfig {
            read_buf_len,
            ..self.config.get()
        })
    }

    /// Send `data[..count]`, returning the bytes queued
    pub fn write(&mut self, data: &[u8], count: Option<usize>) -> Result<usize> {
        let n = span(data.len(), count)?;
        check_len(self.handle.hal().uart_write(self.handle.raw(), &data[..n]))
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        check(self.handle.hal().uart_put_byte(self.handle.raw(), byte)).map(|_| ())
    }

    /// Receive up to `count` bytes into the start of `buf`
    pub fn read(&mut self, buf: &mut [u8], count: Option<usize>, timeout: Timeout) -> Result<usize> {
        let n = span(buf.len(), count)?;
        check_len(
            self.handle
                .hal()
                .uart_read(self.handle.raw(), &mut buf[..n], timeout.as_raw()),
        )
    }

    pub fn read_byte(&mut self, timeout: Timeout) -> Result<u8> {
        let ret = self
            .handle
            .hal()
            .uart_get_byte(self.handle.raw(), timeout.as_raw());
        check(ret).map(|b| b as u8)
    }

    /// Bytes waiting in the receive ring
    pub fn available(&self) -> Result<usize> {
        check_len(self.handle.hal().uart_available(self.handle.raw()))
    }

    /// Drop everything in the receive ring
    pub fn clear_buffer(&mut self) -> Result<()> {
        check(self.handle.hal().uart_clear(self.handle.raw())).map(|_| ())
    }

    pub fn close(self) -> Result<()> {
        self.handle.close()
    }
}

impl<H: UartHal> embedded_io::ErrorType for Uart<H> {
    type Error = Error;
}

impl<H: UartHal> embedded_io::Read for Uart<H> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Uart::read(self, buf, None, Timeout::Forever)
    }
}

impl<H: UartHal> embedded_io::Write for Uart<H> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Uart::write(self, buf, None)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinion_hal::Errno;
    use pinion_hal_sim::SimHal;

    #[test]
    fn test_open_pushes_config() {
        let sim = SimHal::new();
        let _uart = Uart::new(&sim, 1, UartConfig::default()).unwrap();
        let raw = sim.uart_config(1).unwrap();
        assert_eq!(raw.baud_rate, 115_200);
        assert_eq!(raw.read_buf_len, 1024);
    }

    #[test]
    fn test_invalid_config_never_opens() {
        let sim = SimHal::new();
        let config = UartConfig {
            baud_rate: 0,
            ..UartConfig::default()
        };
        assert_eq!(
            Uart::new(&sim, 0, config).err(),
            Some(Error::InvalidArgument(Invalid::Speed))
        );
        assert_eq!(sim.calls("uart_open"), 0);
    }

    #[test]
    fn test_config_rollback() {
        let sim = SimHal::new();
        let mut uart = Uart::new(&sim, 0, UartConfig::default()).unwrap();
        sim.fail_next("uart_configure", Errno::EIO);
        assert!(uart.set_baud_rate(9600).is_err());
        assert_eq!(uart.config().baud_rate, 115_200);
        uart.set_parity(Parity::Even).unwrap();
        assert_eq!(sim.uart_config(0).unwrap().parity, Parity::Even);
        assert_eq!(
            uart.set_read_buf_len(0),
            Err(Error::InvalidArgument(Invalid::BufferLength))
        );
    }

    #[test]
    fn test_byte_and_buffer_io() {
        let sim = SimHal::new();
        let mut uart = Uart::new(&sim, 0, UartConfig::default()).unwrap();
        uart.write(b"hello", Some(4)).unwrap();
        uart.write_byte(b'!').unwrap();
        assert_eq!(sim.uart_sent(0), b"hell!");

        sim.uart_feed(0, b"abc");
        assert_eq!(uart.available().unwrap(), 3);
        assert_eq!(uart.read_byte(Timeout::NoWait).unwrap(), b'a');
        let mut buf = [0u8; 8];
        assert_eq!(uart.read(&mut buf, None, Timeout::Millis(10)).unwrap(), 2);
        assert_eq!(&buf[..2], b"bc");
        assert_eq!(
            uart.read_byte(Timeout::NoWait),
            Err(Error::Hal(Errno::EAGAIN))
        );
    }

    #[test]
    fn test_clear_buffer() {
        let sim = SimHal::new();
        let mut uart = Uart::new(&sim, 0, UartConfig::default()).unwrap();
        sim.uart_feed(0, &[1, 2, 3]);
        uart.clear_buffer().unwrap();
        assert_eq!(uart.available().unwrap(), 0);
    }

    #[test]
    fn test_count_validation() {
        let sim = SimHal::new();
        let mut uart = Uart::new(&sim, 0, UartConfig::default()).unwrap();
        let mut buf = [0u8; 2];
        assert!(uart.read(&mut buf, Some(3), Timeout::NoWait).is_err());
        assert!(uart.write(&buf.clone(), Some(3)).is_err());
        assert_eq!(sim.calls("uart_read"), 0);
        assert_eq!(sim.calls("uart_write"), 0);
    }

    #[test]
    fn test_embedded_io() {
        use embedded_io::{Read, Write};
        let sim = SimHal::new();
        let mut uart = Uart::new(&sim, 2, UartConfig::default()).unwrap();
        uart.write_all(b"AT\r\n").unwrap();
        assert_eq!(sim.uart_sent(2), b"AT\r\n");
        sim.uart_feed(2, b"OK");
        let mut reply = [0u8; 2];
        uart.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"OK");
    }
}
