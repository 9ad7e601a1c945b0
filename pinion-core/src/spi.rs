//! SPI master
//!
//! Chip select is either driven by the controller ([`HardwareCs`]) or by
//! any [`OutputPin`] the wrapper toggles itself: low before each transfer,
//! high after it, also when the transfer fails.

use alloc::vec::Vec;

use embedded_hal::digital::OutputPin;
use pinion_hal::spi::{OP_MODE_CPHA, OP_MODE_CPOL, OP_TRANSFER_LSB, OP_WORD_SIZE_8};
use pinion_hal::SpiHal;

use crate::cache::Cached;
use crate::error::{check, check_len, span, Error, Invalid, Peripheral, Result};
use crate::handle::{open_device, Owned};

/// Clock idle level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Polarity {
    #[default]
    IdleLow,
    IdleHigh,
}

/// Clock edge on which data is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    #[default]
    CaptureOnFirstTransition,
    CaptureOnSecondTransition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

/// Bus settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpiConfig {
    pub speed_hz: u32,
    pub polarity: Polarity,
    pub phase: Phase,
    pub bit_order: BitOrder,
    /// Clock one dummy byte in after every reconfiguration so the
    /// controller settles on the new clock before the next transfer
    pub resync_after_config: bool,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            speed_hz: 5_000_000,
            polarity: Polarity::IdleLow,
            phase: Phase::CaptureOnFirstTransition,
            bit_order: BitOrder::MsbFirst,
            resync_after_config: true,
        }
    }
}

impl SpiConfig {
    /// Native operation word
    pub fn operation(&self) -> u16 {
        let mut op = OP_WORD_SIZE_8;
        if self.polarity == Polarity::IdleHigh {
            op |= OP_MODE_CPOL;
        }
        if self.phase == Phase::CaptureOnSecondTransition {
            op |= OP_MODE_CPHA;
        }
        if self.bit_order == BitOrder::LsbFirst {
            op |= OP_TRANSFER_LSB;
        }
        op
    }

    fn validate(&self) -> Result<()> {
        if self.speed_hz == 0 {
            warn!("SPI clock must be non-zero");
            return Err(Error::InvalidArgument(Invalid::Speed));
        }
        Ok(())
    }
}

/// Chip select handled by the SPI controller
#[derive(Debug, Clone, Copy, Default)]
pub struct HardwareCs;

impl embedded_hal::digital::ErrorType for HardwareCs {
    type Error = Error;
}

impl OutputPin for HardwareCs {
    fn set_low(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct Spi<H: SpiHal, CS: OutputPin<Error = Error> = HardwareCs> {
    handle: Owned<H>,
    id: u8,
    config: Cached<SpiConfig>,
    cs: CS,
}

impl<H: SpiHal> Spi<H> {
    /// Open bus `id` with controller-driven chip select
    pub fn new(hal: &H, id: u8, config: SpiConfig) -> Result<Self> {
        Spi::with_cs(hal, id, config, HardwareCs)
    }
}

impl<H: SpiHal, CS: OutputPin<Error = Error>> Spi<H, CS> {
    /// Open bus `id`, toggling `cs` around every transfer
    pub fn with_cs(hal: &H, id: u8, config: SpiConfig, mut cs: CS) -> Result<Self> {
        config.validate()?;
        cs.set_high()?;
        let handle = open_device(
            hal,
            Peripheral::Spi,
            id,
            hal.spi_device_count(),
            |hal| hal.spi_open(id, config.speed_hz, config.operation()),
            H::spi_close,
        )?;
        Ok(Self {
            handle,
            id,
            config: Cached::new(config),
            cs,
        })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn config(&self) -> SpiConfig {
        self.config.get()
    }

    /// Apply new settings
    ///
    /// When `resync_after_config` is set a one-byte dummy read follows a
    /// successful reconfiguration. The new settings stay in effect even if
    /// that read fails.
    pub fn set_config(&mut self, config: SpiConfig) -> Result<()> {
        config.validate()?;
        let handle = &self.handle;
        self.config.update(config, |c| {
            check(handle.hal().spi_configure(handle.raw(), c.speed_hz, c.operation())).map(|_| ())
        })?;
        if config.resync_after_config {
            let mut dummy = [0u8; 1];
            self.read(&mut dummy, None)?;
        }
        Ok(())
    }

    pub fn set_speed(&mut self, speed_hz: u32) -> Result<()> {
        let mut config = self.config.get();
        config.speed_hz = speed_hz;
        self.set_config(config)
    }

    pub fn set_mode(&mut self, polarity: Polarity, phase: Phase) -> Result<()> {
        let mut config = self.config.get();
        config.polarity = polarity;
        config.phase = phase;
        self.set_config(config)
    }

    pub fn set_bit_order(&mut self, bit_order: BitOrder) -> Result<()> {
        let mut config = self.config.get();
        config.bit_order = bit_order;
        self.set_config(config)
    }

    /// Send `data[..count]`
    pub fn write(&mut self, data: &[u8], count: Option<usize>) -> Result<()> {
        let n = span(data.len(), count)?;
        self.transaction(|hal, raw| check(hal.spi_write(raw, &data[..n])).map(|_| ()))
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte], None)
    }

    /// Clock in `count` bytes into the start of `buf`
    pub fn read(&mut self, buf: &mut [u8], count: Option<usize>) -> Result<usize> {
        let n = span(buf.len(), count)?;
        self.transaction(|hal, raw| check_len(hal.spi_read(raw, &mut buf[..n])))
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read(&mut byte, None)?;
        Ok(byte[0])
    }

    /// Full-duplex transfer
    pub fn transceive(
        &mut self,
        write: &[u8],
        write_count: Option<usize>,
        read: &mut [u8],
        read_count: Option<usize>,
    ) -> Result<usize> {
        let w = span(write.len(), write_count)?;
        let r = span(read.len(), read_count)?;
        self.transaction(|hal, raw| check_len(hal.spi_transceive(raw, &write[..w], &mut read[..r])))
    }

    /// Release the bus, handing back the chip select pin
    pub fn release(self) -> (Result<()>, CS) {
        (self.handle.close(), self.cs)
    }

    fn transaction<T>(&mut self, op: impl FnOnce(&H, H::Handle) -> Result<T>) -> Result<T> {
        self.cs.set_low()?;
        let result = op(self.handle.hal(), self.handle.raw());
        let deselect = self.cs.set_high();
        let value = result?;
        deselect?;
        Ok(value)
    }
}

impl<H: SpiHal, CS: OutputPin<Error = Error>> embedded_hal::spi::ErrorType for Spi<H, CS> {
    type Error = Error;
}

impl<H: SpiHal, CS: OutputPin<Error = Error>> embedded_hal::spi::SpiBus<u8> for Spi<H, CS> {
    fn read(&mut self, words: &mut [u8]) -> Result<()> {
        Spi::read(self, words, None).map(|_| ())
    }

    fn write(&mut self, words: &[u8]) -> Result<()> {
        Spi::write(self, words, None)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<()> {
        self.transceive(write, None, read, None).map(|_| ())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<()> {
        let out: Vec<u8> = words.to_vec();
        self.transceive(&out, None, words, None).map(|_| ())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::{DigitalOut, PinMode};
    use pinion_hal::Errno;
    use pinion_hal_sim::{SimHal, SpiOp};

    #[test]
    fn test_operation_word() {
        let config = SpiConfig {
            polarity: Polarity::IdleHigh,
            phase: Phase::CaptureOnSecondTransition,
            bit_order: BitOrder::LsbFirst,
            ..SpiConfig::default()
        };
        assert_eq!(
            config.operation(),
            OP_WORD_SIZE_8 | OP_MODE_CPOL | OP_MODE_CPHA | OP_TRANSFER_LSB
        );
        assert_eq!(SpiConfig::default().operation(), OP_WORD_SIZE_8);
    }

    #[test]
    fn test_software_cs_wraps_each_transfer() {
        let sim = SimHal::new();
        let cs = DigitalOut::new(&sim, 0, PinMode::PullUp, true).unwrap();
        let mut spi = Spi::with_cs(&sim, 0, SpiConfig::default(), cs).unwrap();
        sim.reset_calls();

        spi.write(&[0xAA, 0x55], None).unwrap();
        let mut buf = [0u8; 2];
        spi.transceive(&[0x9F], None, &mut buf, None).unwrap();

        assert_eq!(
            sim.call_log(),
            [
                "gpio_set",
                "spi_write",
                "gpio_set",
                "gpio_set",
                "spi_transceive",
                "gpio_set"
            ]
        );
        assert!(sim.gpio_state(0).unwrap().level);
    }

    #[test]
    fn test_software_cs_released_on_failure() {
        let sim = SimHal::new();
        let cs = DigitalOut::new(&sim, 1, PinMode::PullUp, true).unwrap();
        let mut spi = Spi::with_cs(&sim, 0, SpiConfig::default(), cs).unwrap();
        sim.fail_next("spi_write", Errno::EIO);
        assert_eq!(spi.write(&[1], None), Err(Error::Hal(Errno::EIO)));
        assert!(sim.gpio_state(1).unwrap().level);

        let (closed, cs) = spi.release();
        closed.unwrap();
        assert!(cs.level());
    }

    #[test]
    fn test_reconfigure_resyncs() {
        let sim = SimHal::new();
        let mut spi = Spi::new(&sim, 0, SpiConfig::default()).unwrap();
        spi.set_speed(1_000_000).unwrap();
        assert_eq!(
            sim.spi_settings(0),
            Some((1_000_000, OP_WORD_SIZE_8))
        );
        assert_eq!(sim.spi_log(0), [SpiOp::Read(1)]);

        let config = SpiConfig {
            resync_after_config: false,
            ..spi.config()
        };
        spi.set_config(config).unwrap();
        spi.set_bit_order(BitOrder::LsbFirst).unwrap();
        assert_eq!(sim.spi_log(0), [SpiOp::Read(1)]);
    }

    #[test]
    fn test_reconfigure_rollback() {
        let sim = SimHal::new();
        let mut spi = Spi::new(&sim, 0, SpiConfig::default()).unwrap();
        sim.fail_next("spi_configure", Errno::EIO);
        assert!(spi.set_mode(Polarity::IdleHigh, Phase::CaptureOnSecondTransition).is_err());
        assert_eq!(spi.config(), SpiConfig::default());
        assert_eq!(sim.calls("spi_read"), 0);
        assert_eq!(spi.set_speed(0), Err(Error::InvalidArgument(Invalid::Speed)));
    }

    #[test]
    fn test_count_validation() {
        let sim = SimHal::new();
        let mut spi = Spi::new(&sim, 0, SpiConfig::default()).unwrap();
        let mut buf = [0u8; 3];
        assert!(spi.read(&mut buf, Some(4)).is_err());
        assert!(spi.write(&[1, 2], Some(3)).is_err());
        assert!(spi.transceive(&[1], None, &mut buf, Some(9)).is_err());
        assert_eq!(sim.calls("spi_read"), 0);
        assert_eq!(sim.calls("spi_write"), 0);
        assert_eq!(sim.calls("spi_transceive"), 0);

        sim.spi_respond(0, &[7, 8]);
        assert_eq!(spi.read(&mut buf, Some(2)).unwrap(), 2);
        assert_eq!(buf, [7, 8, 0]);
    }

    #[test]
    fn test_spi_bus_transfer_in_place() {
        use embedded_hal::spi::SpiBus;
        let sim = SimHal::new();
        let mut spi = Spi::new(&sim, 0, SpiConfig::default()).unwrap();
        sim.spi_respond(0, &[0x10, 0x20]);
        let mut words = [0x01, 0x02];
        spi.transfer_in_place(&mut words).unwrap();
        assert_eq!(words, [0x10, 0x20]);
        assert_eq!(sim.spi_log(0), [SpiOp::Transceive([0x01, 0x02].to_vec(), 2)]);
    }
}
