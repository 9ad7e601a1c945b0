//! Simulated UART ports
//!
//! The receive ring holds at most `read_buf_len` bytes; excess fed data is
//! dropped like a real overrun. Reads never block: with nothing buffered a
//! byte read times out with `EAGAIN` and a buffer read returns 0.

use std::collections::{HashMap, VecDeque};

use pinion_hal::uart::{RawUartConfig, UartHal};
use pinion_hal::Errno;

use crate::{enter, Peripheral, SimHal, SimHandle};

struct Port {
    id: u8,
    config: RawUartConfig,
    tx: Vec<u8>,
    rx: VecDeque<u8>,
}

#[derive(Default)]
pub(crate) struct UartBank {
    ports: HashMap<SimHandle, Port>,
}

impl UartBank {
    pub(crate) fn len(&self) -> usize {
        self.ports.len()
    }

    fn by_id(&mut self, id: u8) -> Option<&mut Port> {
        self.ports.values_mut().find(|p| p.id == id)
    }
}

macro_rules! port {
    ($state:expr, $handle:expr) => {
        match $state.uart.ports.get_mut(&$handle) {
            Some(p) => p,
            None => return $state.bad_handle(),
        }
    };
}

fn valid(config: &RawUartConfig) -> bool {
    config.baud_rate > 0 && config.read_buf_len > 0
}

fn count(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

impl UartHal for SimHal {
    fn uart_device_count(&self) -> u32 {
        self.lock().device_count(Peripheral::Uart)
    }

    fn uart_open(&self, id: u8, config: &RawUartConfig) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "uart_open", None);
        if !s.has_device(Peripheral::Uart, id) || s.uart.by_id(id).is_some() || !valid(config) {
            return None;
        }
        let handle = s.alloc();
        s.uart.ports.insert(
            handle,
            Port {
                id,
                config: *config,
                tx: Vec::new(),
                rx: VecDeque::new(),
            },
        );
        Some(handle)
    }

    fn uart_close(&self, uart: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "uart_close");
        match s.uart.ports.remove(&uart) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn uart_configure(&self, uart: SimHandle, config: &RawUartConfig) -> i32 {
        let mut s = self.lock();
        enter!(s, "uart_configure");
        let port = port!(s, uart);
        if !valid(config) {
            return Errno::EINVAL.as_ret();
        }
        port.config = *config;
        let cap = config.read_buf_len as usize;
        port.rx.truncate(cap);
        0
    }

    fn uart_put_byte(&self, uart: SimHandle, byte: u8) -> i32 {
        let mut s = self.lock();
        enter!(s, "uart_put_byte");
        let port = port!(s, uart);
        port.tx.push(byte);
        0
    }

    fn uart_get_byte(&self, uart: SimHandle, _timeout: i32) -> i32 {
        let mut s = self.lock();
        enter!(s, "uart_get_byte");
        match port!(s, uart).rx.pop_front() {
            Some(b) => i32::from(b),
            None => Errno::EAGAIN.as_ret(),
        }
    }

    fn uart_write(&self, uart: SimHandle, data: &[u8]) -> i32 {
        let mut s = self.lock();
        enter!(s, "uart_write");
        let port = port!(s, uart);
        port.tx.extend_from_slice(data);
        count(data.len())
    }

    fn uart_read(&self, uart: SimHandle, buf: &mut [u8], _timeout: i32) -> i32 {
        let mut s = self.lock();
        enter!(s, "uart_read");
        let port = port!(s, uart);
        let n = buf.len().min(port.rx.len());
        for (dst, src) in buf.iter_mut().zip(port.rx.drain(..n)) {
            *dst = src;
        }
        count(n)
    }

    fn uart_available(&self, uart: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "uart_available");
        count(port!(s, uart).rx.len())
    }

    fn uart_clear(&self, uart: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "uart_clear");
        let port = port!(s, uart);
        port.rx.clear();
        0
    }
}

impl SimHal {
    /// Deliver bytes to the receive ring of port `id`
    ///
    /// Returns how many fit.
    pub fn uart_feed(&self, id: u8, data: &[u8]) -> usize {
        let mut s = self.lock();
        let Some(port) = s.uart.by_id(id) else {
            return 0;
        };
        let room = (port.config.read_buf_len as usize).saturating_sub(port.rx.len());
        let n = room.min(data.len());
        port.rx.extend(&data[..n]);
        n
    }

    /// Everything transmitted on port `id`
    pub fn uart_sent(&self, id: u8) -> Vec<u8> {
        self.lock()
            .uart
            .by_id(id)
            .map(|p| p.tx.clone())
            .unwrap_or_default()
    }

    /// Active configuration of port `id`
    pub fn uart_config(&self, id: u8) -> Option<RawUartConfig> {
        self.lock().uart.by_id(id).map(|p| p.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinion_hal::uart::{DataBits, Parity, StopBits};

    fn config(read_buf_len: u32) -> RawUartConfig {
        RawUartConfig {
            baud_rate: 115_200,
            parity: Parity::None,
            stop_bits: StopBits::One,
            data_bits: DataBits::Eight,
            read_buf_len,
        }
    }

    #[test]
    fn test_rx_ring_overrun() {
        let sim = SimHal::new();
        let port = sim.uart_open(0, &config(4)).unwrap();
        assert_eq!(sim.uart_feed(0, b"hello"), 4);
        assert_eq!(sim.uart_available(port), 4);

        let mut buf = [0u8; 8];
        assert_eq!(sim.uart_read(port, &mut buf, 0), 4);
        assert_eq!(&buf[..4], b"hell");
        assert_eq!(sim.uart_get_byte(port, 0), Errno::EAGAIN.as_ret());
    }
}
