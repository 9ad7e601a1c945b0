//! Simulated SPI buses
//!
//! MISO data comes from a per-bus queue, `0xFF` once it runs dry.

use std::collections::{HashMap, VecDeque};

use pinion_hal::spi::SpiHal;
use pinion_hal::Errno;

use crate::{enter, Peripheral, SimHal, SimHandle};

/// A transfer seen on a simulated bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpiOp {
    Write(Vec<u8>),
    Read(usize),
    Transceive(Vec<u8>, usize),
}

struct Bus {
    id: u8,
    speed_hz: u32,
    operation: u16,
}

#[derive(Default)]
pub(crate) struct SpiBank {
    buses: HashMap<SimHandle, Bus>,
    log: HashMap<u8, Vec<SpiOp>>,
    miso: HashMap<u8, VecDeque<u8>>,
}

impl SpiBank {
    pub(crate) fn len(&self) -> usize {
        self.buses.len()
    }

    fn shift_in(&mut self, id: u8, buf: &mut [u8]) {
        let queue = self.miso.entry(id).or_default();
        for b in buf {
            *b = queue.pop_front().unwrap_or(0xFF);
        }
    }
}

macro_rules! bus_id {
    ($state:expr, $handle:expr) => {
        match $state.spi.buses.get(&$handle) {
            Some(bus) => bus.id,
            None => return $state.bad_handle(),
        }
    };
}

fn count(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

impl SpiHal for SimHal {
    fn spi_device_count(&self) -> u32 {
        self.lock().device_count(Peripheral::Spi)
    }

    fn spi_open(&self, id: u8, speed_hz: u32, operation: u16) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "spi_open", None);
        if !s.has_device(Peripheral::Spi, id) || s.spi.buses.values().any(|b| b.id == id) {
            return None;
        }
        if speed_hz == 0 {
            return None;
        }
        let handle = s.alloc();
        s.spi.buses.insert(
            handle,
            Bus {
                id,
                speed_hz,
                operation,
            },
        );
        Some(handle)
    }

    fn spi_close(&self, spi: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "spi_close");
        match s.spi.buses.remove(&spi) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn spi_configure(&self, spi: SimHandle, speed_hz: u32, operation: u16) -> i32 {
        let mut s = self.lock();
        enter!(s, "spi_configure");
        let Some(bus) = s.spi.buses.get_mut(&spi) else {
            return s.bad_handle();
        };
        if speed_hz == 0 {
            return Errno::EINVAL.as_ret();
        }
        bus.speed_hz = speed_hz;
        bus.operation = operation;
        0
    }

    fn spi_write(&self, spi: SimHandle, data: &[u8]) -> i32 {
        let mut s = self.lock();
        enter!(s, "spi_write");
        let id = bus_id!(s, spi);
        s.spi.log.entry(id).or_default().push(SpiOp::Write(data.to_vec()));
        0
    }

    fn spi_read(&self, spi: SimHandle, buf: &mut [u8]) -> i32 {
        let mut s = self.lock();
        enter!(s, "spi_read");
        let id = bus_id!(s, spi);
        s.spi.shift_in(id, buf);
        s.spi.log.entry(id).or_default().push(SpiOp::Read(buf.len()));
        count(buf.len())
    }

    fn spi_transceive(&self, spi: SimHandle, write: &[u8], read: &mut [u8]) -> i32 {
        let mut s = self.lock();
        enter!(s, "spi_transceive");
        let id = bus_id!(s, spi);
        s.spi.shift_in(id, read);
        s.spi
            .log
            .entry(id)
            .or_default()
            .push(SpiOp::Transceive(write.to_vec(), read.len()));
        count(write.len().max(read.len()))
    }
}

impl SimHal {
    /// Queue MISO bytes for bus `id`
    pub fn spi_respond(&self, id: u8, data: &[u8]) {
        self.lock()
            .spi
            .miso
            .entry(id)
            .or_default()
            .extend(data.iter().copied());
    }

    /// Transfers seen on bus `id`
    pub fn spi_log(&self, id: u8) -> Vec<SpiOp> {
        self.lock().spi.log.get(&id).cloned().unwrap_or_default()
    }

    /// `(speed_hz, operation)` of bus `id`, if it is open
    pub fn spi_settings(&self, id: u8) -> Option<(u32, u16)> {
        self.lock()
            .spi
            .buses
            .values()
            .find(|b| b.id == id)
            .map(|b| (b.speed_hz, b.operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transceive_shifts_queue() {
        let sim = SimHal::new();
        let bus = sim.spi_open(0, 1_000_000, 0).unwrap();
        sim.spi_respond(0, &[1, 2]);

        let mut rx = [0u8; 3];
        assert_eq!(sim.spi_transceive(bus, &[9, 9, 9], &mut rx), 3);
        assert_eq!(rx, [1, 2, 0xFF]);
        assert_eq!(sim.spi_log(0), [SpiOp::Transceive(vec![9, 9, 9], 3)]);
    }
}
