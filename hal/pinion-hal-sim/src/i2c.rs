//! Simulated I2C buses
//!
//! Targets answer reads from a queue of canned responses. A target with
//! no queued response reads as `0xFF`, like an idle bus with pull-ups.

use std::collections::{HashMap, HashSet, VecDeque};

use pinion_hal::i2c::{I2cHal, SPEED_FAST, SPEED_FAST_PLUS, SPEED_STANDARD};
use pinion_hal::Errno;

use crate::{enter, Peripheral, SimHal, SimHandle};

/// A transfer seen on a simulated bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cOp {
    Write { address: u8, data: Vec<u8> },
    Read { address: u8, len: usize },
    WriteRead { address: u8, data: Vec<u8>, len: usize },
}

struct Bus {
    id: u8,
    speed_hz: u32,
}

#[derive(Default)]
pub(crate) struct I2cBank {
    buses: HashMap<SimHandle, Bus>,
    log: HashMap<u8, Vec<I2cOp>>,
    responses: HashMap<(u8, u8), VecDeque<Vec<u8>>>,
    absent: HashSet<(u8, u8)>,
}

impl I2cBank {
    pub(crate) fn len(&self) -> usize {
        self.buses.len()
    }

    fn respond(&mut self, id: u8, address: u8, buf: &mut [u8]) {
        let reply = self
            .responses
            .get_mut(&(id, address))
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = reply.get(i).copied().unwrap_or(0xFF);
        }
    }
}

/// Look up the bus id behind a handle, bailing out on unknown handles and
/// absent targets
macro_rules! bus_id {
    ($state:expr, $handle:expr, $address:expr) => {{
        let Some(bus) = $state.i2c.buses.get(&$handle) else {
            return $state.bad_handle();
        };
        let id = bus.id;
        if $address > 0x7F || $state.i2c.absent.contains(&(id, $address)) {
            return Errno::EIO.as_ret();
        }
        id
    }};
}

impl I2cHal for SimHal {
    fn i2c_device_count(&self) -> u32 {
        self.lock().device_count(Peripheral::I2c)
    }

    fn i2c_open(&self, id: u8) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "i2c_open", None);
        if !s.has_device(Peripheral::I2c, id) || s.i2c.buses.values().any(|b| b.id == id) {
            return None;
        }
        let handle = s.alloc();
        s.i2c.buses.insert(
            handle,
            Bus {
                id,
                speed_hz: SPEED_STANDARD,
            },
        );
        Some(handle)
    }

    fn i2c_close(&self, i2c: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "i2c_close");
        match s.i2c.buses.remove(&i2c) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn i2c_configure(&self, i2c: SimHandle, speed_hz: u32) -> i32 {
        let mut s = self.lock();
        enter!(s, "i2c_configure");
        let Some(bus) = s.i2c.buses.get_mut(&i2c) else {
            return s.bad_handle();
        };
        if ![SPEED_STANDARD, SPEED_FAST, SPEED_FAST_PLUS].contains(&speed_hz) {
            return Errno::ENOTSUP.as_ret();
        }
        bus.speed_hz = speed_hz;
        0
    }

    fn i2c_write(&self, i2c: SimHandle, address: u8, data: &[u8]) -> i32 {
        let mut s = self.lock();
        enter!(s, "i2c_write");
        let id = bus_id!(s, i2c, address);
        s.i2c.log.entry(id).or_default().push(I2cOp::Write {
            address,
            data: data.to_vec(),
        });
        0
    }

    fn i2c_read(&self, i2c: SimHandle, address: u8, buf: &mut [u8]) -> i32 {
        let mut s = self.lock();
        enter!(s, "i2c_read");
        let id = bus_id!(s, i2c, address);
        s.i2c.respond(id, address, buf);
        s.i2c.log.entry(id).or_default().push(I2cOp::Read {
            address,
            len: buf.len(),
        });
        0
    }

    fn i2c_write_read(&self, i2c: SimHandle, address: u8, write: &[u8], read: &mut [u8]) -> i32 {
        let mut s = self.lock();
        enter!(s, "i2c_write_read");
        let id = bus_id!(s, i2c, address);
        s.i2c.respond(id, address, read);
        s.i2c.log.entry(id).or_default().push(I2cOp::WriteRead {
            address,
            data: write.to_vec(),
            len: read.len(),
        });
        0
    }
}

impl SimHal {
    /// Queue the bytes the target at `address` on bus `id` returns on its
    /// next read
    pub fn i2c_respond(&self, id: u8, address: u8, data: &[u8]) {
        self.lock()
            .i2c
            .responses
            .entry((id, address))
            .or_default()
            .push_back(data.to_vec());
    }

    /// Make the target at `address` on bus `id` NACK every transfer
    pub fn i2c_remove_target(&self, id: u8, address: u8) {
        self.lock().i2c.absent.insert((id, address));
    }

    /// Transfers seen on bus `id`
    pub fn i2c_log(&self, id: u8) -> Vec<I2cOp> {
        self.lock().i2c.log.get(&id).cloned().unwrap_or_default()
    }

    /// Configured speed of bus `id`, if it is open
    pub fn i2c_speed(&self, id: u8) -> Option<u32> {
        self.lock()
            .i2c
            .buses
            .values()
            .find(|b| b.id == id)
            .map(|b| b.speed_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_response_padded() {
        let sim = SimHal::new();
        let bus = sim.i2c_open(0).unwrap();
        sim.i2c_respond(0, 0x50, &[0xAB]);

        let mut buf = [0u8; 3];
        assert_eq!(sim.i2c_write_read(bus, 0x50, &[0x00], &mut buf), 0);
        assert_eq!(buf, [0xAB, 0xFF, 0xFF]);
        assert_eq!(
            sim.i2c_log(0),
            [I2cOp::WriteRead {
                address: 0x50,
                data: vec![0x00],
                len: 3
            }]
        );
    }

    #[test]
    fn test_absent_target_nacks() {
        let sim = SimHal::new();
        let bus = sim.i2c_open(1).unwrap();
        sim.i2c_remove_target(1, 0x20);
        assert_eq!(sim.i2c_write(bus, 0x20, &[1]), Errno::EIO.as_ret());
        assert!(sim.i2c_log(1).is_empty());
    }
}
