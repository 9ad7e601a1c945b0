//! I2C master
//!
//! Counts passed as `Some(n)` limit a transfer to the first `n` bytes of the
//! buffer and are checked before the bus is touched; `None` transfers the
//! whole buffer.

use pinion_hal::i2c::{SPEED_FAST, SPEED_FAST_PLUS, SPEED_STANDARD};
use pinion_hal::{Errno, I2cHal};

use crate::cache::Cached;
use crate::error::{check, span, Error, Invalid, Peripheral, Result};
use crate::handle::{open_device, Owned};

/// Bus clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum I2cSpeed {
    /// 100 kHz
    #[default]
    Standard,
    /// 400 kHz
    Fast,
    /// 1 MHz
    FastPlus,
}

impl I2cSpeed {
    pub const fn hz(self) -> u32 {
        match self {
            I2cSpeed::Standard => SPEED_STANDARD,
            I2cSpeed::Fast => SPEED_FAST,
            I2cSpeed::FastPlus => SPEED_FAST_PLUS,
        }
    }
}

const MAX_ADDRESS: u8 = 0x7F;

pub struct I2c<H: I2cHal> {
    handle: Owned<H>,
    id: u8,
    speed: Cached<I2cSpeed>,
}

impl<H: I2cHal> I2c<H> {
    pub fn new(hal: &H, id: u8, speed: I2cSpeed) -> Result<Self> {
        let handle = open_device(
            hal,
            Peripheral::I2c,
            id,
            hal.i2c_device_count(),
            |hal| hal.i2c_open(id),
            H::i2c_close,
        )?;
        check(hal.i2c_configure(handle.raw(), speed.hz()))?;
        Ok(Self {
            handle,
            id,
            speed: Cached::new(speed),
        })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn speed(&self) -> I2cSpeed {
        self.speed.get()
    }

    pub fn set_speed(&mut self, speed: I2cSpeed) -> Result<()> {
        let handle = &self.handle;
        self.speed.update(speed, |s| {
            check(handle.hal().i2c_configure(handle.raw(), s.hz())).map(|_| ())
        })
    }

    /// Write `data[..count]` to `address`
    pub fn write(&mut self, address: u8, data: &[u8], count: Option<usize>) -> Result<()> {
        check_address(address)?;
        let n = span(data.len(), count)?;
        check(self.handle.hal().i2c_write(self.handle.raw(), address, &data[..n])).map(|_| ())
    }

    pub fn write_byte(&mut self, address: u8, byte: u8) -> Result<()> {
        self.write(address, &[byte], None)
    }

    /// Read `count` bytes from `address` into the start of `buf`
    pub fn read(&mut self, address: u8, buf: &mut [u8], count: Option<usize>) -> Result<()> {
        check_address(address)?;
        let n = span(buf.len(), count)?;
        check(self.handle.hal().i2c_read(self.handle.raw(), address, &mut buf[..n])).map(|_| ())
    }

    pub fn read_byte(&mut self, address: u8) -> Result<u8> {
        let mut byte = [0];
        self.read(address, &mut byte, None)?;
        Ok(byte[0])
    }

    /// Write then read in one transaction with a repeated start
    pub fn write_read(
        &mut self,
        address: u8,
        data: &[u8],
        write_count: Option<usize>,
        buf: &mut [u8],
        read_count: Option<usize>,
    ) -> Result<()> {
        check_address(address)?;
        let w = span(data.len(), write_count)?;
        let r = span(buf.len(), read_count)?;
        check(self.handle.hal().i2c_write_read(
            self.handle.raw(),
            address,
            &data[..w],
            &mut buf[..r],
        ))
        .map(|_| ())
    }

    pub fn close(self) -> Result<()> {
        self.handle.close()
    }
}

fn check_address(address: u8) -> Result<()> {
    if address > MAX_ADDRESS {
        warn!("I2C address {} is not 7-bit", address);
        return Err(Error::InvalidArgument(Invalid::Address));
    }
    Ok(())
}

impl<H: I2cHal> embedded_hal::i2c::ErrorType for I2c<H> {
    type Error = Error;
}

impl<H: I2cHal> embedded_hal::i2c::I2c for I2c<H> {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [embedded_hal::i2c::Operation<'_>],
    ) -> Result<()> {
        use embedded_hal::i2c::Operation;
        match operations {
            [] => Ok(()),
            [Operation::Write(data)] => self.write(address, data, None),
            [Operation::Read(buf)] => self.read(address, buf, None),
            [Operation::Write(data), Operation::Read(buf)] => {
                self.write_read(address, data, None, buf, None)
            }
            _ => Err(Error::Hal(Errno::ENOTSUP)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinion_hal_sim::I2cOp;
    use pinion_hal_sim::SimHal;

    #[test]
    fn test_round_trip() {
        let sim = SimHal::new();
        let mut bus = I2c::new(&sim, 0, I2cSpeed::Standard).unwrap();
        sim.i2c_respond(0, 0x44, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

        bus.write(0x44, &[0x24, 0x0B], None).unwrap();
        let mut reply = [0u8; 6];
        bus.write_read(0x44, &[0x01], None, &mut reply, None).unwrap();

        assert_eq!(reply, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(sim.calls("i2c_write_read"), 1);
        assert_eq!(sim.calls("i2c_write"), 1);
        assert_eq!(sim.calls("i2c_read"), 0);
        assert_eq!(
            sim.i2c_log(0),
            [
                I2cOp::Write {
                    address: 0x44,
                    data: [0x24, 0x0B].to_vec()
                },
                I2cOp::WriteRead {
                    address: 0x44,
                    data: [0x01].to_vec(),
                    len: 6
                }
            ]
        );
    }

    #[test]
    fn test_count_validation_never_reaches_bus() {
        let sim = SimHal::new();
        let mut bus = I2c::new(&sim, 0, I2cSpeed::Fast).unwrap();
        let mut buf = [0u8; 4];
        let overrun = Error::InvalidArgument(Invalid::Count {
            requested: 5,
            capacity: 4,
        });

        assert_eq!(bus.write(0x10, &buf.clone(), Some(5)), Err(overrun));
        assert_eq!(bus.read(0x10, &mut buf, Some(5)), Err(overrun));
        assert_eq!(
            bus.write_read(0x10, &[0; 4], Some(5), &mut buf, None),
            Err(overrun)
        );
        assert_eq!(
            bus.write_read(0x10, &[0; 4], None, &mut buf, Some(5)),
            Err(overrun)
        );
        assert_eq!(
            bus.write(0x80, &[1], None),
            Err(Error::InvalidArgument(Invalid::Address))
        );
        assert_eq!(sim.calls("i2c_write"), 0);
        assert_eq!(sim.calls("i2c_read"), 0);
        assert_eq!(sim.calls("i2c_write_read"), 0);
    }

    #[test]
    fn test_partial_count() {
        let sim = SimHal::new();
        let mut bus = I2c::new(&sim, 1, I2cSpeed::Standard).unwrap();
        bus.write(0x20, &[1, 2, 3, 4], Some(2)).unwrap();
        let mut buf = [0u8; 4];
        sim.i2c_respond(1, 0x20, &[9, 9]);
        bus.read(0x20, &mut buf, Some(2)).unwrap();
        assert_eq!(buf, [9, 9, 0, 0]);
        assert_eq!(
            sim.i2c_log(1)[0],
            I2cOp::Write {
                address: 0x20,
                data: [1, 2].to_vec()
            }
        );
    }

    #[test]
    fn test_nack_surfaces_as_hal_error() {
        let sim = SimHal::new();
        let mut bus = I2c::new(&sim, 0, I2cSpeed::Standard).unwrap();
        sim.i2c_remove_target(0, 0x50);
        assert_eq!(bus.read_byte(0x50), Err(Error::Hal(Errno::EIO)));
    }

    #[test]
    fn test_speed_rollback() {
        let sim = SimHal::new();
        let mut bus = I2c::new(&sim, 0, I2cSpeed::Standard).unwrap();
        sim.fail_next("i2c_configure", Errno::EIO);
        assert!(bus.set_speed(I2cSpeed::FastPlus).is_err());
        assert_eq!(bus.speed(), I2cSpeed::Standard);
        bus.set_speed(I2cSpeed::FastPlus).unwrap();
        assert_eq!(sim.i2c_speed(0), Some(1_000_000));
    }

    #[test]
    fn test_embedded_hal_transaction() {
        let sim = SimHal::new();
        let mut bus = I2c::new(&sim, 0, I2cSpeed::Standard).unwrap();
        sim.i2c_respond(0, 0x68, &[0x71]);
        let mut who = [0u8; 1];
        embedded_hal::i2c::I2c::write_read(&mut bus, 0x68, &[0x75], &mut who).unwrap();
        assert_eq!(who, [0x71]);
        assert_eq!(sim.calls("i2c_write_read"), 1);
    }

    proptest::proptest! {
        #[test]
        fn oversized_counts_rejected(len in 0usize..32, extra in 1usize..32) {
            let sim = SimHal::new();
            let mut bus = I2c::new(&sim, 0, I2cSpeed::Standard).unwrap();
            let mut buf = alloc::vec![0u8; len];
            assert!(bus.read(0x10, &mut buf, Some(len + extra)).is_err());
            assert!(bus.write(0x10, &buf, Some(len + extra)).is_err());
            assert_eq!(sim.calls("i2c_read") + sim.calls("i2c_write"), 0);
        }
    }
}
