//! I2C master boundary

use crate::Hal;

/// Standard mode clock (100 kHz)
pub const SPEED_STANDARD: u32 = 100_000;

/// Fast mode clock (400 kHz)
pub const SPEED_FAST: u32 = 400_000;

/// Fast mode plus clock (1 MHz)
pub const SPEED_FAST_PLUS: u32 = 1_000_000;

/// Native I2C calls
///
/// Addresses are 7-bit. `i2c_write_read` is a single bus transaction with a
/// repeated start between the write and the read phase.
pub trait I2cHal: Hal {
    /// Number of I2C ids
    fn i2c_device_count(&self) -> u32;

    /// Open a bus
    fn i2c_open(&self, id: u8) -> Option<Self::Handle>;

    /// Close a bus
    fn i2c_close(&self, i2c: Self::Handle) -> i32;

    /// Set the bus clock in Hz
    fn i2c_configure(&self, i2c: Self::Handle, speed_hz: u32) -> i32;

    /// Write `data` to the device at `address`
    fn i2c_write(&self, i2c: Self::Handle, address: u8, data: &[u8]) -> i32;

    /// Fill `buf` from the device at `address`
    fn i2c_read(&self, i2c: Self::Handle, address: u8, buf: &mut [u8]) -> i32;

    /// Write then read with a repeated start
    fn i2c_write_read(&self, i2c: Self::Handle, address: u8, write: &[u8], read: &mut [u8])
        -> i32;
}
