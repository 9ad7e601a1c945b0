//! SPI master boundary
//!
//! Bus mode is passed to the native layer as an operation word.

use crate::Hal;

/// Clock idles high
pub const OP_MODE_CPOL: u16 = 1 << 1;

/// Data captured on the second clock transition
pub const OP_MODE_CPHA: u16 = 1 << 2;

/// Least significant bit first
pub const OP_TRANSFER_LSB: u16 = 1 << 4;

/// Bit offset of the word size field
pub const OP_WORD_SIZE_SHIFT: u16 = 5;

/// Eight-bit words
pub const OP_WORD_SIZE_8: u16 = 8 << OP_WORD_SIZE_SHIFT;

/// Native SPI calls
pub trait SpiHal: Hal {
    /// Number of SPI ids
    fn spi_device_count(&self) -> u32;

    /// Open a bus with a clock speed in Hz and an operation word
    fn spi_open(&self, id: u8, speed_hz: u32, operation: u16) -> Option<Self::Handle>;

    /// Close a bus
    fn spi_close(&self, spi: Self::Handle) -> i32;

    /// Change clock speed and operation word
    fn spi_configure(&self, spi: Self::Handle, speed_hz: u32, operation: u16) -> i32;

    /// Clock out `data`
    fn spi_write(&self, spi: Self::Handle, data: &[u8]) -> i32;

    /// Clock in `buf.len()` bytes; returns the number of bytes read
    fn spi_read(&self, spi: Self::Handle, buf: &mut [u8]) -> i32;

    /// Full duplex transfer of `write.len()` bytes
    fn spi_transceive(&self, spi: Self::Handle, write: &[u8], read: &mut [u8]) -> i32;
}
