//! UART boundary

use crate::Hal;

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum Parity {
    #[default]
    None = 0,
    Odd = 1,
    Even = 2,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum StopBits {
    #[default]
    One = 0,
    Two = 1,
}

/// Number of data bits per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum DataBits {
    #[default]
    Eight = 0,
}

/// Configuration record in the shape the native layer expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct RawUartConfig {
    /// Baud rate in bits per second
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub data_bits: DataBits,
    /// Size of the native receive ring buffer in bytes
    pub read_buf_len: u32,
}

/// Native UART calls
pub trait UartHal: Hal {
    /// Number of UART ids
    fn uart_device_count(&self) -> u32;

    /// Open a port
    fn uart_open(&self, id: u8, config: &RawUartConfig) -> Option<Self::Handle>;

    /// Close a port
    fn uart_close(&self, uart: Self::Handle) -> i32;

    /// Reconfigure an open port
    fn uart_configure(&self, uart: Self::Handle, config: &RawUartConfig) -> i32;

    /// Send one byte
    fn uart_put_byte(&self, uart: Self::Handle, byte: u8) -> i32;

    /// Receive one byte: the byte value, or `-errno` (`-EAGAIN` on timeout)
    fn uart_get_byte(&self, uart: Self::Handle, timeout: i32) -> i32;

    /// Send `data`; returns the number of bytes written
    fn uart_write(&self, uart: Self::Handle, data: &[u8]) -> i32;

    /// Receive up to `buf.len()` bytes; returns the number of bytes read
    fn uart_read(&self, uart: Self::Handle, buf: &mut [u8], timeout: i32) -> i32;

    /// Bytes waiting in the receive buffer
    fn uart_available(&self, uart: Self::Handle) -> i32;

    /// Drop everything in the receive buffer
    fn uart_clear(&self, uart: Self::Handle) -> i32;
}
