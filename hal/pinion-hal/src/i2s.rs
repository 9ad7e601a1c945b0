//! I2S boundary
//!
//! One I2S port carries a transmit and a receive stream. Both streams share
//! the port handle; `i2s_handle_get` returns the handle of a port that is
//! already open so a second user can reuse it.

use crate::Hal;

/// Data order: most significant bit first
pub const OPT_DATA_ORDER_MSB: i32 = 0;
/// Data order: least significant bit first
pub const OPT_DATA_ORDER_LSB: i32 = 1 << 3;
/// Invert the bit clock
pub const OPT_BIT_CLK_INV: i32 = 1 << 4;
/// Invert the frame clock
pub const OPT_FRAME_CLK_INV: i32 = 1 << 5;
/// Run the bit clock only while sending data
pub const OPT_BIT_CLK_GATED: i32 = 1 << 0;
/// Bit clock is driven by the remote side
pub const OPT_BIT_CLK_SLAVE: i32 = 1 << 1;
/// Frame clock is driven by the remote side
pub const OPT_FRAME_CLK_SLAVE: i32 = 1 << 2;

/// Frame format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum I2sMode {
    #[default]
    Philips = 0,
    RightJustified = 1,
    LeftJustified = 2,
}

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i32)]
pub enum I2sDirection {
    Rx = 0,
    Tx = 1,
    Both = 2,
}

/// Stream trigger command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i32)]
pub enum I2sTrigger {
    /// Start transmission / reception
    Start = 0,
    /// Stop at the end of the current block
    Stop = 1,
    /// Send everything queued, then stop
    Drain = 2,
    /// Stop immediately and discard the queue
    Drop = 3,
    /// Recover from an underrun/overrun error
    Prepare = 4,
}

/// Stream state reported by the native layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2sState {
    NotReady,
    Ready,
    Running,
    Stopping,
    Error,
}

impl I2sState {
    /// Decode a non-negative native status value
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(I2sState::NotReady),
            1 => Some(I2sState::Ready),
            2 => Some(I2sState::Running),
            3 => Some(I2sState::Stopping),
            4 => Some(I2sState::Error),
            _ => None,
        }
    }

    /// Native status value
    pub fn as_raw(self) -> i32 {
        match self {
            I2sState::NotReady => 0,
            I2sState::Ready => 1,
            I2sState::Running => 2,
            I2sState::Stopping => 3,
            I2sState::Error => 4,
        }
    }
}

/// Stream configuration in the shape the native layer expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct RawI2sConfig {
    pub mode: I2sMode,
    /// `OPT_*` bitfield
    pub options: i32,
    /// Words per frame
    pub channels: i32,
    /// Bits per sample
    pub sample_bits: i32,
    /// Samples per second
    pub sample_rate: i32,
    /// Block timeout in milliseconds, `-1` forever
    pub timeout: i32,
}

/// Native I2S calls
pub trait I2sHal: Hal {
    /// Number of I2S ids
    fn i2s_device_count(&self) -> u32;

    /// Handle of a port that is already open, if any
    fn i2s_handle_get(&self, id: u8) -> Option<Self::Handle>;

    /// Open a port
    fn i2s_open(&self, id: u8) -> Option<Self::Handle>;

    /// Close a port, both directions
    fn i2s_close(&self, i2s: Self::Handle) -> i32;

    /// Configure one or both streams
    fn i2s_configure(&self, i2s: Self::Handle, dir: I2sDirection, config: &RawI2sConfig) -> i32;

    /// Send a trigger command to one or both streams
    fn i2s_trigger(&self, i2s: Self::Handle, dir: I2sDirection, cmd: I2sTrigger) -> i32;

    /// Current stream state as an [`I2sState`] raw value
    fn i2s_status(&self, i2s: Self::Handle, dir: I2sDirection) -> i32;

    /// Queue `data` for transmission; returns the number of bytes queued
    fn i2s_write(&self, i2s: Self::Handle, data: &[u8]) -> i32;

    /// Receive up to `buf.len()` bytes; returns the number of bytes read
    fn i2s_read(&self, i2s: Self::Handle, buf: &mut [u8], timeout: i32) -> i32;
}
