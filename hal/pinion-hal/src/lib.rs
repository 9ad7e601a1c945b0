//! Pinion native HAL boundary
//!
//! This crate describes the contract of the native hardware abstraction
//! layer that the Pinion wrappers call into. The register programming,
//! interrupt controller, DMA and bus timing live behind it and are not
//! visible here.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application                            │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  pinion-core (typed peripheral wrappers)│
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  pinion-hal (this crate - traits)       │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  native (C)   │       │ pinion-hal-sim│
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Conventions
//!
//! Every fallible native call returns an `i32`: non-negative on success
//! (sometimes a count, sometimes a value, sometimes ignored) and `-errno`
//! on failure. [`check`] is the single place that turns this into a
//! [`Result`]. Open calls return `None` when the native layer could not
//! provide a handle.
//!
//! Handles are opaque [`Hal::Handle`] tokens. Closing a handle twice is
//! undefined behaviour in the native layer; the wrapper crate guarantees
//! exactly-once release.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod adc;
pub mod counter;
pub mod errno;
pub mod eth;
pub mod fs;
pub mod gpio;
pub mod i2c;
pub mod i2s;
pub mod os;
pub mod pwm;
pub mod spi;
pub mod time;
pub mod timer;
pub mod uart;

#[cfg(feature = "native")]
pub mod native;

use core::ffi::c_void;

// Re-export key traits at crate root for convenience
pub use adc::AdcHal;
pub use counter::CounterHal;
pub use errno::{check, Errno};
pub use eth::EthHal;
pub use fs::FsHal;
pub use gpio::GpioHal;
pub use i2c::I2cHal;
pub use i2s::I2sHal;
pub use os::OsHal;
pub use pwm::PwmHal;
pub use spi::SpiHal;
pub use time::TimeHal;
pub use timer::TimerHal;
pub use uart::UartHal;

/// Opaque user context handed to the native layer with a trampoline
pub type Context = *const c_void;

/// Interrupt/expiry trampoline invoked by the native layer
///
/// The native layer calls it with the exact [`Context`] it was given at
/// registration time, possibly from interrupt context.
pub type Trampoline = unsafe extern "C" fn(ctx: Context);

/// Counter alarm trampoline, receives the tick value at expiry
pub type AlarmTrampoline = unsafe extern "C" fn(ticks: u32, ctx: Context);

/// Base trait shared by every peripheral family
///
/// Implementations are cheap to clone: each wrapper instance keeps its own
/// copy to reach the native layer.
pub trait Hal: Clone {
    /// Opaque per-resource token returned by the native open calls
    ///
    /// Tokens compare equal only when they name the same native resource.
    type Handle: Copy + Eq + core::fmt::Debug + Send + 'static;
}

/// Blocking timeout understood by the native layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Timeout {
    /// Return immediately
    NoWait,
    /// Block until the operation completes
    #[default]
    Forever,
    /// Block for at most this many milliseconds
    Millis(u32),
}

impl Timeout {
    /// Raw value passed to the native layer: `0`, `-1` or `N`
    pub fn as_raw(self) -> i32 {
        match self {
            Timeout::NoWait => 0,
            Timeout::Forever => -1,
            Timeout::Millis(ms) => i32::try_from(ms).unwrap_or(i32::MAX),
        }
    }

    /// Decode a raw native timeout
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Timeout::NoWait,
            r if r < 0 => Timeout::Forever,
            r => Timeout::Millis(r.unsigned_abs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_raw() {
        assert_eq!(Timeout::NoWait.as_raw(), 0);
        assert_eq!(Timeout::Forever.as_raw(), -1);
        assert_eq!(Timeout::Millis(250).as_raw(), 250);
        assert_eq!(Timeout::Millis(u32::MAX).as_raw(), i32::MAX);
    }

    #[test]
    fn test_timeout_from_raw() {
        assert_eq!(Timeout::from_raw(0), Timeout::NoWait);
        assert_eq!(Timeout::from_raw(-1), Timeout::Forever);
        assert_eq!(Timeout::from_raw(10), Timeout::Millis(10));
    }
}
