//! Typed peripheral wrappers over the Pinion native HAL
//!
//! Every wrapper owns exactly one native handle and releases it exactly
//! once, keeps the last configuration the hardware accepted, and bridges
//! native interrupt and expiry callbacks to Rust closures:
//!
//! - Digital I/O ([`gpio`]) with edge and level interrupts
//! - Analog input ([`adc`]) and PWM output ([`pwm`])
//! - Pulse counters with alarms ([`counter`]) and periodic timers ([`timer`])
//! - Buses: I2C ([`i2c`]), SPI ([`spi`]), UART ([`uart`]), I2S ([`i2s`])
//! - RTOS primitives ([`os`]), filesystem ([`fs`]), raw Ethernet tap
//!   ([`eth`]) and clock ([`time`])
//!
//! All wrappers are generic over the HAL traits of `pinion-hal`, so the same
//! code runs on the board and against `pinion-hal-sim` on the host.
//!
//! # Errors
//!
//! Every fallible operation returns [`Result`]. Arguments that can be
//! checked without hardware are rejected with
//! [`Error::InvalidArgument`] before any native call is made; native
//! failures are passed through as [`Error::Hal`].

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;
#[cfg(test)]
extern crate std;

// Must come first so the log macros are visible to every module
mod fmt;

mod cache;
mod callback;
pub mod error;
pub mod handle;

pub mod adc;
pub mod counter;
pub mod gpio;
pub mod i2c;
pub mod i2s;
pub mod pwm;
pub mod spi;
pub mod timer;
pub mod uart;

pub mod eth;
pub mod fs;
pub mod os;
pub mod time;

pub use error::{Error, Invalid, Peripheral, Result};
pub use pinion_hal::{Errno, Timeout};

pub use adc::AnalogIn;
pub use counter::Counter;
pub use gpio::{DigitalIn, DigitalInOut, DigitalOut};
pub use i2c::I2c;
pub use i2s::{I2sIn, I2sOut, I2sPort};
pub use pwm::PwmOut;
pub use spi::Spi;
pub use timer::Timer;
pub use uart::Uart;

pub use eth::Ethernet;
pub use fs::File;
pub use time::Clock;
