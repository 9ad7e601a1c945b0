//! PWM boundary
//!
//! The native layer takes period and pulse width in microseconds.

use crate::Hal;

/// Static capability information of a PWM output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmInfo {
    /// Highest supported frequency in Hz
    pub max_frequency: u32,
    /// Lowest supported frequency in Hz
    pub min_frequency: u32,
}

/// Native PWM calls
pub trait PwmHal: Hal {
    /// Number of PWM ids
    fn pwm_device_count(&self) -> u32;

    /// Open a PWM output
    fn pwm_open(&self, id: u8) -> Option<Self::Handle>;

    /// Close a PWM output
    fn pwm_close(&self, pwm: Self::Handle) -> i32;

    /// Program period and high pulse width, both in microseconds
    fn pwm_set(&self, pwm: Self::Handle, period_us: u32, pulse_us: u32) -> i32;

    /// Hold the output without losing period/pulse
    fn pwm_suspend(&self, pwm: Self::Handle) -> i32;

    /// Restart a suspended output
    fn pwm_resume(&self, pwm: Self::Handle) -> i32;

    /// Query the supported frequency range
    fn pwm_info(&self, pwm: Self::Handle, info: &mut PwmInfo) -> i32;
}
