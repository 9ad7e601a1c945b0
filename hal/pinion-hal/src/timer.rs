//! Software timer boundary

use crate::{Context, Hal, Trampoline};

/// Timer trigger type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum TimerMode {
    /// Expire once, then stop
    OneShot = 0,
    /// Expire every period until stopped
    #[default]
    Period = 1,
}

/// Native timer calls
pub trait TimerHal: Hal {
    /// Allocate a timer
    fn timer_open(&self) -> Option<Self::Handle>;

    /// Release a timer
    fn timer_close(&self, timer: Self::Handle) -> i32;

    /// Start the timer with a period in milliseconds
    fn timer_start(&self, timer: Self::Handle, mode: TimerMode, period_ms: u32) -> i32;

    /// Stop the timer
    fn timer_stop(&self, timer: Self::Handle) -> i32;

    /// Install the expiry trampoline
    ///
    /// # Safety
    ///
    /// `ctx` must stay valid until [`TimerHal::timer_remove_callback`]
    /// returns for the same timer.
    unsafe fn timer_add_callback(
        &self,
        timer: Self::Handle,
        ctx: Context,
        callback: Trampoline,
    ) -> i32;

    /// Remove the expiry trampoline; it never fires after this returns
    fn timer_remove_callback(&self, timer: Self::Handle) -> i32;

    /// Number of expiries since the last call; reading resets it
    fn timer_status(&self, timer: Self::Handle) -> u32;

    /// Milliseconds before the next expiry, zero when stopped
    fn timer_remaining(&self, timer: Self::Handle) -> u32;
}
