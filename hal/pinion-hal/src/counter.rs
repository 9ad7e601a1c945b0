//! Pulse counter boundary
//!
//! A counter counts edges on its input and carries a single alarm channel.
//! Once an alarm expires the channel is available again; nothing re-arms
//! it implicitly.

use crate::{AlarmTrampoline, Context, Hal};

/// Edges that increment the counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum CounterMode {
    /// Count rising edges only
    #[default]
    RisingEdge = 0,
    /// Count rising and falling edges
    BothEdges = 1,
}

/// Native counter calls
pub trait CounterHal: Hal {
    /// Number of counter ids
    fn counter_device_count(&self) -> u32;

    /// Open a counter
    fn counter_open(&self, id: u8, mode: CounterMode) -> Option<Self::Handle>;

    /// Close a counter
    fn counter_close(&self, counter: Self::Handle) -> i32;

    /// Change the edge-detect mode
    fn counter_configure(&self, counter: Self::Handle, mode: CounterMode) -> i32;

    /// Read the current tick count
    fn counter_read(&self, counter: Self::Handle, ticks: &mut u32) -> i32;

    /// Read the current tick count and reset it to zero in one step
    ///
    /// Edges arriving around the call are counted either in the returned
    /// value or in the fresh count, never in both and never in neither.
    fn counter_take(&self, counter: Self::Handle, ticks: &mut u32) -> i32;

    /// Start counting from zero
    fn counter_start(&self, counter: Self::Handle) -> i32;

    /// Stop counting
    fn counter_stop(&self, counter: Self::Handle) -> i32;

    /// Counter clock in Hz, zero when the counter has no fixed frequency
    fn counter_frequency(&self, counter: Self::Handle) -> u32;

    /// Convert ticks to microseconds
    fn counter_ticks_to_us(&self, counter: Self::Handle, ticks: u32) -> u64;

    /// Convert microseconds to ticks, saturating at 32 bits
    fn counter_us_to_ticks(&self, counter: Self::Handle, us: u64) -> u32;

    /// Largest tick value the counter reaches before wrapping
    fn counter_max_top_value(&self, counter: Self::Handle) -> u32;

    /// Install the alarm trampoline
    ///
    /// # Safety
    ///
    /// `ctx` must stay valid until [`CounterHal::counter_remove_callback`]
    /// returns for the same counter.
    unsafe fn counter_add_callback(
        &self,
        counter: Self::Handle,
        ctx: Context,
        callback: AlarmTrampoline,
    ) -> i32;

    /// Remove the alarm trampoline; it never fires after this returns
    fn counter_remove_callback(&self, counter: Self::Handle) -> i32;

    /// Arm the single-shot alarm `ticks` from now
    fn counter_set_alarm(&self, counter: Self::Handle, ticks: u32) -> i32;

    /// Cancel a pending alarm
    fn counter_cancel_alarm(&self, counter: Self::Handle) -> i32;
}
