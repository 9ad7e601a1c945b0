//! GPIO pin boundary
//!
//! Digital pins are opened by logical id with a direction and an electrical
//! mode. Interrupt trigger configuration, callback installation and
//! enable/disable are separate native calls, so a callback can stay
//! installed while delivery is paused.

use crate::{Context, Hal, Trampoline};

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum Direction {
    /// Pin drives its level
    Output = 0,
    /// Pin samples its level
    Input = 1,
}

/// Internal electrical connection of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum PinMode {
    /// Pull-up, valid for input and output
    PullUp = 0,
    /// Pull-down, input only
    PullDown = 1,
    /// Floating, input only
    PullNone = 2,
    /// Open drain, output only
    OpenDrain = 3,
}

impl PinMode {
    /// Check whether the native layer accepts this mode for a direction
    pub fn valid_for(self, direction: Direction) -> bool {
        match (self, direction) {
            (PinMode::PullUp, _) => true,
            (PinMode::PullDown | PinMode::PullNone, Direction::Input) => true,
            (PinMode::OpenDrain, Direction::Output) => true,
            _ => false,
        }
    }
}

/// Interrupt trigger condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum InterruptMode {
    /// Trigger on rising edge
    RisingEdge = 0,
    /// Trigger on falling edge
    FallingEdge = 1,
    /// Trigger on both edges
    BothEdges = 2,
    /// Trigger while the pin is high
    HighLevel = 3,
    /// Trigger while the pin is low
    LowLevel = 4,
}

impl InterruptMode {
    /// Whether a transition from `from` to `to` triggers this mode
    ///
    /// Level modes trigger whenever the new level matches.
    pub fn triggers(self, from: bool, to: bool) -> bool {
        match self {
            InterruptMode::RisingEdge => !from && to,
            InterruptMode::FallingEdge => from && !to,
            InterruptMode::BothEdges => from != to,
            InterruptMode::HighLevel => to,
            InterruptMode::LowLevel => !to,
        }
    }
}

/// Native GPIO calls
pub trait GpioHal: Hal {
    /// Number of GPIO ids; valid ids are `0..count`
    fn gpio_device_count(&self) -> u32;

    /// Open a pin
    fn gpio_open(&self, id: u8, direction: Direction, mode: PinMode) -> Option<Self::Handle>;

    /// Close a pin
    fn gpio_close(&self, pin: Self::Handle) -> i32;

    /// Change direction and mode of an open pin
    fn gpio_configure(&self, pin: Self::Handle, direction: Direction, mode: PinMode) -> i32;

    /// Drive an output level
    fn gpio_set(&self, pin: Self::Handle, high: bool) -> i32;

    /// Sample the level: `0` low, `1` high, `-errno` on failure
    fn gpio_get(&self, pin: Self::Handle) -> i32;

    /// Select the interrupt trigger condition
    fn gpio_interrupt_configure(&self, pin: Self::Handle, mode: InterruptMode) -> i32;

    /// Install the interrupt trampoline for a pin
    ///
    /// # Safety
    ///
    /// `ctx` must stay valid until [`GpioHal::gpio_interrupt_uninstall`]
    /// returns for the same pin; the native layer calls `callback(ctx)` on
    /// every enabled trigger until then.
    unsafe fn gpio_interrupt_install(
        &self,
        pin: Self::Handle,
        ctx: Context,
        callback: Trampoline,
    ) -> i32;

    /// Remove the interrupt trampoline; it never fires after this returns
    fn gpio_interrupt_uninstall(&self, pin: Self::Handle) -> i32;

    /// Resume interrupt delivery
    fn gpio_interrupt_enable(&self, pin: Self::Handle) -> i32;

    /// Pause interrupt delivery without uninstalling
    fn gpio_interrupt_disable(&self, pin: Self::Handle) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_direction_validity() {
        assert!(PinMode::PullUp.valid_for(Direction::Output));
        assert!(PinMode::PullUp.valid_for(Direction::Input));
        assert!(PinMode::PullDown.valid_for(Direction::Input));
        assert!(!PinMode::PullDown.valid_for(Direction::Output));
        assert!(PinMode::OpenDrain.valid_for(Direction::Output));
        assert!(!PinMode::OpenDrain.valid_for(Direction::Input));
    }

    #[test]
    fn test_trigger_conditions() {
        assert!(InterruptMode::RisingEdge.triggers(false, true));
        assert!(!InterruptMode::RisingEdge.triggers(true, false));
        assert!(InterruptMode::FallingEdge.triggers(true, false));
        assert!(InterruptMode::BothEdges.triggers(true, false));
        assert!(InterruptMode::BothEdges.triggers(false, true));
        assert!(!InterruptMode::BothEdges.triggers(true, true));
        assert!(InterruptMode::HighLevel.triggers(true, true));
        assert!(InterruptMode::LowLevel.triggers(true, false));
    }
}
