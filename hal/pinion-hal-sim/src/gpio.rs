//! Simulated GPIO bank

use std::collections::HashMap;

use pinion_hal::gpio::{Direction, GpioHal, InterruptMode, PinMode};
use pinion_hal::{Context, Errno, Trampoline};

use crate::{enter, Peripheral, Registered, SimHal, SimHandle};

/// Observable state of an open pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinState {
    pub direction: Direction,
    pub mode: PinMode,
    pub level: bool,
    pub interrupt_mode: Option<InterruptMode>,
    pub callback_installed: bool,
    pub interrupt_enabled: bool,
}

struct Pin {
    id: u8,
    state: PinState,
    callback: Option<Registered>,
}

#[derive(Default)]
pub(crate) struct GpioBank {
    pins: HashMap<SimHandle, Pin>,
}

impl GpioBank {
    pub(crate) fn len(&self) -> usize {
        self.pins.len()
    }

    fn by_id(&mut self, id: u8) -> Option<&mut Pin> {
        self.pins.values_mut().find(|p| p.id == id)
    }
}

macro_rules! pin {
    ($state:expr, $handle:expr) => {
        match $state.gpio.pins.get_mut(&$handle) {
            Some(pin) => pin,
            None => return $state.bad_handle(),
        }
    };
}

impl GpioHal for SimHal {
    fn gpio_device_count(&self) -> u32 {
        self.lock().device_count(Peripheral::Gpio)
    }

    fn gpio_open(&self, id: u8, direction: Direction, mode: PinMode) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "gpio_open", None);
        if !s.has_device(Peripheral::Gpio, id) || s.gpio.by_id(id).is_some() {
            return None;
        }
        if !mode.valid_for(direction) {
            return None;
        }
        let handle = s.alloc();
        s.gpio.pins.insert(
            handle,
            Pin {
                id,
                state: PinState {
                    direction,
                    mode,
                    level: matches!(mode, PinMode::PullUp),
                    interrupt_mode: None,
                    callback_installed: false,
                    interrupt_enabled: false,
                },
                callback: None,
            },
        );
        Some(handle)
    }

    fn gpio_close(&self, pin: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "gpio_close");
        match s.gpio.pins.remove(&pin) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn gpio_configure(&self, pin: SimHandle, direction: Direction, mode: PinMode) -> i32 {
        let mut s = self.lock();
        enter!(s, "gpio_configure");
        let pin = pin!(s, pin);
        if !mode.valid_for(direction) {
            return Errno::ENOTSUP.as_ret();
        }
        pin.state.direction = direction;
        pin.state.mode = mode;
        0
    }

    fn gpio_set(&self, pin: SimHandle, high: bool) -> i32 {
        let mut s = self.lock();
        enter!(s, "gpio_set");
        let pin = pin!(s, pin);
        if pin.state.direction != Direction::Output {
            return Errno::EPERM.as_ret();
        }
        pin.state.level = high;
        0
    }

    fn gpio_get(&self, pin: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "gpio_get");
        let pin = pin!(s, pin);
        i32::from(pin.state.level)
    }

    fn gpio_interrupt_configure(&self, pin: SimHandle, mode: InterruptMode) -> i32 {
        let mut s = self.lock();
        enter!(s, "gpio_interrupt_configure");
        let pin = pin!(s, pin);
        if pin.state.direction != Direction::Input {
            return Errno::ENOTSUP.as_ret();
        }
        pin.state.interrupt_mode = Some(mode);
        0
    }

    unsafe fn gpio_interrupt_install(
        &self,
        pin: SimHandle,
        ctx: Context,
        callback: Trampoline,
    ) -> i32 {
        let mut s = self.lock();
        enter!(s, "gpio_interrupt_install");
        let pin = pin!(s, pin);
        pin.callback = Some(Registered::new(ctx, callback));
        pin.state.callback_installed = true;
        0
    }

    fn gpio_interrupt_uninstall(&self, pin: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "gpio_interrupt_uninstall");
        let pin = pin!(s, pin);
        pin.callback = None;
        pin.state.callback_installed = false;
        pin.state.interrupt_enabled = false;
        0
    }

    fn gpio_interrupt_enable(&self, pin: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "gpio_interrupt_enable");
        let pin = pin!(s, pin);
        if pin.state.interrupt_mode.is_none() {
            return Errno::EINVAL.as_ret();
        }
        pin.state.interrupt_enabled = true;
        0
    }

    fn gpio_interrupt_disable(&self, pin: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "gpio_interrupt_disable");
        let pin = pin!(s, pin);
        pin.state.interrupt_enabled = false;
        0
    }
}

impl SimHal {
    /// Drive the external level of pin `id`
    ///
    /// Fires the installed callback when the interrupt is enabled and the
    /// transition matches the configured trigger. Returns whether it fired.
    pub fn gpio_drive(&self, id: u8, level: bool) -> bool {
        let fire = {
            let mut s = self.lock();
            let Some(pin) = s.gpio.by_id(id) else {
                return false;
            };
            let from = pin.state.level;
            pin.state.level = level;
            match (pin.callback, pin.state.interrupt_mode) {
                (Some(cb), Some(mode)) if pin.state.interrupt_enabled && mode.triggers(from, level) => {
                    Some(cb)
                }
                _ => None,
            }
        };
        match fire {
            // SAFETY: the callback is still registered with the pin.
            Some(cb) => {
                unsafe { cb.fire() };
                true
            }
            None => false,
        }
    }

    /// State of pin `id`, if it is open
    pub fn gpio_state(&self, id: u8) -> Option<PinState> {
        self.lock().gpio.by_id(id).map(|p| p.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static FIRED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn count_fire(_ctx: Context) {
        FIRED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_pin_exclusive_open() {
        let sim = SimHal::new();
        let pin = sim.gpio_open(3, Direction::Input, PinMode::PullDown);
        assert!(pin.is_some());
        assert!(sim.gpio_open(3, Direction::Input, PinMode::PullDown).is_none());
        assert!(sim.gpio_open(9, Direction::Input, PinMode::PullDown).is_none());
    }

    #[test]
    fn test_edge_fires_only_when_enabled() {
        let sim = SimHal::new();
        let pin = sim
            .gpio_open(0, Direction::Input, PinMode::PullDown)
            .unwrap();
        assert_eq!(sim.gpio_interrupt_configure(pin, InterruptMode::RisingEdge), 0);
        unsafe { sim.gpio_interrupt_install(pin, core::ptr::null(), count_fire) };

        let before = FIRED.load(Ordering::SeqCst);
        assert!(!sim.gpio_drive(0, true));
        sim.gpio_drive(0, false);

        sim.gpio_interrupt_enable(pin);
        assert!(sim.gpio_drive(0, true));
        assert!(!sim.gpio_drive(0, false));
        assert_eq!(FIRED.load(Ordering::SeqCst) - before, 1);
    }

    #[test]
    fn test_set_rejected_on_input() {
        let sim = SimHal::new();
        let pin = sim
            .gpio_open(1, Direction::Input, PinMode::PullNone)
            .unwrap();
        assert_eq!(sim.gpio_set(pin, true), Errno::EPERM.as_ret());
        sim.gpio_drive(1, true);
        assert_eq!(sim.gpio_get(pin), 1);
    }
}
