//! Digital pins
//!
//! [`DigitalOut`] and [`DigitalIn`] fix the direction at construction;
//! [`DigitalInOut`] can flip it at runtime. Only inputs carry interrupts.
//!
//! Interrupt delivery has three layers that are controlled separately: the
//! trigger condition, the installed callback, and whether delivery is
//! enabled. [`DigitalIn::disable_interrupt`] pauses delivery and keeps the
//! callback installed; [`DigitalIn::remove_interrupt`] uninstalls it.

use pinion_hal::GpioHal;

pub use pinion_hal::gpio::{Direction, InterruptMode, PinMode};

use crate::cache::Cached;
use crate::callback::Callback;
use crate::error::{check, Error, Invalid, Peripheral, Result};
use crate::handle::{open_device, Owned};

/// Direction and electrical mode of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PinConfig {
    pub direction: Direction,
    pub mode: PinMode,
}

impl PinConfig {
    pub const fn output(mode: PinMode) -> Self {
        Self {
            direction: Direction::Output,
            mode,
        }
    }

    pub const fn input(mode: PinMode) -> Self {
        Self {
            direction: Direction::Input,
            mode,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.mode.valid_for(self.direction) {
            Ok(())
        } else {
            warn!("{:?} is not valid for {:?}", self.mode, self.direction);
            Err(Error::InvalidArgument(Invalid::PinMode))
        }
    }
}

/// Interrupt registration state of an input pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptState {
    /// No callback installed
    NotRegistered,
    /// Callback installed and firing
    Enabled,
    /// Callback installed, delivery paused
    Disabled,
}

struct Pin<H: GpioHal> {
    handle: Owned<H>,
    id: u8,
    config: Cached<PinConfig>,
}

impl<H: GpioHal> Pin<H> {
    fn open(hal: &H, id: u8, config: PinConfig) -> Result<Self> {
        config.validate()?;
        let handle = open_device(
            hal,
            Peripheral::Gpio,
            id,
            hal.gpio_device_count(),
            |hal| hal.gpio_open(id, config.direction, config.mode),
            H::gpio_close,
        )?;
        Ok(Self {
            handle,
            id,
            config: Cached::new(config),
        })
    }

    fn reconfigure(&mut self, config: PinConfig) -> Result<()> {
        config.validate()?;
        let handle = &self.handle;
        self.config.update(config, |c| {
            check(handle.hal().gpio_configure(handle.raw(), c.direction, c.mode)).map(|_| ())
        })
    }

    fn set(&self, high: bool) -> Result<()> {
        check(self.handle.hal().gpio_set(self.handle.raw(), high)).map(|_| ())
    }

    fn get(&self) -> Result<bool> {
        check(self.handle.hal().gpio_get(self.handle.raw())).map(|v| v != 0)
    }
}

/// Push-pull or open-drain output pin
pub struct DigitalOut<H: GpioHal> {
    pin: Pin<H>,
    level: bool,
}

impl<H: GpioHal> DigitalOut<H> {
    /// Open pin `id` as an output and drive `initial`
    pub fn new(hal: &H, id: u8, mode: PinMode, initial: bool) -> Result<Self> {
        let pin = Pin::open(hal, id, PinConfig::output(mode))?;
        let mut out = Self { pin, level: initial };
        out.write(initial)?;
        Ok(out)
    }

    pub fn id(&self) -> u8 {
        self.pin.id
    }

    pub fn mode(&self) -> PinMode {
        self.pin.config.get().mode
    }

    /// Change the drive mode
    pub fn set_mode(&mut self, mode: PinMode) -> Result<()> {
        self.pin.reconfigure(PinConfig::output(mode))
    }

    /// Drive the pin
    pub fn write(&mut self, high: bool) -> Result<()> {
        self.pin.set(high)?;
        self.level = high;
        Ok(())
    }

    pub fn high(&mut self) -> Result<()> {
        self.write(true)
    }

    pub fn low(&mut self) -> Result<()> {
        self.write(false)
    }

    pub fn toggle(&mut self) -> Result<()> {
        self.write(!self.level)
    }

    /// Level last driven by this wrapper
    pub fn level(&self) -> bool {
        self.level
    }

    /// Release the pin now
    pub fn close(self) -> Result<()> {
        self.pin.handle.close()
    }
}

/// Input pin with optional interrupt
pub struct DigitalIn<H: GpioHal> {
    pin: Pin<H>,
    trigger: Option<InterruptMode>,
    callback: Option<Callback>,
    enabled: bool,
}

impl<H: GpioHal> DigitalIn<H> {
    /// Open pin `id` as an input
    pub fn new(hal: &H, id: u8, mode: PinMode) -> Result<Self> {
        Ok(Self {
            pin: Pin::open(hal, id, PinConfig::input(mode))?,
            trigger: None,
            callback: None,
            enabled: false,
        })
    }

    pub fn id(&self) -> u8 {
        self.pin.id
    }

    pub fn mode(&self) -> PinMode {
        self.pin.config.get().mode
    }

    /// Change the pull mode
    pub fn set_mode(&mut self, mode: PinMode) -> Result<()> {
        self.pin.reconfigure(PinConfig::input(mode))
    }

    /// Sample the pin
    pub fn read(&self) -> Result<bool> {
        self.pin.get()
    }

    /// Trigger condition currently configured
    pub fn interrupt_mode(&self) -> Option<InterruptMode> {
        self.trigger
    }

    pub fn interrupt_state(&self) -> InterruptState {
        match (&self.callback, self.enabled) {
            (None, _) => InterruptState::NotRegistered,
            (Some(_), true) => InterruptState::Enabled,
            (Some(_), false) => InterruptState::Disabled,
        }
    }

    /// Install `handler` for `mode` edges or levels
    ///
    /// An installed callback is uninstalled and replaced. With `enable`
    /// false the new callback stays dormant until
    /// [`enable_interrupt`](Self::enable_interrupt).
    pub fn set_interrupt(
        &mut self,
        mode: InterruptMode,
        enable: bool,
        handler: impl FnMut() + Send + 'static,
    ) -> Result<()> {
        if self.callback.is_some() {
            warn!("replacing interrupt callback on pin {}", self.pin.id);
            self.uninstall()?;
        }
        self.set_interrupt_mode(mode)?;

        let callback = Callback::new(handler);
        let hal = self.pin.handle.hal();
        let raw = self.pin.handle.raw();
        // SAFETY: the callback is stored in `self` below and outlives the
        // registration; `uninstall` and `Drop` remove it before freeing.
        check(unsafe { hal.gpio_interrupt_install(raw, callback.context(), callback.trampoline()) })?;
        self.callback = Some(callback);

        if enable {
            self.enable_interrupt()?;
        }
        Ok(())
    }

    /// Change the trigger condition without touching the callback
    pub fn set_interrupt_mode(&mut self, mode: InterruptMode) -> Result<()> {
        let handle = &self.pin.handle;
        check(handle.hal().gpio_interrupt_configure(handle.raw(), mode))?;
        self.trigger = Some(mode);
        Ok(())
    }

    /// Resume delivery to the installed callback
    pub fn enable_interrupt(&mut self) -> Result<()> {
        if self.callback.is_none() {
            return Err(Error::NotRegistered);
        }
        let handle = &self.pin.handle;
        check(handle.hal().gpio_interrupt_enable(handle.raw()))?;
        self.enabled = true;
        Ok(())
    }

    /// Pause delivery, keeping the callback installed
    pub fn disable_interrupt(&mut self) -> Result<()> {
        if self.callback.is_none() {
            return Err(Error::NotRegistered);
        }
        let handle = &self.pin.handle;
        check(handle.hal().gpio_interrupt_disable(handle.raw()))?;
        self.enabled = false;
        Ok(())
    }

    /// Disable and uninstall the callback
    pub fn remove_interrupt(&mut self) -> Result<()> {
        if self.callback.is_none() {
            return Err(Error::NotRegistered);
        }
        self.uninstall()
    }

    fn uninstall(&mut self) -> Result<()> {
        let Some(callback) = self.callback.take() else {
            return Ok(());
        };
        let handle = &self.pin.handle;
        if self.enabled {
            let ret = handle.hal().gpio_interrupt_disable(handle.raw());
            if ret < 0 {
                warn!("disabling interrupt on pin {} failed: {}", self.pin.id, ret);
            }
            self.enabled = false;
        }
        callback.retire(handle.hal().gpio_interrupt_uninstall(handle.raw()))
    }
}

impl<H: GpioHal> Drop for DigitalIn<H> {
    fn drop(&mut self) {
        let _ = self.uninstall();
    }
}

/// Pin whose direction can change at runtime
pub struct DigitalInOut<H: GpioHal> {
    pin: Pin<H>,
    level: bool,
}

impl<H: GpioHal> DigitalInOut<H> {
    pub fn new(hal: &H, id: u8, config: PinConfig, initial: bool) -> Result<Self> {
        let pin = Pin::open(hal, id, config)?;
        let mut io = Self { pin, level: initial };
        if config.direction == Direction::Output {
            io.write(initial)?;
        }
        Ok(io)
    }

    pub fn id(&self) -> u8 {
        self.pin.id
    }

    pub fn config(&self) -> PinConfig {
        self.pin.config.get()
    }

    pub fn direction(&self) -> Direction {
        self.pin.config.get().direction
    }

    /// Flip the direction, keeping the current mode
    pub fn set_direction(&mut self, direction: Direction) -> Result<()> {
        let mode = self.pin.config.get().mode;
        self.pin.reconfigure(PinConfig { direction, mode })
    }

    /// Change direction and mode together
    pub fn set_config(&mut self, config: PinConfig) -> Result<()> {
        self.pin.reconfigure(config)
    }

    pub fn write(&mut self, high: bool) -> Result<()> {
        self.pin.set(high)?;
        self.level = high;
        Ok(())
    }

    pub fn read(&self) -> Result<bool> {
        self.pin.get()
    }

    pub fn close(self) -> Result<()> {
        self.pin.handle.close()
    }
}

impl<H: GpioHal> embedded_hal::digital::ErrorType for DigitalOut<H> {
    type Error = Error;
}

impl<H: GpioHal> embedded_hal::digital::OutputPin for DigitalOut<H> {
    fn set_low(&mut self) -> Result<()> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<()> {
        self.write(true)
    }
}

impl<H: GpioHal> embedded_hal::digital::StatefulOutputPin for DigitalOut<H> {
    fn is_set_high(&mut self) -> Result<bool> {
        Ok(self.level)
    }

    fn is_set_low(&mut self) -> Result<bool> {
        Ok(!self.level)
    }
}

impl<H: GpioHal> embedded_hal::digital::ErrorType for DigitalIn<H> {
    type Error = Error;
}

impl<H: GpioHal> embedded_hal::digital::InputPin for DigitalIn<H> {
    fn is_high(&mut self) -> Result<bool> {
        self.read()
    }

    fn is_low(&mut self) -> Result<bool> {
        self.read().map(|high| !high)
    }
}

impl<H: GpioHal> embedded_hal::digital::ErrorType for DigitalInOut<H> {
    type Error = Error;
}

impl<H: GpioHal> embedded_hal::digital::OutputPin for DigitalInOut<H> {
    fn set_low(&mut self) -> Result<()> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<()> {
        self.write(true)
    }
}

impl<H: GpioHal> embedded_hal::digital::InputPin for DigitalInOut<H> {
    fn is_high(&mut self) -> Result<bool> {
        self.read()
    }

    fn is_low(&mut self) -> Result<bool> {
        self.read().map(|high| !high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU32, Ordering};
    use embedded_hal::digital::{OutputPin, StatefulOutputPin};
    use pinion_hal::Errno;
    use pinion_hal_sim::SimHal;

    fn counter() -> (Arc<AtomicU32>, impl FnMut() + Send + 'static) {
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        (hits, move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_output_drives_level() {
        let sim = SimHal::new();
        let mut led = DigitalOut::new(&sim, 3, PinMode::PullUp, false).unwrap();
        assert!(!sim.gpio_state(3).unwrap().level);
        led.toggle().unwrap();
        assert!(sim.gpio_state(3).unwrap().level);
        led.set_low().unwrap();
        assert!(!led.is_set_high().unwrap());
    }

    #[test]
    fn test_invalid_mode_rejected_before_open() {
        let sim = SimHal::new();
        assert_eq!(
            DigitalOut::new(&sim, 0, PinMode::PullDown, false).err(),
            Some(Error::InvalidArgument(Invalid::PinMode))
        );
        assert_eq!(
            DigitalIn::new(&sim, 0, PinMode::OpenDrain).err(),
            Some(Error::InvalidArgument(Invalid::PinMode))
        );
        assert_eq!(sim.calls("gpio_open"), 0);
    }

    #[test]
    fn test_mode_rollback() {
        let sim = SimHal::new();
        let mut button = DigitalIn::new(&sim, 1, PinMode::PullUp).unwrap();
        sim.fail_next("gpio_configure", Errno::EIO);
        assert_eq!(button.set_mode(PinMode::PullDown), Err(Error::Hal(Errno::EIO)));
        assert_eq!(button.mode(), PinMode::PullUp);
        button.set_mode(PinMode::PullNone).unwrap();
        assert_eq!(sim.gpio_state(1).unwrap().mode, PinMode::PullNone);
    }

    #[test]
    fn test_close_exactly_once() {
        let sim = SimHal::new();
        {
            let _a = DigitalIn::new(&sim, 0, PinMode::PullDown).unwrap();
            let b = DigitalOut::new(&sim, 1, PinMode::OpenDrain, true).unwrap();
            b.close().unwrap();
        }
        assert_eq!(sim.calls("gpio_close"), 2);
        assert_eq!(sim.open_handles(), 0);
        assert_eq!(sim.bad_handle_uses(), 0);
    }

    #[test]
    fn test_callback_fires_until_removed() {
        let sim = SimHal::new();
        let mut pin = DigitalIn::new(&sim, 2, PinMode::PullDown).unwrap();
        let (hits, handler) = counter();
        pin.set_interrupt(InterruptMode::RisingEdge, true, handler).unwrap();

        for _ in 0..5 {
            sim.gpio_drive(2, true);
            sim.gpio_drive(2, false);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        pin.remove_interrupt().unwrap();
        assert_eq!(pin.interrupt_state(), InterruptState::NotRegistered);
        for _ in 0..5 {
            sim.gpio_drive(2, true);
            sim.gpio_drive(2, false);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(pin.remove_interrupt(), Err(Error::NotRegistered));
    }

    #[test]
    fn test_replace_only_new_callback_fires() {
        let sim = SimHal::new();
        let mut pin = DigitalIn::new(&sim, 0, PinMode::PullDown).unwrap();
        let (a_hits, a) = counter();
        let (b_hits, b) = counter();
        pin.set_interrupt(InterruptMode::RisingEdge, true, a).unwrap();
        pin.set_interrupt(InterruptMode::FallingEdge, true, b).unwrap();

        sim.gpio_drive(0, true);
        sim.gpio_drive(0, false);

        assert_eq!(a_hits.load(Ordering::SeqCst), 0);
        assert_eq!(b_hits.load(Ordering::SeqCst), 1);
        assert_eq!(sim.calls("gpio_interrupt_uninstall"), 1);
    }

    #[test]
    fn test_disable_keeps_registration() {
        let sim = SimHal::new();
        let mut pin = DigitalIn::new(&sim, 0, PinMode::PullUp).unwrap();
        let (hits, handler) = counter();
        pin.set_interrupt(InterruptMode::BothEdges, false, handler).unwrap();
        assert_eq!(pin.interrupt_state(), InterruptState::Disabled);
        sim.gpio_drive(0, false);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        pin.enable_interrupt().unwrap();
        sim.gpio_drive(0, true);
        pin.disable_interrupt().unwrap();
        sim.gpio_drive(0, false);
        assert!(sim.gpio_state(0).unwrap().callback_installed);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_uninstalls_before_close() {
        let sim = SimHal::new();
        let mut pin = DigitalIn::new(&sim, 0, PinMode::PullUp).unwrap();
        let (_hits, handler) = counter();
        pin.set_interrupt(InterruptMode::LowLevel, true, handler).unwrap();
        sim.reset_calls();
        drop(pin);
        assert_eq!(
            sim.call_log(),
            ["gpio_interrupt_disable", "gpio_interrupt_uninstall", "gpio_close"]
        );
    }

    #[test]
    fn test_inout_direction_flip() {
        let sim = SimHal::new();
        let mut io = DigitalInOut::new(&sim, 2, PinConfig::output(PinMode::PullUp), true).unwrap();
        io.set_direction(Direction::Input).unwrap();
        assert_eq!(sim.gpio_state(2).unwrap().direction, Direction::Input);
        assert_eq!(io.write(true), Err(Error::Hal(Errno::EPERM)));

        let err = io.set_config(PinConfig::output(PinMode::PullNone));
        assert_eq!(err, Err(Error::InvalidArgument(Invalid::PinMode)));
        assert_eq!(io.direction(), Direction::Input);

        io.set_direction(Direction::Output).unwrap();
        io.write(false).unwrap();
        assert!(!io.read().unwrap());
    }
}
