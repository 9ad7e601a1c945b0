//! Host simulation of the Pinion native HAL
//!
//! [`SimHal`] implements every trait of `pinion-hal` against in-memory
//! state so the wrapper layer can be tested without hardware. On top of
//! the native contract it offers:
//!
//! - per-function call counters ([`SimHal::calls`]) and an ordered call
//!   log ([`SimHal::call_log`])
//! - fault injection ([`SimHal::fail_next`])
//! - event simulation: pin edges, counter pulses and alarms, timer time
//!   advance, canned bus responses, receive data
//!
//! Trampolines are always invoked after the simulator lock is released, so
//! a callback may call back into the HAL (for example to re-arm an alarm).
//!
//! Linking this crate also installs the `std` critical-section
//! implementation used by the wrapper layer's interrupt-safe cells.

mod adc;
mod counter;
mod eth;
mod fs;
mod gpio;
mod i2c;
mod i2s;
mod os;
mod pwm;
mod spi;
mod time;
mod timer;
mod uart;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pinion_hal::{AlarmTrampoline, Context, Errno, Hal, Trampoline};

// Pulls in the `std` critical-section implementation
use critical_section as _;

pub use gpio::PinState;
pub use i2c::I2cOp;
pub use pwm::PwmOutput;
pub use spi::SpiOp;

/// Device count reported for every peripheral family unless overridden
pub const DEFAULT_DEVICE_COUNT: u32 = 4;

/// Handle token handed out by the simulator
///
/// Tokens are unique across every simulated board in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimHandle(u32);

/// Peripheral families with an enumerable device count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peripheral {
    Gpio,
    Adc,
    Pwm,
    Counter,
    I2c,
    Spi,
    Uart,
    I2s,
}

/// Simulated native HAL
///
/// Cloning shares the same simulated board.
#[derive(Clone, Default)]
pub struct SimHal {
    state: Arc<Mutex<SimState>>,
}

impl Hal for SimHal {
    type Handle = SimHandle;
}

impl core::fmt::Debug for SimHal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimHal")
            .field("open_handles", &self.open_handles())
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct SimState {
    calls: HashMap<&'static str, usize>,
    log: Vec<&'static str>,
    faults: HashMap<&'static str, VecDeque<Errno>>,
    device_counts: HashMap<Peripheral, u32>,
    bad_handles: usize,
    pub(crate) clock_us: i64,
    pub(crate) gpio: gpio::GpioBank,
    pub(crate) adc: adc::AdcBank,
    pub(crate) pwm: pwm::PwmBank,
    pub(crate) counter: counter::CounterBank,
    pub(crate) timer: timer::TimerBank,
    pub(crate) i2c: i2c::I2cBank,
    pub(crate) spi: spi::SpiBank,
    pub(crate) uart: uart::UartBank,
    pub(crate) i2s: i2s::I2sBank,
    pub(crate) os: os::OsBank,
    pub(crate) fs: fs::FsBank,
    pub(crate) eth: eth::EthState,
}

impl SimState {
    /// Record a native call and consume a pending fault for it
    pub(crate) fn enter(&mut self, name: &'static str) -> Result<(), Errno> {
        *self.calls.entry(name).or_insert(0) += 1;
        self.log.push(name);
        match self.faults.get_mut(name).and_then(VecDeque::pop_front) {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }

    pub(crate) fn alloc(&mut self) -> SimHandle {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        SimHandle(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn device_count(&self, peripheral: Peripheral) -> u32 {
        self.device_counts
            .get(&peripheral)
            .copied()
            .unwrap_or(DEFAULT_DEVICE_COUNT)
    }

    pub(crate) fn has_device(&self, peripheral: Peripheral, id: u8) -> bool {
        u32::from(id) < self.device_count(peripheral)
    }

    /// Note a call made with a handle the simulator does not know
    pub(crate) fn bad_handle(&mut self) -> i32 {
        self.bad_handles += 1;
        Errno::EBADF.as_ret()
    }

    fn open_handles(&self) -> usize {
        self.gpio.len()
            + self.adc.len()
            + self.pwm.len()
            + self.counter.len()
            + self.timer.len()
            + self.i2c.len()
            + self.spi.len()
            + self.uart.len()
            + self.i2s.len()
            + self.os.len()
            + self.fs.len()
    }
}

/// Shorthand for the prologue of every simulated call
macro_rules! enter {
    ($state:expr, $name:literal) => {
        if let Err(errno) = $state.enter($name) {
            return errno.as_ret();
        }
    };
    ($state:expr, $name:literal, $fail:expr) => {
        if $state.enter($name).is_err() {
            return $fail;
        }
    };
}
pub(crate) use enter;

/// A registered `(ctx, trampoline)` pair
#[derive(Debug, Clone, Copy)]
pub(crate) struct Registered {
    ctx: usize,
    callback: Trampoline,
}

impl Registered {
    pub(crate) fn new(ctx: Context, callback: Trampoline) -> Self {
        Self {
            ctx: ctx as usize,
            callback,
        }
    }

    /// # Safety
    ///
    /// The registering code must still keep the context alive.
    pub(crate) unsafe fn fire(self) {
        // SAFETY: forwarded to the caller.
        unsafe { (self.callback)(self.ctx as Context) }
    }
}

/// A registered counter alarm trampoline
#[derive(Debug, Clone, Copy)]
pub(crate) struct RegisteredAlarm {
    ctx: usize,
    callback: AlarmTrampoline,
}

impl RegisteredAlarm {
    pub(crate) fn new(ctx: Context, callback: AlarmTrampoline) -> Self {
        Self {
            ctx: ctx as usize,
            callback,
        }
    }

    /// # Safety
    ///
    /// The registering code must still keep the context alive.
    pub(crate) unsafe fn fire(self, ticks: u32) {
        // SAFETY: forwarded to the caller.
        unsafe { (self.callback)(ticks, self.ctx as Context) }
    }
}

impl SimHal {
    /// A fresh simulated board
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of times the native function `name` was called
    pub fn calls(&self, name: &str) -> usize {
        self.lock().calls.get(name).copied().unwrap_or(0)
    }

    /// Every native call in order
    pub fn call_log(&self) -> Vec<&'static str> {
        self.lock().log.clone()
    }

    /// Forget all recorded calls
    pub fn reset_calls(&self) {
        let mut state = self.lock();
        state.calls.clear();
        state.log.clear();
    }

    /// Make the next call to `name` fail with `errno`
    ///
    /// Faults queue up: calling this twice fails the next two calls. Open
    /// calls fail by returning no handle.
    pub fn fail_next(&self, name: &'static str, errno: Errno) {
        self.lock()
            .faults
            .entry(name)
            .or_default()
            .push_back(errno);
    }

    /// Override the device count of a peripheral family
    pub fn set_device_count(&self, peripheral: Peripheral, count: u32) {
        self.lock().device_counts.insert(peripheral, count);
    }

    /// Handles currently open across every family
    pub fn open_handles(&self) -> usize {
        self.lock().open_handles()
    }

    /// Calls made with a handle that was never opened or already closed
    pub fn bad_handle_uses(&self) -> usize {
        self.lock().bad_handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinion_hal::gpio::{Direction, PinMode};
    use pinion_hal::GpioHal;

    #[test]
    fn test_fault_injection_consumed_once() {
        let sim = SimHal::new();
        let pin = sim
            .gpio_open(0, Direction::Output, PinMode::PullUp)
            .unwrap();

        sim.fail_next("gpio_set", Errno::EIO);
        assert_eq!(sim.gpio_set(pin, true), Errno::EIO.as_ret());
        assert_eq!(sim.gpio_set(pin, true), 0);
        assert_eq!(sim.calls("gpio_set"), 2);
    }

    #[test]
    fn test_call_log_order() {
        let sim = SimHal::new();
        let pin = sim
            .gpio_open(1, Direction::Output, PinMode::PullUp)
            .unwrap();
        sim.gpio_set(pin, true);
        sim.gpio_close(pin);

        assert_eq!(sim.call_log(), ["gpio_open", "gpio_set", "gpio_close"]);
        sim.reset_calls();
        assert!(sim.call_log().is_empty());
    }

    #[test]
    fn test_bad_handle_detected() {
        let sim = SimHal::new();
        let pin = sim
            .gpio_open(2, Direction::Output, PinMode::PullUp)
            .unwrap();
        assert_eq!(sim.gpio_close(pin), 0);
        assert_eq!(sim.gpio_close(pin), Errno::EBADF.as_ret());
        assert_eq!(sim.bad_handle_uses(), 1);
        assert_eq!(sim.open_handles(), 0);
    }
}
