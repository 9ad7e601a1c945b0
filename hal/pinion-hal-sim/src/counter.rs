//! Simulated tick counters with a single alarm channel

use std::collections::HashMap;

use pinion_hal::counter::{CounterHal, CounterMode};
use pinion_hal::{AlarmTrampoline, Context, Errno};

use crate::{enter, Peripheral, RegisteredAlarm, SimHal, SimHandle};

/// Tick rate of every simulated counter
pub const COUNTER_FREQUENCY_HZ: u32 = 1_000_000;

struct Counter {
    id: u8,
    mode: CounterMode,
    running: bool,
    ticks: u32,
    /// Absolute tick value at which the armed alarm expires
    alarm_at: Option<u32>,
    callback: Option<RegisteredAlarm>,
}

#[derive(Default)]
pub(crate) struct CounterBank {
    counters: HashMap<SimHandle, Counter>,
}

impl CounterBank {
    pub(crate) fn len(&self) -> usize {
        self.counters.len()
    }

    fn by_id(&mut self, id: u8) -> Option<&mut Counter> {
        self.counters.values_mut().find(|c| c.id == id)
    }
}

macro_rules! counter {
    ($state:expr, $handle:expr) => {
        match $state.counter.counters.get_mut(&$handle) {
            Some(c) => c,
            None => return $state.bad_handle(),
        }
    };
}

impl CounterHal for SimHal {
    fn counter_device_count(&self) -> u32 {
        self.lock().device_count(Peripheral::Counter)
    }

    fn counter_open(&self, id: u8, mode: CounterMode) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "counter_open", None);
        if !s.has_device(Peripheral::Counter, id) || s.counter.by_id(id).is_some() {
            return None;
        }
        let handle = s.alloc();
        s.counter.counters.insert(
            handle,
            Counter {
                id,
                mode,
                running: false,
                ticks: 0,
                alarm_at: None,
                callback: None,
            },
        );
        Some(handle)
    }

    fn counter_close(&self, counter: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "counter_close");
        match s.counter.counters.remove(&counter) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn counter_configure(&self, counter: SimHandle, mode: CounterMode) -> i32 {
        let mut s = self.lock();
        enter!(s, "counter_configure");
        let c = counter!(s, counter);
        c.mode = mode;
        0
    }

    fn counter_read(&self, counter: SimHandle, ticks: &mut u32) -> i32 {
        let mut s = self.lock();
        enter!(s, "counter_read");
        *ticks = counter!(s, counter).ticks;
        0
    }

    fn counter_take(&self, counter: SimHandle, ticks: &mut u32) -> i32 {
        let mut s = self.lock();
        enter!(s, "counter_take");
        let c = counter!(s, counter);
        *ticks = c.ticks;
        c.ticks = 0;
        if let Some(at) = c.alarm_at.as_mut() {
            *at = at.saturating_sub(*ticks);
        }
        0
    }

    fn counter_start(&self, counter: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "counter_start");
        let c = counter!(s, counter);
        c.running = true;
        0
    }

    fn counter_stop(&self, counter: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "counter_stop");
        let c = counter!(s, counter);
        c.running = false;
        0
    }

    fn counter_frequency(&self, _counter: SimHandle) -> u32 {
        COUNTER_FREQUENCY_HZ
    }

    fn counter_ticks_to_us(&self, _counter: SimHandle, ticks: u32) -> u64 {
        u64::from(ticks) * 1_000_000 / u64::from(COUNTER_FREQUENCY_HZ)
    }

    fn counter_us_to_ticks(&self, _counter: SimHandle, us: u64) -> u32 {
        let ticks = us * u64::from(COUNTER_FREQUENCY_HZ) / 1_000_000;
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }

    fn counter_max_top_value(&self, _counter: SimHandle) -> u32 {
        u32::MAX
    }

    unsafe fn counter_add_callback(
        &self,
        counter: SimHandle,
        ctx: Context,
        callback: AlarmTrampoline,
    ) -> i32 {
        let mut s = self.lock();
        enter!(s, "counter_add_callback");
        let c = counter!(s, counter);
        c.callback = Some(RegisteredAlarm::new(ctx, callback));
        0
    }

    fn counter_remove_callback(&self, counter: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "counter_remove_callback");
        let c = counter!(s, counter);
        c.callback = None;
        c.alarm_at = None;
        0
    }

    fn counter_set_alarm(&self, counter: SimHandle, ticks: u32) -> i32 {
        let mut s = self.lock();
        enter!(s, "counter_set_alarm");
        let c = counter!(s, counter);
        if c.callback.is_none() {
            return Errno::EINVAL.as_ret();
        }
        if c.alarm_at.is_some() {
            return Errno::EBUSY.as_ret();
        }
        c.alarm_at = Some(c.ticks.saturating_add(ticks));
        0
    }

    fn counter_cancel_alarm(&self, counter: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "counter_cancel_alarm");
        let c = counter!(s, counter);
        c.alarm_at = None;
        0
    }
}

impl SimHal {
    /// Feed `pulses` input edges into counter `id`
    ///
    /// A stopped counter ignores them. When the armed alarm is reached it
    /// is disarmed and the callback runs once with the tick value at
    /// expiry; the callback may arm it again. Returns whether it fired.
    pub fn counter_pulse(&self, id: u8, pulses: u32) -> bool {
        let fire = {
            let mut s = self.lock();
            let Some(c) = s.counter.by_id(id) else {
                return false;
            };
            if !c.running {
                return false;
            }
            c.ticks = c.ticks.wrapping_add(pulses);
            match (c.alarm_at, c.callback) {
                (Some(at), Some(cb)) if c.ticks >= at => {
                    c.alarm_at = None;
                    Some((cb, c.ticks))
                }
                _ => None,
            }
        };
        match fire {
            Some((cb, ticks)) => {
                // SAFETY: the callback is still registered with the counter.
                unsafe { cb.fire(ticks) };
                true
            }
            None => false,
        }
    }

    /// Ticks until the armed alarm of counter `id` expires
    pub fn counter_alarm_remaining(&self, id: u8) -> Option<u32> {
        let mut s = self.lock();
        let c = s.counter.by_id(id)?;
        c.alarm_at.map(|at| at.saturating_sub(c.ticks))
    }

    /// Edge mode of counter `id`
    pub fn counter_mode(&self, id: u8) -> Option<CounterMode> {
        self.lock().counter.by_id(id).map(|c| c.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static LAST: AtomicU32 = AtomicU32::new(0);

    unsafe extern "C" fn record(ticks: u32, _ctx: Context) {
        LAST.store(ticks, Ordering::SeqCst);
    }

    #[test]
    fn test_alarm_is_single_shot() {
        let sim = SimHal::new();
        let c = sim.counter_open(0, CounterMode::RisingEdge).unwrap();
        sim.counter_start(c);
        unsafe { sim.counter_add_callback(c, core::ptr::null(), record) };

        assert_eq!(sim.counter_set_alarm(c, 10), 0);
        assert_eq!(sim.counter_set_alarm(c, 10), Errno::EBUSY.as_ret());
        assert!(!sim.counter_pulse(0, 9));
        assert!(sim.counter_pulse(0, 1));
        assert_eq!(LAST.load(Ordering::SeqCst), 10);
        assert!(!sim.counter_pulse(0, 100));
    }

    #[test]
    fn test_take_resets() {
        let sim = SimHal::new();
        let c = sim.counter_open(1, CounterMode::BothEdges).unwrap();
        sim.counter_start(c);
        sim.counter_pulse(1, 7);

        let mut ticks = 0;
        sim.counter_take(c, &mut ticks);
        assert_eq!(ticks, 7);
        sim.counter_read(c, &mut ticks);
        assert_eq!(ticks, 0);
    }
}
