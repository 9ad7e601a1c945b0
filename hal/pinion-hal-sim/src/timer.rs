//! Simulated millisecond timers
//!
//! Timers only advance when simulated time does, see
//! [`SimHal::advance_ms`].

use std::collections::HashMap;

use pinion_hal::timer::{TimerHal, TimerMode};
use pinion_hal::{Context, Errno, Trampoline};

use crate::{enter, Registered, SimHal, SimHandle, SimState};

struct Timer {
    mode: TimerMode,
    period_ms: u32,
    running: bool,
    elapsed_ms: u32,
    status: u32,
    callback: Option<Registered>,
}

#[derive(Default)]
pub(crate) struct TimerBank {
    timers: HashMap<SimHandle, Timer>,
}

impl TimerBank {
    pub(crate) fn len(&self) -> usize {
        self.timers.len()
    }
}

macro_rules! timer {
    ($state:expr, $handle:expr) => {
        match $state.timer.timers.get_mut(&$handle) {
            Some(t) => t,
            None => return $state.bad_handle(),
        }
    };
}

impl TimerHal for SimHal {
    fn timer_open(&self) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "timer_open", None);
        let handle = s.alloc();
        s.timer.timers.insert(
            handle,
            Timer {
                mode: TimerMode::Period,
                period_ms: 0,
                running: false,
                elapsed_ms: 0,
                status: 0,
                callback: None,
            },
        );
        Some(handle)
    }

    fn timer_close(&self, timer: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "timer_close");
        match s.timer.timers.remove(&timer) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn timer_start(&self, timer: SimHandle, mode: TimerMode, period_ms: u32) -> i32 {
        let mut s = self.lock();
        enter!(s, "timer_start");
        let t = timer!(s, timer);
        if period_ms == 0 {
            return Errno::EINVAL.as_ret();
        }
        t.mode = mode;
        t.period_ms = period_ms;
        t.running = true;
        t.elapsed_ms = 0;
        t.status = 0;
        0
    }

    fn timer_stop(&self, timer: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "timer_stop");
        let t = timer!(s, timer);
        t.running = false;
        t.elapsed_ms = 0;
        0
    }

    unsafe fn timer_add_callback(
        &self,
        timer: SimHandle,
        ctx: Context,
        callback: Trampoline,
    ) -> i32 {
        let mut s = self.lock();
        enter!(s, "timer_add_callback");
        let t = timer!(s, timer);
        t.callback = Some(Registered::new(ctx, callback));
        0
    }

    fn timer_remove_callback(&self, timer: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "timer_remove_callback");
        let t = timer!(s, timer);
        t.callback = None;
        0
    }

    fn timer_status(&self, timer: SimHandle) -> u32 {
        let mut s = self.lock();
        if s.enter("timer_status").is_err() {
            return 0;
        }
        match s.timer.timers.get_mut(&timer) {
            Some(t) => core::mem::take(&mut t.status),
            None => {
                s.bad_handle();
                0
            }
        }
    }

    fn timer_remaining(&self, timer: SimHandle) -> u32 {
        let mut s = self.lock();
        if s.enter("timer_remaining").is_err() {
            return 0;
        }
        match s.timer.timers.get(&timer) {
            Some(t) if t.running => t.period_ms - t.elapsed_ms,
            Some(_) => 0,
            None => {
                s.bad_handle();
                0
            }
        }
    }
}

impl SimState {
    /// Move every running timer forward, returning the callbacks to run
    pub(crate) fn advance_timers(&mut self, ms: u32) -> Vec<Registered> {
        let mut due = Vec::new();
        for t in self.timer.timers.values_mut().filter(|t| t.running) {
            let total = u64::from(t.elapsed_ms) + u64::from(ms);
            let period = u64::from(t.period_ms);
            let fires = match t.mode {
                TimerMode::OneShot if total >= period => {
                    t.running = false;
                    t.elapsed_ms = 0;
                    1
                }
                TimerMode::OneShot => {
                    t.elapsed_ms = total as u32;
                    0
                }
                TimerMode::Period => {
                    t.elapsed_ms = (total % period) as u32;
                    total / period
                }
            };
            t.status = t.status.saturating_add(fires as u32);
            if let Some(cb) = t.callback {
                due.extend(core::iter::repeat(cb).take(fires as usize));
            }
        }
        due
    }
}

impl SimHal {
    /// Advance simulated time, expiring timers on the way
    ///
    /// Returns the number of timer callbacks that ran.
    pub fn advance_ms(&self, ms: u32) -> usize {
        self.advance_us(i64::from(ms) * 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static FIRED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn count(_ctx: Context) {
        FIRED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_period_and_one_shot() {
        let sim = SimHal::new();
        let t = sim.timer_open().unwrap();
        unsafe { sim.timer_add_callback(t, core::ptr::null(), count) };

        sim.timer_start(t, TimerMode::Period, 100);
        assert_eq!(sim.advance_ms(250), 2);
        assert_eq!(sim.timer_remaining(t), 50);
        assert_eq!(sim.timer_status(t), 2);
        assert_eq!(sim.timer_status(t), 0);

        sim.timer_start(t, TimerMode::OneShot, 100);
        assert_eq!(sim.advance_ms(1000), 1);
        assert_eq!(sim.advance_ms(1000), 0);
        assert_eq!(sim.timer_remaining(t), 0);
    }
}
