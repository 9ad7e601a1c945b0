//! Simulated clock
//!
//! Time only moves when a test or the code under test asks it to: sleeping
//! and busy-waiting advance the clock and expire timers on the way.

use pinion_hal::time::TimeHal;

use crate::SimHal;

/// Simulated core clock
pub const CYCLES_PER_US: i64 = 125;

impl SimHal {
    pub(crate) fn advance_us(&self, us: i64) -> usize {
        let due = {
            let mut s = self.lock();
            let before_ms = s.clock_us / 1000;
            s.clock_us += us;
            let elapsed_ms = u32::try_from(s.clock_us / 1000 - before_ms).unwrap_or(u32::MAX);
            s.advance_timers(elapsed_ms)
        };
        for cb in &due {
            // SAFETY: collected from timers that still held the registration.
            unsafe { cb.fire() };
        }
        due.len()
    }
}

impl TimeHal for SimHal {
    fn sleep_ms(&self, ms: u32) {
        self.lock().enter("sleep_ms").ok();
        self.advance_us(i64::from(ms) * 1000);
    }

    fn wait_us(&self, us: u32) {
        self.lock().enter("wait_us").ok();
        self.advance_us(i64::from(us));
    }

    fn uptime_ms(&self) -> i64 {
        self.lock().clock_us / 1000
    }

    fn hw_cycles(&self) -> u32 {
        (self.lock().clock_us * CYCLES_PER_US) as u32
    }

    fn cycles_to_ns(&self, cycles: u32) -> u32 {
        (i64::from(cycles) * 1000 / CYCLES_PER_US) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_on_sleep() {
        let sim = SimHal::new();
        assert_eq!(sim.uptime_ms(), 0);
        sim.sleep_ms(5);
        sim.wait_us(1500);
        assert_eq!(sim.uptime_ms(), 6);
        assert_eq!(sim.cycles_to_ns(125), 1000);
        assert_eq!(sim.hw_cycles(), 6500 * 125);
    }
}
