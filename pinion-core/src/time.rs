//! Clock and delays

use core::time::Duration;

use pinion_hal::TimeHal;

/// Uptime, cycle counter and blocking delays
#[derive(Debug, Clone)]
pub struct Clock<H: TimeHal> {
    hal: H,
}

impl<H: TimeHal> Clock<H> {
    pub fn new(hal: &H) -> Self {
        Self { hal: hal.clone() }
    }

    /// Put the calling thread to sleep
    ///
    /// Whole milliseconds are slept; the sub-millisecond rest is busy-waited.
    pub fn sleep(&self, duration: Duration) {
        let ms = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        if ms > 0 {
            self.hal.sleep_ms(ms);
        }
        let rest_us = duration.subsec_micros() % 1000;
        if rest_us > 0 && ms < u32::MAX {
            self.hal.wait_us(rest_us);
        }
    }

    pub fn sleep_ms(&self, ms: u32) {
        self.hal.sleep_ms(ms);
    }

    /// Busy-wait without yielding
    pub fn wait_us(&self, us: u32) {
        self.hal.wait_us(us);
    }

    pub fn uptime(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.hal.uptime_ms()).unwrap_or(0))
    }

    pub fn uptime_ms(&self) -> i64 {
        self.hal.uptime_ms()
    }

    /// Free-running hardware cycle counter, wraps
    pub fn hw_cycles(&self) -> u32 {
        self.hal.hw_cycles()
    }

    pub fn cycles_to_ns(&self, cycles: u32) -> u32 {
        self.hal.cycles_to_ns(cycles)
    }

    /// Nanoseconds since `start`, a value read from [`hw_cycles`](Self::hw_cycles)
    pub fn ns_since(&self, start: u32) -> u32 {
        self.cycles_to_ns(self.hw_cycles().wrapping_sub(start))
    }
}

impl<H: TimeHal> embedded_hal::delay::DelayNs for Clock<H> {
    fn delay_ns(&mut self, ns: u32) {
        self.hal.wait_us(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        self.hal.wait_us(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.hal.sleep_ms(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::delay::DelayNs;
    use pinion_hal_sim::SimHal;

    #[test]
    fn test_sleep_splits_sub_millisecond_rest() {
        let sim = SimHal::new();
        let clock = Clock::new(&sim);
        clock.sleep(Duration::from_micros(2500));
        assert_eq!(sim.calls("sleep_ms"), 1);
        assert_eq!(sim.calls("wait_us"), 1);
        clock.sleep(Duration::from_micros(500));
        assert_eq!(clock.uptime(), Duration::from_millis(3));
        assert_eq!(sim.calls("sleep_ms"), 1);
    }

    #[test]
    fn test_cycle_counter() {
        let sim = SimHal::new();
        let clock = Clock::new(&sim);
        let start = clock.hw_cycles();
        clock.wait_us(10);
        assert_eq!(clock.ns_since(start), 10_000);
        assert_eq!(clock.uptime_ms(), 0);
    }

    #[test]
    fn test_delay_ns_rounds_up() {
        let sim = SimHal::new();
        let mut clock = Clock::new(&sim);
        clock.delay_ns(1);
        clock.delay_us(999);
        assert_eq!(clock.uptime_ms(), 1);
        clock.delay_ms(4);
        assert_eq!(clock.uptime_ms(), 5);
    }
}
