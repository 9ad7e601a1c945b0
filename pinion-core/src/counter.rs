//! Pulse counter with a single alarm channel
//!
//! An alarm fires once. A closure that wants periodic alarms returns the
//! ticks to the next one and the bridge re-arms the channel after it
//! returns; returning `None` leaves the channel free.

use pinion_hal::CounterHal;

pub use pinion_hal::counter::CounterMode;

use crate::cache::Cached;
use crate::callback::AlarmCallback;
use crate::error::{check, Error, Peripheral, Result};
use crate::handle::{open_device, Owned};

/// Edge counter
pub struct Counter<H: CounterHal> {
    handle: Owned<H>,
    id: u8,
    mode: Cached<CounterMode>,
    running: bool,
    alarm: Option<AlarmCallback<H>>,
}

impl<H: CounterHal> Counter<H> {
    /// Open counter `id` and start counting
    pub fn new(hal: &H, id: u8, mode: CounterMode) -> Result<Self> {
        let handle = open_device(
            hal,
            Peripheral::Counter,
            id,
            hal.counter_device_count(),
            |hal| hal.counter_open(id, mode),
            H::counter_close,
        )?;
        let mut counter = Self {
            handle,
            id,
            mode: Cached::new(mode),
            running: false,
            alarm: None,
        };
        counter.start()?;
        Ok(counter)
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn mode(&self) -> CounterMode {
        self.mode.get()
    }

    pub fn set_mode(&mut self, mode: CounterMode) -> Result<()> {
        let handle = &self.handle;
        self.mode.update(mode, |m| {
            check(handle.hal().counter_configure(handle.raw(), *m)).map(|_| ())
        })
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) -> Result<()> {
        check(self.handle.hal().counter_start(self.handle.raw()))?;
        self.running = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        check(self.handle.hal().counter_stop(self.handle.raw()))?;
        self.running = false;
        Ok(())
    }

    /// Current tick count, optionally resetting it
    ///
    /// With `clear` the read and the reset are a single native operation,
    /// so edges arriving meanwhile are neither lost nor counted twice.
    pub fn read(&self, clear: bool) -> Result<u32> {
        let hal = self.handle.hal();
        let mut ticks = 0;
        let ret = if clear {
            hal.counter_take(self.handle.raw(), &mut ticks)
        } else {
            hal.counter_read(self.handle.raw(), &mut ticks)
        };
        check(ret)?;
        Ok(ticks)
    }

    /// Reset the tick count to zero
    pub fn clear(&self) -> Result<()> {
        self.read(true).map(|_| ())
    }

    /// Tick rate in Hz, zero for event counters
    pub fn frequency(&self) -> u32 {
        self.handle.hal().counter_frequency(self.handle.raw())
    }

    pub fn ticks_to_us(&self, ticks: u32) -> u64 {
        self.handle.hal().counter_ticks_to_us(self.handle.raw(), ticks)
    }

    pub fn us_to_ticks(&self, us: u64) -> u32 {
        self.handle.hal().counter_us_to_ticks(self.handle.raw(), us)
    }

    pub fn max_top_value(&self) -> u32 {
        self.handle.hal().counter_max_top_value(self.handle.raw())
    }

    /// Whether an alarm callback is installed
    pub fn has_alarm(&self) -> bool {
        self.alarm.is_some()
    }

    /// Install `handler` and arm the alarm `ticks` from now
    ///
    /// An installed alarm is cancelled and replaced.
    pub fn set_alarm(
        &mut self,
        ticks: u32,
        handler: impl FnMut(u32) -> Option<u32> + Send + 'static,
    ) -> Result<()> {
        if self.alarm.is_some() {
            warn!("replacing alarm on counter {}", self.id);
            self.uninstall()?;
        }
        let hal = self.handle.hal();
        let raw = self.handle.raw();
        let alarm = AlarmCallback::new(hal.clone(), raw, handler);
        // SAFETY: stored in `self.alarm` and removed before it is freed.
        check(unsafe { hal.counter_add_callback(raw, alarm.context(), alarm.trampoline()) })?;
        self.alarm = Some(alarm);

        if let Err(e) = check(hal.counter_set_alarm(raw, ticks)) {
            let _ = self.uninstall();
            return Err(e);
        }
        Ok(())
    }

    /// Arm the installed alarm again, `ticks` from now
    pub fn rearm(&mut self, ticks: u32) -> Result<()> {
        if self.alarm.is_none() {
            return Err(Error::NotRegistered);
        }
        check(self.handle.hal().counter_set_alarm(self.handle.raw(), ticks)).map(|_| ())
    }

    /// Disarm a pending alarm, keeping the callback installed
    pub fn cancel_alarm(&mut self) -> Result<()> {
        if self.alarm.is_none() {
            return Err(Error::NotRegistered);
        }
        check(self.handle.hal().counter_cancel_alarm(self.handle.raw())).map(|_| ())
    }

    /// Disarm and uninstall the alarm callback
    pub fn remove_alarm(&mut self) -> Result<()> {
        if self.alarm.is_none() {
            return Err(Error::NotRegistered);
        }
        self.uninstall()
    }

    fn uninstall(&mut self) -> Result<()> {
        let Some(alarm) = self.alarm.take() else {
            return Ok(());
        };
        let hal = self.handle.hal();
        let ret = hal.counter_cancel_alarm(self.handle.raw());
        if ret < 0 {
            warn!("cancelling alarm on counter {} failed: {}", self.id, ret);
        }
        alarm.retire(hal.counter_remove_callback(self.handle.raw()))
    }
}

impl<H: CounterHal> Drop for Counter<H> {
    fn drop(&mut self) {
        let _ = self.uninstall();
        if self.running {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU32, Ordering};
    use pinion_hal::Errno;
    use pinion_hal_sim::SimHal;

    #[test]
    fn test_counts_edges() {
        let sim = SimHal::new();
        let counter = Counter::new(&sim, 0, CounterMode::RisingEdge).unwrap();
        assert!(counter.is_running());
        sim.counter_pulse(0, 42);
        assert_eq!(counter.read(false).unwrap(), 42);
        assert_eq!(counter.read(false).unwrap(), 42);
    }

    #[test]
    fn test_read_and_clear_is_one_call() {
        let sim = SimHal::new();
        let counter = Counter::new(&sim, 1, CounterMode::BothEdges).unwrap();
        sim.counter_pulse(1, 7);
        sim.reset_calls();
        assert_eq!(counter.read(true).unwrap(), 7);
        assert_eq!(sim.calls("counter_take"), 1);
        assert_eq!(sim.calls("counter_read"), 0);
        sim.counter_pulse(1, 3);
        assert_eq!(counter.read(false).unwrap(), 3);
    }

    #[test]
    fn test_mode_rollback() {
        let sim = SimHal::new();
        let mut counter = Counter::new(&sim, 0, CounterMode::RisingEdge).unwrap();
        sim.fail_next("counter_configure", Errno::ENOTSUP);
        assert!(counter.set_mode(CounterMode::BothEdges).is_err());
        assert_eq!(counter.mode(), CounterMode::RisingEdge);
        counter.set_mode(CounterMode::BothEdges).unwrap();
        assert_eq!(sim.counter_mode(0), Some(CounterMode::BothEdges));
    }

    #[test]
    fn test_one_shot_alarm() {
        let sim = SimHal::new();
        let mut counter = Counter::new(&sim, 0, CounterMode::RisingEdge).unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        counter
            .set_alarm(100, move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                None
            })
            .unwrap();
        sim.counter_pulse(0, 150);
        sim.counter_pulse(0, 150);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        counter.rearm(10).unwrap();
        sim.counter_pulse(0, 10);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_periodic_alarm_until_removed() {
        let sim = SimHal::new();
        let mut counter = Counter::new(&sim, 0, CounterMode::RisingEdge).unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        counter
            .set_alarm(10, move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Some(10)
            })
            .unwrap();
        for _ in 0..3 {
            sim.counter_pulse(0, 10);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        counter.remove_alarm().unwrap();
        for _ in 0..3 {
            sim.counter_pulse(0, 10);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(counter.remove_alarm(), Err(Error::NotRegistered));
    }

    #[test]
    fn test_cancel_keeps_callback() {
        let sim = SimHal::new();
        let mut counter = Counter::new(&sim, 0, CounterMode::RisingEdge).unwrap();
        counter.set_alarm(5, |_| None).unwrap();
        counter.cancel_alarm().unwrap();
        assert_eq!(sim.counter_alarm_remaining(0), None);
        assert!(counter.has_alarm());
        assert!(!sim.counter_pulse(0, 10));
    }

    #[test]
    fn test_drop_order() {
        let sim = SimHal::new();
        let mut counter = Counter::new(&sim, 0, CounterMode::RisingEdge).unwrap();
        counter.set_alarm(5, |_| None).unwrap();
        sim.reset_calls();
        drop(counter);
        assert_eq!(
            sim.call_log(),
            [
                "counter_cancel_alarm",
                "counter_remove_callback",
                "counter_stop",
                "counter_close"
            ]
        );
    }

    #[test]
    fn test_conversions() {
        let sim = SimHal::new();
        let counter = Counter::new(&sim, 0, CounterMode::RisingEdge).unwrap();
        assert_eq!(counter.frequency(), 1_000_000);
        assert_eq!(counter.ticks_to_us(2_000), 2_000);
        assert_eq!(counter.us_to_ticks(10_000_000_000), u32::MAX);
        assert_eq!(counter.max_top_value(), u32::MAX);
    }
}
