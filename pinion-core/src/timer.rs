//! Software timer
//!
//! A timer expires once ([`TimerMode::OneShot`]) and stops, or every period
//! ([`TimerMode::Period`]) until stopped. Mode and period changes on a
//! started timer restart it with the new settings; an expired one-shot
//! timer counts as stopped.

use pinion_hal::TimerHal;

pub use pinion_hal::timer::TimerMode;

use crate::cache::Cached;
use crate::callback::Callback;
use crate::error::{check, Error, Invalid, Peripheral, Result};
use crate::handle::Owned;

/// Trigger mode and period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimerConfig {
    pub mode: TimerMode,
    pub period_ms: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            mode: TimerMode::Period,
            period_ms: 1000,
        }
    }
}

impl TimerConfig {
    fn validate(&self) -> Result<()> {
        if self.period_ms == 0 {
            warn!("timer period must be non-zero");
            return Err(Error::InvalidArgument(Invalid::Period));
        }
        Ok(())
    }
}

pub struct Timer<H: TimerHal> {
    handle: Owned<H>,
    config: Cached<TimerConfig>,
    started: bool,
    callback: Option<Callback>,
}

impl<H: TimerHal> Timer<H> {
    /// Create a stopped timer
    pub fn new(hal: &H, config: TimerConfig) -> Result<Self> {
        config.validate()?;
        let raw = hal.timer_open().ok_or_else(|| {
            warn!("open of timer failed");
            Error::OpenFailed {
                kind: Peripheral::Timer,
                id: 0,
            }
        })?;
        debug!("opened timer");
        Ok(Self {
            handle: Owned::new(hal.clone(), raw, Peripheral::Timer, H::timer_close),
            config: Cached::new(config),
            started: false,
            callback: None,
        })
    }

    pub fn config(&self) -> TimerConfig {
        self.config.get()
    }

    pub fn mode(&self) -> TimerMode {
        self.config.get().mode
    }

    pub fn period_ms(&self) -> u32 {
        self.config.get().period_ms
    }

    /// Whether the timer is counting towards an expiry
    ///
    /// False before `start`, after `stop`, and once a one-shot timer has
    /// expired.
    pub fn is_started(&self) -> bool {
        self.started && !self.expired()
    }

    /// A started one-shot timer stops by itself after its expiry
    fn expired(&self) -> bool {
        self.config.get().mode == TimerMode::OneShot && self.remaining() == 0
    }

    /// Drop the started flag once a one-shot timer has expired
    fn refresh(&mut self) -> bool {
        self.started = self.is_started();
        self.started
    }

    pub fn set_mode(&mut self, mode: TimerMode) -> Result<()> {
        let period_ms = self.config.get().period_ms;
        self.set_config(TimerConfig { mode, period_ms })
    }

    pub fn set_period(&mut self, period_ms: u32) -> Result<()> {
        let mode = self.config.get().mode;
        self.set_config(TimerConfig { mode, period_ms })
    }

    /// Replace mode and period; a started timer is restarted with them
    pub fn set_config(&mut self, config: TimerConfig) -> Result<()> {
        config.validate()?;
        let started = self.refresh();
        let handle = &self.handle;
        self.config.update(config, |c| {
            if started {
                check(handle.hal().timer_start(handle.raw(), c.mode, c.period_ms))?;
            }
            Ok(())
        })
    }

    /// Install the expiry handler, optionally starting the timer
    ///
    /// An installed handler is removed and replaced.
    pub fn set_interrupt(
        &mut self,
        handler: impl FnMut() + Send + 'static,
        start: bool,
    ) -> Result<()> {
        if self.callback.is_some() {
            warn!("replacing timer callback");
            self.uninstall()?;
        }
        let callback = Callback::new(handler);
        let hal = self.handle.hal();
        // SAFETY: stored in `self.callback` and removed before it is freed.
        check(unsafe {
            hal.timer_add_callback(self.handle.raw(), callback.context(), callback.trampoline())
        })?;
        self.callback = Some(callback);
        if start {
            self.start()?;
        }
        Ok(())
    }

    /// Remove the expiry handler; the timer keeps running
    pub fn remove_interrupt(&mut self) -> Result<()> {
        if self.callback.is_none() {
            return Err(Error::NotRegistered);
        }
        self.uninstall()
    }

    pub fn start(&mut self) -> Result<()> {
        let c = self.config.get();
        check(self.handle.hal().timer_start(self.handle.raw(), c.mode, c.period_ms))?;
        self.started = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        check(self.handle.hal().timer_stop(self.handle.raw()))?;
        self.started = false;
        Ok(())
    }

    /// Expiries since the last call
    pub fn status(&self) -> u32 {
        self.handle.hal().timer_status(self.handle.raw())
    }

    /// Milliseconds until the next expiry, zero when stopped
    pub fn remaining(&self) -> u32 {
        self.handle.hal().timer_remaining(self.handle.raw())
    }

    fn uninstall(&mut self) -> Result<()> {
        match self.callback.take() {
            Some(callback) => {
                callback.retire(self.handle.hal().timer_remove_callback(self.handle.raw()))
            }
            None => Ok(()),
        }
    }
}

impl<H: TimerHal> Drop for Timer<H> {
    fn drop(&mut self) {
        let _ = self.uninstall();
        if self.refresh() {
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

    fn counting_timer(sim: &SimHal, config: TimerConfig) -> (Timer<SimHal>, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        let mut timer = Timer::new(sim, config).unwrap();
        timer
            .set_interrupt(
                move || {
                    h.fetch_add(1, Ordering::SeqCst);
                },
                true,
            )
            .unwrap();
        (timer, hits)
    }

    #[test]
    fn test_one_shot_stops_after_expiry() {
        let sim = SimHal::new();
        let (timer, hits) = counting_timer(
            &sim,
            TimerConfig {
                mode: TimerMode::OneShot,
                period_ms: 100,
            },
        );
        sim.advance_ms(100);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        sim.advance_ms(1000);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(timer.remaining(), 0);
        assert!(!timer.is_started());
    }

    #[test]
    fn test_expired_one_shot_not_restarted_by_changes() {
        let sim = SimHal::new();
        let (mut timer, hits) = counting_timer(
            &sim,
            TimerConfig {
                mode: TimerMode::OneShot,
                period_ms: 100,
            },
        );
        sim.advance_ms(100);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        timer.set_period(200).unwrap();
        timer.set_mode(TimerMode::OneShot).unwrap();
        sim.advance_ms(200);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(sim.calls("timer_start"), 1);
        assert!(!timer.is_started());

        // An explicit start arms it again with the new period.
        timer.start().unwrap();
        assert!(timer.is_started());
        sim.advance_ms(200);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pending_one_shot_restarted_by_period_change() {
        let sim = SimHal::new();
        let (mut timer, hits) = counting_timer(
            &sim,
            TimerConfig {
                mode: TimerMode::OneShot,
                period_ms: 100,
            },
        );
        sim.advance_ms(50);
        timer.set_period(200).unwrap();
        assert!(timer.is_started());
        sim.advance_ms(150);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        sim.advance_ms(50);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_period_fires_every_interval() {
        let sim = SimHal::new();
        let (mut timer, hits) = counting_timer(
            &sim,
            TimerConfig {
                mode: TimerMode::Period,
                period_ms: 100,
            },
        );
        for _ in 0..3 {
            sim.advance_ms(100);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(timer.status(), 3);
        assert_eq!(timer.status(), 0);

        timer.remove_interrupt().unwrap();
        sim.advance_ms(500);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(timer.status(), 5);
    }

    #[test]
    fn test_remaining() {
        let sim = SimHal::new();
        let mut timer = Timer::new(&sim, TimerConfig::default()).unwrap();
        timer.start().unwrap();
        sim.advance_ms(250);
        assert_eq!(timer.remaining(), 750);
        timer.stop().unwrap();
        assert_eq!(timer.remaining(), 0);
    }

    #[test]
    fn test_period_change_rollback() {
        let sim = SimHal::new();
        let mut timer = Timer::new(&sim, TimerConfig::default()).unwrap();

        // Stopped: cached only
        timer.set_period(200).unwrap();
        assert_eq!(sim.calls("timer_start"), 0);

        timer.start().unwrap();
        sim.fail_next("timer_start", Errno::EBUSY);
        assert_eq!(timer.set_mode(TimerMode::OneShot), Err(Error::Hal(Errno::EBUSY)));
        assert_eq!(
            timer.config(),
            TimerConfig {
                mode: TimerMode::Period,
                period_ms: 200
            }
        );
        assert_eq!(
            timer.set_period(0),
            Err(Error::InvalidArgument(Invalid::Period))
        );
    }

    #[test]
    fn test_drop_removes_callback_before_close() {
        let sim = SimHal::new();
        let (timer, _hits) = counting_timer(&sim, TimerConfig::default());
        sim.reset_calls();
        drop(timer);
        assert_eq!(
            sim.call_log(),
            ["timer_remove_callback", "timer_stop", "timer_close"]
        );
        assert_eq!(sim.open_handles(), 0);
    }

    #[test]
    fn test_drop_of_expired_one_shot_skips_stop() {
        let sim = SimHal::new();
        let (timer, _hits) = counting_timer(
            &sim,
            TimerConfig {
                mode: TimerMode::OneShot,
                period_ms: 10,
            },
        );
        sim.advance_ms(10);
        sim.reset_calls();
        drop(timer);
        assert_eq!(
            sim.call_log(),
            ["timer_remove_callback", "timer_remaining", "timer_close"]
        );
        assert_eq!(sim.open_handles(), 0);
    }
}
