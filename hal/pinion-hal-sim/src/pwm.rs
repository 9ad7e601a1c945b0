//! Simulated PWM channels

use std::collections::HashMap;

use pinion_hal::pwm::{PwmHal, PwmInfo};
use pinion_hal::Errno;

use crate::{enter, Peripheral, SimHal, SimHandle};

/// What a PWM pin is currently emitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PwmOutput {
    pub period_us: u32,
    pub pulse_us: u32,
    pub suspended: bool,
}

struct Channel {
    id: u8,
    output: PwmOutput,
}

pub(crate) struct PwmBank {
    info: PwmInfo,
    channels: HashMap<SimHandle, Channel>,
}

impl Default for PwmBank {
    fn default() -> Self {
        Self {
            info: PwmInfo {
                max_frequency: 1_000_000,
                min_frequency: 1,
            },
            channels: HashMap::new(),
        }
    }
}

impl PwmBank {
    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }
}

macro_rules! channel {
    ($state:expr, $handle:expr) => {
        match $state.pwm.channels.get_mut(&$handle) {
            Some(ch) => ch,
            None => return $state.bad_handle(),
        }
    };
}

impl PwmHal for SimHal {
    fn pwm_device_count(&self) -> u32 {
        self.lock().device_count(Peripheral::Pwm)
    }

    fn pwm_open(&self, id: u8) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "pwm_open", None);
        if !s.has_device(Peripheral::Pwm, id) || s.pwm.channels.values().any(|c| c.id == id) {
            return None;
        }
        let handle = s.alloc();
        s.pwm.channels.insert(
            handle,
            Channel {
                id,
                output: PwmOutput::default(),
            },
        );
        Some(handle)
    }

    fn pwm_close(&self, pwm: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "pwm_close");
        match s.pwm.channels.remove(&pwm) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn pwm_set(&self, pwm: SimHandle, period_us: u32, pulse_us: u32) -> i32 {
        let mut s = self.lock();
        enter!(s, "pwm_set");
        let ch = channel!(s, pwm);
        if pulse_us > period_us {
            return Errno::EINVAL.as_ret();
        }
        ch.output.period_us = period_us;
        ch.output.pulse_us = pulse_us;
        0
    }

    fn pwm_suspend(&self, pwm: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "pwm_suspend");
        let ch = channel!(s, pwm);
        ch.output.suspended = true;
        0
    }

    fn pwm_resume(&self, pwm: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "pwm_resume");
        let ch = channel!(s, pwm);
        ch.output.suspended = false;
        0
    }

    fn pwm_info(&self, pwm: SimHandle, info: &mut PwmInfo) -> i32 {
        let mut s = self.lock();
        enter!(s, "pwm_info");
        if !s.pwm.channels.contains_key(&pwm) {
            return s.bad_handle();
        }
        *info = s.pwm.info;
        0
    }
}

impl SimHal {
    /// Output of PWM `id`, if it is open
    pub fn pwm_output(&self, id: u8) -> Option<PwmOutput> {
        self.lock()
            .pwm
            .channels
            .values()
            .find(|c| c.id == id)
            .map(|c| c.output)
    }

    /// Set the frequency range reported by every channel
    pub fn set_pwm_info(&self, info: PwmInfo) {
        self.lock().pwm.info = info;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_longer_than_period_rejected() {
        let sim = SimHal::new();
        let ch = sim.pwm_open(0).unwrap();
        assert_eq!(sim.pwm_set(ch, 100, 101), Errno::EINVAL.as_ret());
        assert_eq!(sim.pwm_set(ch, 100, 25), 0);
        assert_eq!(
            sim.pwm_output(0),
            Some(PwmOutput {
                period_us: 100,
                pulse_us: 25,
                suspended: false
            })
        );
    }
}
