//! PWM output
//!
//! The hardware takes a period and a pulse width in microseconds. The
//! frequency/duty form is converted with `period = 1_000_000 / frequency`
//! and `pulse = round(period * duty)`.

use pinion_hal::pwm::PwmInfo;
use pinion_hal::PwmHal;

use crate::cache::Cached;
use crate::error::{check, Error, Invalid, Peripheral, Result};
use crate::handle::{open_device, Owned};

const MICROS_PER_SECOND: u32 = 1_000_000;

/// Period and pulse width in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PwmConfig {
    pub period_us: u32,
    pub pulse_us: u32,
}

impl PwmConfig {
    /// Convert a frequency and duty cycle, without range checks
    pub fn from_frequency(frequency: u32, duty: f32) -> Self {
        let period_us = MICROS_PER_SECOND / frequency.max(1);
        Self {
            period_us,
            pulse_us: round(period_us as f32 * duty),
        }
    }

    pub fn frequency(&self) -> u32 {
        match self.period_us {
            0 => 0,
            p => MICROS_PER_SECOND / p,
        }
    }

    pub fn duty_cycle(&self) -> f32 {
        match self.period_us {
            0 => 0.0,
            p => self.pulse_us as f32 / p as f32,
        }
    }
}

/// Round half away from zero for non-negative values
fn round(x: f32) -> u32 {
    let floor = x as u32;
    if x - floor as f32 >= 0.5 {
        floor + 1
    } else {
        floor
    }
}

/// PWM output pin
pub struct PwmOut<H: PwmHal> {
    handle: Owned<H>,
    id: u8,
    info: PwmInfo,
    config: Cached<PwmConfig>,
    suspended: bool,
}

impl<H: PwmHal> PwmOut<H> {
    /// Open PWM `id` and start it at `frequency` Hz with `duty` in `[0, 1]`
    pub fn new(hal: &H, id: u8, frequency: u32, duty: f32) -> Result<Self> {
        let handle = open_device(
            hal,
            Peripheral::Pwm,
            id,
            hal.pwm_device_count(),
            |hal| hal.pwm_open(id),
            H::pwm_close,
        )?;
        let mut info = PwmInfo::default();
        check(hal.pwm_info(handle.raw(), &mut info))?;
        let mut pwm = Self {
            handle,
            id,
            info,
            config: Cached::new(PwmConfig::default()),
            suspended: false,
        };
        pwm.set_frequency_duty(frequency, duty)?;
        Ok(pwm)
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn info(&self) -> PwmInfo {
        self.info
    }

    pub fn config(&self) -> PwmConfig {
        self.config.get()
    }

    pub fn period_us(&self) -> u32 {
        self.config.get().period_us
    }

    pub fn pulse_us(&self) -> u32 {
        self.config.get().pulse_us
    }

    pub fn frequency(&self) -> u32 {
        self.config.get().frequency()
    }

    pub fn duty_cycle(&self) -> f32 {
        self.config.get().duty_cycle()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Set frequency in Hz and duty cycle in `[0, 1]`
    pub fn set_frequency_duty(&mut self, frequency: u32, duty: f32) -> Result<()> {
        self.check_frequency(frequency)?;
        check_duty(duty)?;
        self.push(PwmConfig::from_frequency(frequency, duty))
    }

    /// Change the duty cycle, keeping the period
    pub fn set_duty_cycle(&mut self, duty: f32) -> Result<()> {
        check_duty(duty)?;
        let period_us = self.config.get().period_us;
        self.push(PwmConfig {
            period_us,
            pulse_us: round(period_us as f32 * duty),
        })
    }

    /// Set period and pulse width directly
    pub fn set_period_pulse(&mut self, period_us: u32, pulse_us: u32) -> Result<()> {
        if period_us == 0 || pulse_us > period_us {
            warn!("PWM {}: pulse {} does not fit period {}", self.id, pulse_us, period_us);
            return Err(Error::InvalidArgument(Invalid::PulseWidth));
        }
        self.check_frequency(MICROS_PER_SECOND / period_us)?;
        self.push(PwmConfig {
            period_us,
            pulse_us,
        })
    }

    /// Stop the output, keeping the configuration
    pub fn suspend(&mut self) -> Result<()> {
        check(self.handle.hal().pwm_suspend(self.handle.raw()))?;
        self.suspended = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        check(self.handle.hal().pwm_resume(self.handle.raw()))?;
        self.suspended = false;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.handle.close()
    }

    fn check_frequency(&self, frequency: u32) -> Result<()> {
        if frequency < self.info.min_frequency || frequency > self.info.max_frequency {
            warn!(
                "PWM {}: {} Hz outside {}..={}",
                self.id, frequency, self.info.min_frequency, self.info.max_frequency
            );
            return Err(Error::InvalidArgument(Invalid::Frequency));
        }
        Ok(())
    }

    fn push(&mut self, config: PwmConfig) -> Result<()> {
        let handle = &self.handle;
        self.config.update(config, |c| {
            check(handle.hal().pwm_set(handle.raw(), c.period_us, c.pulse_us)).map(|_| ())
        })
    }
}

fn check_duty(duty: f32) -> Result<()> {
    if (0.0..=1.0).contains(&duty) {
        Ok(())
    } else {
        warn!("duty cycle {} outside [0, 1]", duty);
        Err(Error::InvalidArgument(Invalid::DutyCycle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinion_hal::Errno;
    use pinion_hal_sim::SimHal;

    #[test]
    fn test_new_pushes_initial_output() {
        let sim = SimHal::new();
        let pwm = PwmOut::new(&sim, 0, 1000, 0.25).unwrap();
        let out = sim.pwm_output(0).unwrap();
        assert_eq!((out.period_us, out.pulse_us), (1000, 250));
        assert_eq!(pwm.frequency(), 1000);
        assert_eq!(pwm.duty_cycle(), 0.25);
    }

    #[test]
    fn test_rejects_without_touching_cache() {
        let sim = SimHal::new();
        sim.set_pwm_info(PwmInfo {
            max_frequency: 10_000,
            min_frequency: 10,
        });
        let mut pwm = PwmOut::new(&sim, 1, 500, 0.5).unwrap();
        let before = pwm.config();
        sim.reset_calls();

        assert_eq!(
            pwm.set_frequency_duty(20_000, 0.5),
            Err(Error::InvalidArgument(Invalid::Frequency))
        );
        assert_eq!(
            pwm.set_frequency_duty(500, 1.5),
            Err(Error::InvalidArgument(Invalid::DutyCycle))
        );
        assert_eq!(
            pwm.set_duty_cycle(f32::NAN),
            Err(Error::InvalidArgument(Invalid::DutyCycle))
        );
        assert_eq!(
            pwm.set_period_pulse(100, 101),
            Err(Error::InvalidArgument(Invalid::PulseWidth))
        );
        assert_eq!(pwm.config(), before);
        assert_eq!(sim.calls("pwm_set"), 0);
    }

    #[test]
    fn test_hal_failure_rolls_back() {
        let sim = SimHal::new();
        let mut pwm = PwmOut::new(&sim, 0, 100, 0.1).unwrap();
        sim.fail_next("pwm_set", Errno::EIO);
        assert_eq!(pwm.set_period_pulse(2000, 1000), Err(Error::Hal(Errno::EIO)));
        assert_eq!(
            pwm.config(),
            PwmConfig {
                period_us: 10_000,
                pulse_us: 1000
            }
        );
    }

    #[test]
    fn test_suspend_resume() {
        let sim = SimHal::new();
        let mut pwm = PwmOut::new(&sim, 2, 50, 0.075).unwrap();
        pwm.suspend().unwrap();
        assert!(sim.pwm_output(2).unwrap().suspended);
        pwm.resume().unwrap();
        assert!(!pwm.is_suspended());
        pwm.close().unwrap();
        assert_eq!(sim.calls("pwm_close"), 1);
    }

    proptest::proptest! {
        #[test]
        fn duty_cycle_law(frequency in 1u32..=1_000_000, duty in 0.0f32..=1.0) {
            let sim = SimHal::new();
            let pwm = PwmOut::new(&sim, 0, frequency, duty).unwrap();
            let period = 1_000_000 / frequency;
            assert_eq!(pwm.period_us(), period);

            let exact = f64::from(period as f32 * duty);
            let diff = f64::from(pwm.pulse_us()) - exact;
            assert!((-0.5..=0.5).contains(&diff), "pulse {} for {}", pwm.pulse_us(), exact);
            assert_eq!(pwm.pulse_us(), round(period as f32 * duty));
        }
    }
}
