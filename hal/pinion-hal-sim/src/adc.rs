//! Simulated ADC channels

use std::collections::HashMap;

use pinion_hal::adc::{AdcHal, AdcInfo};

use crate::{enter, Peripheral, SimHal, SimHandle};

pub(crate) struct AdcBank {
    info: AdcInfo,
    channels: HashMap<SimHandle, u8>,
    samples: HashMap<u8, u32>,
}

impl Default for AdcBank {
    fn default() -> Self {
        Self {
            info: AdcInfo {
                resolution_bits: 12,
                ref_voltage: 3.3,
            },
            channels: HashMap::new(),
            samples: HashMap::new(),
        }
    }
}

impl AdcBank {
    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }
}

impl AdcHal for SimHal {
    fn adc_device_count(&self) -> u32 {
        self.lock().device_count(Peripheral::Adc)
    }

    fn adc_open(&self, id: u8) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "adc_open", None);
        if !s.has_device(Peripheral::Adc, id) || s.adc.channels.values().any(|&c| c == id) {
            return None;
        }
        let handle = s.alloc();
        s.adc.channels.insert(handle, id);
        Some(handle)
    }

    fn adc_close(&self, adc: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "adc_close");
        match s.adc.channels.remove(&adc) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn adc_read(&self, adc: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "adc_read");
        let Some(&id) = s.adc.channels.get(&adc) else {
            return s.bad_handle();
        };
        let max = s.adc.info.max_raw_value();
        let raw = s.adc.samples.get(&id).copied().unwrap_or(0).min(max);
        i32::try_from(raw).unwrap_or(i32::MAX)
    }

    fn adc_info(&self, adc: SimHandle, info: &mut AdcInfo) -> i32 {
        let mut s = self.lock();
        enter!(s, "adc_info");
        if !s.adc.channels.contains_key(&adc) {
            return s.bad_handle();
        }
        *info = s.adc.info;
        0
    }
}

impl SimHal {
    /// Set the sample channel `id` will return
    pub fn adc_set_raw(&self, id: u8, raw: u32) {
        self.lock().adc.samples.insert(id, raw);
    }

    /// Set the resolution and reference voltage reported by every channel
    pub fn set_adc_info(&self, info: AdcInfo) {
        self.lock().adc.info = info;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_clamped_to_resolution() {
        let sim = SimHal::new();
        sim.set_adc_info(AdcInfo {
            resolution_bits: 10,
            ref_voltage: 1.8,
        });
        let ch = sim.adc_open(1).unwrap();
        sim.adc_set_raw(1, 5000);
        assert_eq!(sim.adc_read(ch), 1023);

        let mut info = AdcInfo::default();
        assert_eq!(sim.adc_info(ch, &mut info), 0);
        assert_eq!(info.resolution_bits, 10);
    }
}
