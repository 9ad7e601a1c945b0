//! ADC boundary

use crate::Hal;

/// Static capability information of an ADC channel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcInfo {
    /// Sample resolution in bits
    pub resolution_bits: u8,
    /// Reference voltage in volts
    pub ref_voltage: f32,
}

impl AdcInfo {
    /// Largest raw sample: `(1 << resolution_bits) - 1`
    pub fn max_raw_value(&self) -> u32 {
        match 1u32.checked_shl(u32::from(self.resolution_bits)) {
            Some(v) => v - 1,
            None => u32::MAX,
        }
    }
}

/// Native ADC calls
pub trait AdcHal: Hal {
    /// Number of ADC ids
    fn adc_device_count(&self) -> u32;

    /// Open an ADC channel
    fn adc_open(&self, id: u8) -> Option<Self::Handle>;

    /// Close an ADC channel
    fn adc_close(&self, adc: Self::Handle) -> i32;

    /// Take one sample: the raw value, or `-errno`
    fn adc_read(&self, adc: Self::Handle) -> i32;

    /// Query resolution and reference voltage
    fn adc_info(&self, adc: Self::Handle, info: &mut AdcInfo) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_raw_value() {
        let info = AdcInfo {
            resolution_bits: 12,
            ref_voltage: 3.3,
        };
        assert_eq!(info.max_raw_value(), 4095);

        let info = AdcInfo {
            resolution_bits: 16,
            ref_voltage: 3.3,
        };
        assert_eq!(info.max_raw_value(), 65535);
    }
}
