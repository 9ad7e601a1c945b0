//! Analog input

use pinion_hal::adc::AdcInfo;
use pinion_hal::AdcHal;

use crate::error::{check, Error, Invalid, Peripheral, Result};
use crate::handle::{open_device, Owned};

/// ADC channel
///
/// Resolution and reference voltage are read once at construction; all
/// scaled readings use them.
pub struct AnalogIn<H: AdcHal> {
    handle: Owned<H>,
    id: u8,
    info: AdcInfo,
    max_raw: u32,
}

impl<H: AdcHal> AnalogIn<H> {
    pub fn new(hal: &H, id: u8) -> Result<Self> {
        let handle = open_device(
            hal,
            Peripheral::Adc,
            id,
            hal.adc_device_count(),
            |hal| hal.adc_open(id),
            H::adc_close,
        )?;
        let mut info = AdcInfo::default();
        check(hal.adc_info(handle.raw(), &mut info))?;
        if info.resolution_bits == 0 {
            warn!("ADC {} reports zero resolution", id);
            return Err(Error::InvalidArgument(Invalid::Resolution));
        }
        Ok(Self {
            handle,
            id,
            info,
            max_raw: info.max_raw_value(),
        })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn resolution_bits(&self) -> u8 {
        self.info.resolution_bits
    }

    pub fn ref_voltage(&self) -> f32 {
        self.info.ref_voltage
    }

    /// Largest raw sample, `(1 << resolution_bits) - 1`
    pub fn max_raw_value(&self) -> u32 {
        self.max_raw
    }

    pub fn read_raw(&self) -> Result<u32> {
        check(self.handle.hal().adc_read(self.handle.raw()))
    }

    /// Sample as a fraction of full scale
    pub fn read_percentage(&self) -> Result<f32> {
        Ok(self.read_raw()? as f32 / self.max_raw as f32)
    }

    /// Sample in volts
    pub fn read_voltage(&self) -> Result<f32> {
        Ok(self.info.ref_voltage * self.read_raw()? as f32 / self.max_raw as f32)
    }

    pub fn close(self) -> Result<()> {
        self.handle.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinion_hal::Errno;
    use pinion_hal_sim::SimHal;

    #[test]
    fn test_percentage() {
        let sim = SimHal::new();
        let adc = AnalogIn::new(&sim, 0).unwrap();
        assert_eq!(adc.max_raw_value(), 4095);
        sim.adc_set_raw(0, 4095);
        assert_eq!(adc.read_percentage().unwrap(), 1.0);
        sim.adc_set_raw(0, 0);
        assert_eq!(adc.read_percentage().unwrap(), 0.0);
    }

    #[test]
    fn test_zero_resolution_rejected_and_closed() {
        let sim = SimHal::new();
        sim.set_adc_info(AdcInfo {
            resolution_bits: 0,
            ref_voltage: 3.3,
        });
        assert_eq!(
            AnalogIn::new(&sim, 1).err(),
            Some(Error::InvalidArgument(Invalid::Resolution))
        );
        assert_eq!(sim.calls("adc_close"), 1);
    }

    #[test]
    fn test_info_failure_closes_handle() {
        let sim = SimHal::new();
        sim.fail_next("adc_info", Errno::EIO);
        assert_eq!(AnalogIn::new(&sim, 0).err(), Some(Error::Hal(Errno::EIO)));
        assert_eq!(sim.open_handles(), 0);
    }

    proptest::proptest! {
        #[test]
        fn voltage_scales_with_raw(bits in 1u8..=16, frac in 0.0f64..=1.0, vref in 0.5f32..5.0) {
            let sim = SimHal::new();
            sim.set_adc_info(AdcInfo { resolution_bits: bits, ref_voltage: vref });
            let adc = AnalogIn::new(&sim, 0).unwrap();
            let max = (1u32 << bits) - 1;
            assert_eq!(adc.max_raw_value(), max);

            let raw = (frac * f64::from(max)) as u32;
            sim.adc_set_raw(0, raw);
            assert_eq!(adc.read_voltage().unwrap(), vref * raw as f32 / max as f32);
        }
    }
}
