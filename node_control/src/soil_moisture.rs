use crate::bsp::analog::AnalogInput;
use crate::map::to_percent;

/// Resistive or capacitive soil probe on an analog pin.
///
/// `min_raw` is the reading in dry soil, `max_raw` in saturated soil. Capacitive probes
/// read lower when wet, so `min_raw > max_raw` is fine.
pub struct SoilMoistureSensor<A: AnalogInput> {
    adc: A,
    min_raw: u16,
    max_raw: u16,
}

impl<A: AnalogInput> SoilMoistureSensor<A> {
    pub fn new(adc: A, min_raw: u16, max_raw: u16) -> Self {
        SoilMoistureSensor {
            adc,
            min_raw,
            max_raw,
        }
    }

    pub fn raw(&mut self) -> u16 {
        self.adc.read_raw()
    }

    /// Soil humidity, `0..=100` %.
    pub fn humidity_level(&mut self) -> u8 {
        let raw = self.raw();
        to_percent(raw, self.min_raw, self.max_raw)
    }

    pub fn release(self) -> A {
        self.adc
    }
}
