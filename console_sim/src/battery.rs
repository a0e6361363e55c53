use node_control::fuel_gauge::{voltage_to_percentage, GaugeConfig};

/// ## LiPo cell drained by a constant average current
///
/// The terminal voltage follows the same discharge curve the node's fuel gauge uses, so
/// the reported level tracks the simulated charge.
///
/// ### Assumptions
/// Ignoring temperature and load dependency of the curve
/// Ignoring self discharge
pub struct Battery {
    capacity_mah: f32,
    charge_mah: f32,
    current_ma: f32,
}

impl Battery {
    pub fn new(capacity_mah: f32, charge_percent: f32, current_ma: f32) -> Self {
        let capacity_mah = capacity_mah.max(1.0);
        Battery {
            capacity_mah,
            charge_mah: capacity_mah * charge_percent.clamp(0.0, 100.0) / 100.0,
            current_ma,
        }
    }

    pub fn drain(&mut self, elapsed_ms: u64) {
        let hours = elapsed_ms as f32 / 3_600_000.0;
        self.charge_mah = (self.charge_mah - self.current_ma * hours).max(0.0);
    }

    pub fn charge_percent(&self) -> f32 {
        self.charge_mah / self.capacity_mah * 100.0
    }

    pub fn voltage(&self) -> f32 {
        voltage_for_charge(self.charge_percent())
    }

    /// What the ADC sees behind the node's voltage divider.
    pub fn adc_raw(&self, gauge: &GaugeConfig) -> u16 {
        let at_pin = self.voltage() / gauge.divider_ratio;
        let raw = (at_pin / gauge.reference_voltage * gauge.full_scale as f32).round();
        raw.clamp(0.0, gauge.full_scale as f32) as u16
    }
}

/// Lowest voltage (10 mV steps) at which the discharge curve reports `percent`.
pub fn voltage_for_charge(percent: f32) -> f32 {
    (330..=420)
        .map(|centivolts| centivolts as f32 / 100.0)
        .find(|voltage| voltage_to_percentage(*voltage) >= percent)
        .unwrap_or(4.2)
}
