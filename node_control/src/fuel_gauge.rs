use crate::bsp::analog::AnalogInput;
use crate::map::to_percent;

/// A known point of the discharge curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Breakpoint {
    pub voltage: f32,
    pub percentage: f32,
}

const fn bp(voltage: f32, percentage: f32) -> Breakpoint {
    Breakpoint {
        voltage,
        percentage,
    }
}

/// Single cell LiPo discharge curve, from full to empty. Voltages must not increase.
pub static CALIBRATION_TABLE: [Breakpoint; 10] = [
    bp(4.20, 100.0),
    bp(4.10, 90.0),
    bp(4.00, 80.0),
    bp(3.90, 65.0),
    bp(3.80, 50.0),
    bp(3.70, 35.0),
    bp(3.60, 20.0),
    bp(3.50, 10.0),
    bp(3.40, 5.0),
    bp(3.30, 0.0),
];

/// Charge estimate for `voltage` on the default [CALIBRATION_TABLE].
pub fn voltage_to_percentage(voltage: f32) -> f32 {
    interpolate(&CALIBRATION_TABLE, voltage)
}

/// Piecewise-linear lookup, clamped to the first and the last breakpoint.
///
/// The table is walked from the high voltage end and the first bracketing pair wins.
/// An empty table reads as empty battery.
pub fn interpolate(table: &[Breakpoint], voltage: f32) -> f32 {
    let (first, last) = match (table.first(), table.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };
    if voltage >= first.voltage {
        return 100.0;
    }
    if voltage <= last.voltage {
        return 0.0;
    }
    for pair in table.windows(2) {
        let (hi, lo) = (pair[0], pair[1]);
        if lo.voltage <= voltage && voltage <= hi.voltage {
            let t = (voltage - hi.voltage) / (lo.voltage - hi.voltage);
            return hi.percentage + (lo.percentage - hi.percentage) * t;
        }
    }
    // only reachable with a table that is not monotonic
    0.0
}

/// Converts raw ADC counts into the battery voltage in front of the divider.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct GaugeConfig {
    pub reference_voltage: f32,
    pub divider_ratio: f32,
    pub full_scale: u16,
}

impl Default for GaugeConfig {
    /// 3.3 V reference, 10 bit ADC, battery halved by two equal resistors.
    fn default() -> Self {
        GaugeConfig {
            reference_voltage: 3.3,
            divider_ratio: 2.0,
            full_scale: 1023,
        }
    }
}

impl GaugeConfig {
    pub fn raw_to_voltage(&self, raw: u16) -> f32 {
        if self.full_scale == 0 {
            return 0.0;
        }
        raw as f32 / self.full_scale as f32 * self.reference_voltage * self.divider_ratio
    }
}

/// How the voltage translates into a charge level.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DischargeModel {
    /// Interpolate the measured voltage on [CALIBRATION_TABLE].
    Curve,
    /// Straight line between two raw readings, empty to full.
    Linear { min_raw: u16, max_raw: u16 },
}

/// Battery charge read through a voltage divider on an analog pin.
pub struct BatteryGauge<A: AnalogInput> {
    adc: A,
    config: GaugeConfig,
    model: DischargeModel,
}

impl<A: AnalogInput> BatteryGauge<A> {
    pub fn new(adc: A, config: GaugeConfig, model: DischargeModel) -> Self {
        BatteryGauge { adc, config, model }
    }

    pub fn raw(&mut self) -> u16 {
        self.adc.read_raw()
    }

    pub fn voltage(&mut self) -> f32 {
        let raw = self.raw();
        self.config.raw_to_voltage(raw)
    }

    /// Remaining charge, `0..=100`.
    pub fn level(&mut self) -> u8 {
        let raw = self.raw();
        let level = match self.model {
            DischargeModel::Curve => {
                let percentage = voltage_to_percentage(self.config.raw_to_voltage(raw));
                (percentage + 0.5) as u8
            }
            DischargeModel::Linear { min_raw, max_raw } => to_percent(raw, min_raw, max_raw),
        };
        trace!("battery raw: {} level: {}%", raw, level);
        level
    }

    pub fn release(self) -> A {
        self.adc
    }
}

#[cfg(test)]
mod test {
    use crate::bsp::analog::AnalogInput;
    use crate::fuel_gauge::{
        interpolate, voltage_to_percentage, BatteryGauge, Breakpoint, DischargeModel,
        GaugeConfig, CALIBRATION_TABLE,
    };

    struct FixedAdc(u16);

    impl AnalogInput for FixedAdc {
        fn read_raw(&mut self) -> u16 {
            self.0
        }
    }

    fn close(actual: f32, expected: f32) -> bool {
        (actual - expected).abs() < 1e-3
    }

    #[test]
    fn full_and_empty_are_clamped() {
        assert_eq!(voltage_to_percentage(4.25), 100.0);
        assert_eq!(voltage_to_percentage(4.20), 100.0);
        assert_eq!(voltage_to_percentage(3.30), 0.0);
        assert_eq!(voltage_to_percentage(3.00), 0.0);
        assert_eq!(voltage_to_percentage(-1.0), 0.0);
    }

    #[test]
    fn interpolates_between_breakpoints() {
        let actual = voltage_to_percentage(4.15);
        assert!(close(actual, 95.0), "4.15V gave {}", actual);
        let actual = voltage_to_percentage(3.75);
        assert!(close(actual, 42.5), "3.75V gave {}", actual);
    }

    #[test]
    fn breakpoints_are_hit_exactly() {
        for point in CALIBRATION_TABLE.iter() {
            assert_eq!(
                voltage_to_percentage(point.voltage),
                point.percentage,
                "at {}V",
                point.voltage
            );
        }
    }

    #[test]
    fn percentage_never_decreases_with_voltage() {
        let mut prev = 0.0;
        let mut mv = 3200;
        while mv <= 4300 {
            let p = voltage_to_percentage(mv as f32 / 1000.0);
            assert!(p >= prev, "{}mV: {} < {}", mv, p, prev);
            assert!((0.0..=100.0).contains(&p));
            prev = p;
            mv += 5;
        }
    }

    #[test]
    fn custom_table() {
        let table = [
            Breakpoint { voltage: 8.4, percentage: 100.0 },
            Breakpoint { voltage: 6.0, percentage: 0.0 },
        ];
        assert!(close(interpolate(&table, 7.2), 50.0));
        assert_eq!(interpolate(&[], 7.2), 0.0);
    }

    #[test]
    fn raw_reading_goes_through_divider() {
        let config = GaugeConfig::default();
        // 1023 counts is the reference voltage, doubled by the divider
        assert!(close(config.raw_to_voltage(1023), 6.6));
        assert!(close(config.raw_to_voltage(0), 0.0));
    }

    #[test]
    fn gauge_levels() {
        // 651 counts * 3.3 / 1023 * 2 = 4.2V
        let mut gauge = BatteryGauge::new(FixedAdc(651), GaugeConfig::default(), DischargeModel::Curve);
        assert_eq!(gauge.level(), 100);

        let mut gauge = BatteryGauge::new(
            FixedAdc(600),
            GaugeConfig::default(),
            DischargeModel::Linear {
                min_raw: 500,
                max_raw: 700,
            },
        );
        assert_eq!(gauge.raw(), 600);
        assert_eq!(gauge.level(), 50);
    }
}
