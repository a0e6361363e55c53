//! Uplink frame of one measurement cycle.
//!
//! | offset | size | content                          | missing  |
//! |--------|------|----------------------------------|----------|
//! | 0      | 1    | frame version, [VERSION]         |          |
//! | 1      | 2    | pressure, Pa / 10                | `0xFFFF` |
//! | 3      | 2    | air temperature, 0.01 °C, signed | `-12700` |
//! | 5      | 2    | air humidity, 0.1 %              | `0xFFFF` |
//! | 7      | 2    | CO2, ppm                         | `0xFFFF` |
//! | 9      | 2    | illuminance, lx                  | `0xFFFF` |
//! | 11     | 1    | soil moisture, %                 | `0xFF`   |
//! | 12     | 2    | soil temperature, 0.01 °C        | `-12700` |
//! | 14     | 1    | battery, %                       | `0xFF`   |
//!
//! All multi-byte fields are big-endian.
use core::fmt;

pub const VERSION: u8 = 0x01;
pub const FRAME_LEN: usize = 15;

const MISSING_U16: u16 = 0xFFFF;
const MISSING_U8: u8 = 0xFF;
const MISSING_TEMPERATURE: i16 = -12700;

/// Values collected during one cycle, `None` when the sensor failed.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Measurements {
    pub pressure_pa: Option<f32>,
    pub air_temperature_c: Option<f32>,
    pub air_humidity: Option<f32>,
    pub co2_ppm: Option<f32>,
    pub light_lux: Option<f32>,
    pub soil_moisture: Option<u8>,
    pub soil_temperature_c: Option<f32>,
    pub battery: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadError {
    Length(usize),
    Version(u8),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Length(len) => write!(f, "frame of {} bytes, expected {}", len, FRAME_LEN),
            PayloadError::Version(v) => write!(f, "unknown frame version {}", v),
        }
    }
}

fn scaled_u16(value: Option<f32>, scale: f32, max: f32) -> u16 {
    match value {
        Some(v) if !v.is_nan() => libm::roundf(v * scale).clamp(0.0, max) as u16,
        _ => MISSING_U16,
    }
}

fn centi_degrees(value: Option<f32>) -> i16 {
    match value {
        Some(v) if !v.is_nan() => {
            libm::roundf(v * 100.0).clamp(MISSING_TEMPERATURE as f32 + 1.0, i16::MAX as f32) as i16
        }
        _ => MISSING_TEMPERATURE,
    }
}

fn percent(value: Option<u8>) -> u8 {
    value.map(|v| v.min(100)).unwrap_or(MISSING_U8)
}

fn present_u16(raw: u16) -> Option<f32> {
    (raw != MISSING_U16).then(|| raw as f32)
}

fn from_centi_degrees(raw: i16) -> Option<f32> {
    (raw != MISSING_TEMPERATURE).then(|| raw as f32 / 100.0)
}

impl Measurements {
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = VERSION;
        frame[1..3].copy_from_slice(&scaled_u16(self.pressure_pa, 0.1, 65534.0).to_be_bytes());
        frame[3..5].copy_from_slice(&centi_degrees(self.air_temperature_c).to_be_bytes());
        frame[5..7].copy_from_slice(&scaled_u16(self.air_humidity, 10.0, 1000.0).to_be_bytes());
        frame[7..9].copy_from_slice(&scaled_u16(self.co2_ppm, 1.0, 65534.0).to_be_bytes());
        frame[9..11].copy_from_slice(&scaled_u16(self.light_lux, 1.0, 65534.0).to_be_bytes());
        frame[11] = percent(self.soil_moisture);
        frame[12..14].copy_from_slice(&centi_degrees(self.soil_temperature_c).to_be_bytes());
        frame[14] = percent(self.battery);
        frame
    }

    pub fn decode(frame: &[u8]) -> Result<Self, PayloadError> {
        if frame.len() != FRAME_LEN {
            return Err(PayloadError::Length(frame.len()));
        }
        if frame[0] != VERSION {
            return Err(PayloadError::Version(frame[0]));
        }
        let u16_at = |i: usize| u16::from_be_bytes([frame[i], frame[i + 1]]);
        let i16_at = |i: usize| i16::from_be_bytes([frame[i], frame[i + 1]]);
        let u8_at = |i: usize| (frame[i] != MISSING_U8).then(|| frame[i]);
        Ok(Measurements {
            pressure_pa: present_u16(u16_at(1)).map(|p| p * 10.0),
            air_temperature_c: from_centi_degrees(i16_at(3)),
            air_humidity: present_u16(u16_at(5)).map(|h| h / 10.0),
            co2_ppm: present_u16(u16_at(7)),
            light_lux: present_u16(u16_at(9)),
            soil_moisture: u8_at(11),
            soil_temperature_c: from_centi_degrees(i16_at(12)),
            battery: u8_at(14),
        })
    }

    /// Number of sensors that delivered a value.
    pub fn present(&self) -> usize {
        [
            self.pressure_pa.is_some(),
            self.air_temperature_c.is_some(),
            self.air_humidity.is_some(),
            self.co2_ppm.is_some(),
            self.light_lux.is_some(),
            self.soil_moisture.is_some(),
            self.soil_temperature_c.is_some(),
            self.battery.is_some(),
        ]
        .iter()
        .filter(|it| **it)
        .count()
    }
}

#[cfg(test)]
mod test {
    use crate::payload::{Measurements, PayloadError, FRAME_LEN};

    fn sample() -> Measurements {
        Measurements {
            pressure_pa: Some(95_420.4),
            air_temperature_c: Some(21.456),
            air_humidity: Some(48.26),
            co2_ppm: Some(612.6),
            light_lux: Some(350.0),
            soil_moisture: Some(37),
            soil_temperature_c: Some(-3.5),
            battery: Some(88),
        }
    }

    #[test]
    fn frame_layout() {
        assert_eq!(
            sample().encode(),
            [
                0x01, // version
                0x25, 0x46, // 9542 * 10 Pa
                0x08, 0x62, // 21.46 °C
                0x01, 0xe3, // 48.3 %
                0x02, 0x65, // 613 ppm
                0x01, 0x5e, // 350 lx
                37,   // soil moisture
                0xfe, 0xa2, // -3.50 °C
                88,   // battery
            ]
        );
    }

    #[test]
    fn missing_values_use_sentinels() {
        let frame = Measurements::default().encode();
        assert_eq!(
            frame,
            [0x01, 0xff, 0xff, 0xce, 0x64, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xce, 0x64, 0xff]
        );
        assert_eq!(Measurements::decode(&frame), Ok(Measurements::default()));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let frame = Measurements {
            air_humidity: Some(140.0),
            light_lux: Some(120_000.0),
            co2_ppm: Some(-5.0),
            soil_temperature_c: Some(-300.0),
            battery: Some(130),
            ..Default::default()
        }
        .encode();
        let decoded = Measurements::decode(&frame).unwrap();
        assert_eq!(decoded.air_humidity, Some(100.0));
        assert_eq!(decoded.light_lux, Some(65534.0));
        assert_eq!(decoded.co2_ppm, Some(0.0));
        assert_eq!(decoded.soil_temperature_c, Some(-126.99));
        assert_eq!(decoded.battery, Some(100));
    }

    #[test]
    fn decodes_what_was_sent() {
        let decoded = Measurements::decode(&sample().encode()).unwrap();
        assert_eq!(decoded.pressure_pa, Some(95_420.0));
        assert_eq!(decoded.air_temperature_c, Some(21.46));
        assert_eq!(decoded.soil_temperature_c, Some(-3.5));
        assert_eq!(decoded.present(), 8);
    }

    #[test]
    fn rejects_foreign_frames() {
        assert_eq!(Measurements::decode(&[1, 2, 3]), Err(PayloadError::Length(3)));
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = 7;
        assert_eq!(Measurements::decode(&frame), Err(PayloadError::Version(7)));
    }
}
