//! Bosch BMP388 barometer, pressure and altitude.
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::Error;

/// SDO tied to ground.
pub const DEFAULT_ADDRESS: u8 = 0x76;
/// SDO tied to VDDIO.
pub const SECONDARY_ADDRESS: u8 = 0x77;
pub const CHIP_ID: u8 = 0x50;
/// Installation altitude assumed when none is configured.
pub const DEFAULT_ALTITUDE_M: u16 = 540;

const REG_CHIP_ID: u8 = 0x00;
const REG_ERR: u8 = 0x02;
const REG_DATA: u8 = 0x04;
const REG_PWR_CTRL: u8 = 0x1b;
const REG_OSR: u8 = 0x1c;
const REG_ODR: u8 = 0x1d;
const REG_CONFIG: u8 = 0x1f;
const REG_CALIB: u8 = 0x31;
const REG_CMD: u8 = 0x7e;

const CMD_SOFT_RESET: u8 = 0xb6;
const PWR_PRESS_TEMP_EN: u8 = 0b0000_0011;
const PWR_MODE_NORMAL: u8 = 0b0011_0000;
const ERR_CONF: u8 = 0b100;

const RETRY_DELAY_MS: u32 = 3000;
const SETTLE_DELAY_MS: u32 = 100;
const RESET_DELAY_MS: u32 = 10;

const STANDARD_SEA_LEVEL_PA: f64 = 101_325.0;
const BAROMETRIC_SCALE_M: f64 = 44_307.7;
const BAROMETRIC_EXPONENT: f64 = 5.255_302;

/// Oversampling, filter and output data rate presets, from fast and noisy to slow and
/// precise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SamplingMode {
    UltraLowPrecision,
    LowPrecision,
    NormalPrecision1,
    NormalPrecision2,
    HighPrecision,
    UltraPrecision,
}

/// Register values behind a [SamplingMode].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Pressure oversampling, 2^osr_p samples.
    pub osr_p: u8,
    /// Temperature oversampling, 2^osr_t samples.
    pub osr_t: u8,
    /// IIR filter coefficient code.
    pub iir: u8,
    /// Output data rate, 200 Hz / 2^odr.
    pub odr: u8,
}

impl SamplingMode {
    pub fn settings(&self) -> Settings {
        let (osr_p, osr_t, iir, odr) = match self {
            SamplingMode::UltraLowPrecision => (0, 0, 0, 0),
            SamplingMode::LowPrecision => (1, 0, 0, 1),
            SamplingMode::NormalPrecision1 => (2, 0, 2, 2),
            SamplingMode::NormalPrecision2 => (3, 0, 2, 3),
            SamplingMode::HighPrecision => (4, 1, 2, 4),
            SamplingMode::UltraPrecision => (5, 1, 2, 5),
        };
        Settings {
            osr_p,
            osr_t,
            iir,
            odr,
        }
    }
}

impl Settings {
    /// Time between two results in normal mode.
    pub fn sampling_period_us(&self) -> u32 {
        5000 << self.odr
    }

    /// Conversion time of one pressure and temperature measurement, datasheet formula.
    pub fn measurement_time_us(&self) -> u32 {
        234 + (392 + (1 << self.osr_p) * 2020) + (163 + (1 << self.osr_t) * 2020)
    }
}

/// Trimming coefficients as stored in the non-volatile memory, already scaled to floats.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Calibration {
    t1: f64,
    t2: f64,
    t3: f64,
    p1: f64,
    p2: f64,
    p3: f64,
    p4: f64,
    p5: f64,
    p6: f64,
    p7: f64,
    p8: f64,
    p9: f64,
    p10: f64,
    p11: f64,
}

fn pow2(exp: i32) -> f64 {
    libm::ldexp(1.0, exp)
}

impl Calibration {
    pub fn from_bytes(b: &[u8; 21]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([b[i], b[i + 1]]) as f64;
        let i16_at = |i: usize| i16::from_le_bytes([b[i], b[i + 1]]) as f64;
        let i8_at = |i: usize| b[i] as i8 as f64;
        Calibration {
            t1: u16_at(0) * pow2(8),
            t2: u16_at(2) / pow2(30),
            t3: i8_at(4) / pow2(48),
            p1: (i16_at(5) - pow2(14)) / pow2(20),
            p2: (i16_at(7) - pow2(14)) / pow2(29),
            p3: i8_at(9) / pow2(32),
            p4: i8_at(10) / pow2(37),
            p5: u16_at(11) * pow2(3),
            p6: u16_at(13) / pow2(6),
            p7: i8_at(15) / pow2(8),
            p8: i8_at(16) / pow2(15),
            p9: i16_at(17) / pow2(48),
            p10: i8_at(19) / pow2(48),
            p11: i8_at(20) / pow2(65),
        }
    }

    /// Linearized temperature, °C.
    pub fn temperature(&self, uncompensated: u32) -> f64 {
        let d1 = uncompensated as f64 - self.t1;
        let d2 = d1 * self.t2;
        d2 + d1 * d1 * self.t3
    }

    /// Pressure in Pa, needs the linearized temperature.
    pub fn pressure(&self, uncompensated: u32, t_lin: f64) -> f64 {
        let up = uncompensated as f64;
        let t2 = t_lin * t_lin;
        let t3 = t2 * t_lin;

        let out1 = self.p5 + self.p6 * t_lin + self.p7 * t2 + self.p8 * t3;
        let out2 = up * (self.p1 + self.p2 * t_lin + self.p3 * t2 + self.p4 * t3);
        let out3 = up * up * (self.p9 + self.p10 * t_lin) + up * up * up * self.p11;
        out1 + out2 + out3
    }
}

pub struct Bmp388Sensor<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    altitude_base_m: u16,
    mode: SamplingMode,
    calibration: Option<Calibration>,
    sea_level_pa: f64,
}

impl<I2C: I2c, D: DelayNs> Bmp388Sensor<I2C, D> {
    pub fn new(i2c: I2C, delay: D, address: u8, altitude_base_m: u16) -> Self {
        Bmp388Sensor {
            i2c,
            delay,
            address,
            altitude_base_m,
            mode: SamplingMode::UltraPrecision,
            calibration: None,
            sea_level_pa: STANDARD_SEA_LEVEL_PA,
        }
    }

    /// Altitude [Bmp388Sensor::begin] calibrates to.
    pub fn set_altitude_base(&mut self, altitude_m: u16) {
        self.altitude_base_m = altitude_m;
    }

    pub fn altitude_base(&self) -> u16 {
        self.altitude_base_m
    }

    /// Brings the sensor up in [SamplingMode::UltraPrecision] and calibrates the altitude.
    ///
    /// The chip id is polled every 3 s, up to `attempts` times.
    pub fn begin(&mut self, attempts: u8) -> Result<(), Error<I2C::Error>> {
        self.wait_for_chip(attempts)?;
        info!("BMP388 found at 0x{:02x}", self.address);

        self.write_register(REG_CMD, CMD_SOFT_RESET)?;
        self.delay.delay_ms(RESET_DELAY_MS);
        self.calibration = Some(self.read_calibration()?);

        self.set_sampling_mode(SamplingMode::UltraPrecision)?;
        self.delay.delay_ms(SETTLE_DELAY_MS);

        self.calibrate_altitude(self.altitude_base_m)?;
        info!("BMP388 altitude calibrated to {} m", self.altitude_base_m);
        Ok(())
    }

    fn wait_for_chip(&mut self, attempts: u8) -> Result<(), Error<I2C::Error>> {
        let mut last = Error::Timeout;
        for attempt in 0..attempts {
            if attempt > 0 {
                self.delay.delay_ms(RETRY_DELAY_MS);
            }
            match self.read_register(REG_CHIP_ID) {
                Ok(CHIP_ID) => return Ok(()),
                Ok(id) => {
                    warn!("wrong BMP388 chip id 0x{:02x}", id);
                    last = Error::UnexpectedChipId(id);
                }
                Err(e) => {
                    warn!("BMP388 bus error, retrying");
                    last = e;
                }
            }
        }
        Err(last)
    }

    pub fn set_sampling_mode(&mut self, mode: SamplingMode) -> Result<(), Error<I2C::Error>> {
        let settings = mode.settings();
        // configuration is only taken over in sleep mode
        self.write_register(REG_PWR_CTRL, PWR_PRESS_TEMP_EN)?;
        self.write_register(REG_OSR, settings.osr_t << 3 | settings.osr_p)?;
        self.write_register(REG_ODR, settings.odr)?;
        self.write_register(REG_CONFIG, settings.iir << 1)?;
        self.write_register(REG_PWR_CTRL, PWR_PRESS_TEMP_EN | PWR_MODE_NORMAL)?;
        if self.read_register(REG_ERR)? & ERR_CONF != 0 {
            error!("BMP388 rejected the sampling configuration");
            return Err(Error::InvalidArgument);
        }
        self.mode = mode;
        Ok(())
    }

    pub fn sampling_mode(&self) -> SamplingMode {
        self.mode
    }

    /// Pressure, Pa.
    pub fn pressure(&mut self) -> Result<f32, Error<I2C::Error>> {
        self.measure().map(|(_, p)| p as f32)
    }

    /// Die temperature, °C.
    pub fn temperature(&mut self) -> Result<f32, Error<I2C::Error>> {
        self.measure().map(|(t, _)| t as f32)
    }

    /// Takes the current pressure as the one at `altitude_m` and derives the sea level
    /// reference from it.
    pub fn calibrate_altitude(&mut self, altitude_m: u16) -> Result<(), Error<I2C::Error>> {
        let (_, pressure) = self.measure()?;
        let ratio = 1.0 - altitude_m as f64 / BAROMETRIC_SCALE_M;
        self.sea_level_pa = pressure / libm::pow(ratio, BAROMETRIC_EXPONENT);
        debug!("sea level pressure {} Pa", self.sea_level_pa as f32);
        Ok(())
    }

    /// Altitude above sea level, m.
    pub fn altitude(&mut self) -> Result<f32, Error<I2C::Error>> {
        let (_, pressure) = self.measure()?;
        let ratio = pressure / self.sea_level_pa;
        Ok((BAROMETRIC_SCALE_M * (1.0 - libm::pow(ratio, 1.0 / BAROMETRIC_EXPONENT))) as f32)
    }

    pub fn sampling_period_us(&self) -> u32 {
        self.mode.settings().sampling_period_us()
    }

    pub fn sampling_frequency_hz(&self) -> f32 {
        1_000_000.0 / self.sampling_period_us() as f32
    }

    pub fn measurement_time_us(&self) -> u32 {
        self.mode.settings().measurement_time_us()
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    /// `(temperature °C, pressure Pa)`
    fn measure(&mut self) -> Result<(f64, f64), Error<I2C::Error>> {
        let calibration = match self.calibration {
            Some(calibration) => calibration,
            None => {
                let calibration = self.read_calibration()?;
                self.calibration = Some(calibration);
                calibration
            }
        };
        let mut data = [0u8; 6];
        self.i2c
            .write_read(self.address, &[REG_DATA], &mut data)
            .map_err(Error::Bus)?;
        let uncompensated_p = u32::from_le_bytes([data[0], data[1], data[2], 0]);
        let uncompensated_t = u32::from_le_bytes([data[3], data[4], data[5], 0]);
        let t_lin = calibration.temperature(uncompensated_t);
        Ok((t_lin, calibration.pressure(uncompensated_p, t_lin)))
    }

    fn read_calibration(&mut self) -> Result<Calibration, Error<I2C::Error>> {
        let mut raw = [0u8; 21];
        self.i2c
            .write_read(self.address, &[REG_CALIB], &mut raw)
            .map_err(Error::Bus)?;
        Ok(Calibration::from_bytes(&raw))
    }

    fn read_register(&mut self, register: u8) -> Result<u8, Error<I2C::Error>> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut value)
            .map_err(Error::Bus)?;
        Ok(value[0])
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(Error::Bus)
    }
}
