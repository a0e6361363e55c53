//! I2C ambient light sensor (DFRobot Gravity, BH1750 compatible read-out).
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::Error;

pub const DEFAULT_ADDRESS: u8 = 0x23;

const REG_LUX: u8 = 0x10;
/// Time the sensor needs between selecting the register and answering.
const READ_DELAY_MS: u32 = 20;

pub struct LightSensor<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C: I2c, D: DelayNs> LightSensor<I2C, D> {
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        LightSensor {
            i2c,
            delay,
            address,
        }
    }

    /// Probes the sensor by selecting the measurement register.
    pub fn init(&mut self) -> Result<(), Error<I2C::Error>> {
        self.i2c
            .write(self.address, &[REG_LUX])
            .map_err(Error::Bus)?;
        debug!("light sensor answered at 0x{:02x}", self.address);
        Ok(())
    }

    /// Illuminance, lx.
    pub fn lux(&mut self) -> Result<f32, Error<I2C::Error>> {
        let mut buf = [0u8; 2];
        self.i2c
            .write(self.address, &[REG_LUX])
            .map_err(Error::Bus)?;
        self.delay.delay_ms(READ_DELAY_MS);
        self.i2c.read(self.address, &mut buf).map_err(Error::Bus)?;
        Ok(u16::from_be_bytes(buf) as f32 / 1.2)
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}
