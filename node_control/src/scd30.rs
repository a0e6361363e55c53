//! Sensirion SCD30 NDIR CO2 sensor.
//!
//! Commands and data words are big endian, every data word is followed by a CRC-8, see
//! the SCD30 interface description.
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::crc;
use crate::error::Error;

pub const DEFAULT_ADDRESS: u8 = 0x61;

/// Boot time after a soft reset.
pub const INIT_DELAY_MS: u32 = 2000;
/// Measurement interval after power on, seconds.
pub const DEFAULT_INTERVAL_S: u16 = 2;
/// Pause between a read command and fetching its answer.
const COMMAND_DELAY_MS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    /// Argument: ambient pressure in mbar, 0 disables pressure compensation.
    StartPeriodicMeasurement = 0x0010,
    StopPeriodicMeasurement = 0x0104,
    /// Argument: seconds between measurements, 2..=1800.
    SetMeasurementInterval = 0x4600,
    GetDataReady = 0x0202,
    ReadMeasurement = 0x0300,
    ReadFirmwareVersion = 0xd100,
    SoftReset = 0xd304,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    /// ppm
    pub co2: f32,
    /// °C
    pub temperature: f32,
    /// Relative humidity, %.
    pub humidity: f32,
}

pub struct Co2Sensor<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    interval_s: u16,
    firmware: Option<(u8, u8)>,
}

impl<I2C: I2c, D: DelayNs> Co2Sensor<I2C, D> {
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Co2Sensor {
            i2c,
            delay,
            address,
            interval_s: DEFAULT_INTERVAL_S,
            firmware: None,
        }
    }

    /// Measurement interval programmed by [Co2Sensor::init] and [Co2Sensor::restart].
    pub fn set_interval(&mut self, interval_s: u16) {
        self.interval_s = interval_s;
    }

    pub fn interval(&self) -> u16 {
        self.interval_s
    }

    /// Resets the sensor and starts periodic measurements.
    pub fn init(&mut self) -> Result<(), Error<I2C::Error>> {
        info!("initializing SCD30 at 0x{:02x}", self.address);
        self.soft_reset()?;

        match self.firmware_version() {
            Ok((major, minor)) => info!("SCD30 firmware version: {}.{}", major, minor),
            Err(e) => error!("cannot read SCD30 firmware version: {}", e.kind()),
        }

        self.start_periodic_measurement(0)?;
        self.set_measurement_interval(self.interval_s)?;
        info!("SCD30 ready, waiting for the first measurement");
        Ok(())
    }

    /// Restarts a sensor which stopped answering.
    pub fn restart(&mut self) -> Result<(), Error<I2C::Error>> {
        warn!("restarting SCD30");
        self.soft_reset()?;
        self.start_periodic_measurement(0)?;
        self.set_measurement_interval(self.interval_s)
    }

    pub fn soft_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.write_command(Command::SoftReset)?;
        self.delay.delay_ms(INIT_DELAY_MS);
        Ok(())
    }

    /// `(major, minor)`, also remembered for [Co2Sensor::cached_firmware].
    pub fn firmware_version(&mut self) -> Result<(u8, u8), Error<I2C::Error>> {
        let mut word = [0u16; 1];
        self.read_words(Command::ReadFirmwareVersion, &mut word)?;
        let [major, minor] = word[0].to_be_bytes();
        self.firmware = Some((major, minor));
        Ok((major, minor))
    }

    pub fn cached_firmware(&self) -> Option<(u8, u8)> {
        self.firmware
    }

    /// `pressure_mbar` of 0 disables pressure compensation.
    pub fn start_periodic_measurement(&mut self, pressure_mbar: u16) -> Result<(), Error<I2C::Error>> {
        if pressure_mbar != 0 && !(700..=1400).contains(&pressure_mbar) {
            return Err(Error::InvalidArgument);
        }
        self.write_command_arg(Command::StartPeriodicMeasurement, pressure_mbar)
    }

    pub fn stop_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.write_command(Command::StopPeriodicMeasurement)
    }

    pub fn set_measurement_interval(&mut self, seconds: u16) -> Result<(), Error<I2C::Error>> {
        if !(2..=1800).contains(&seconds) {
            return Err(Error::InvalidArgument);
        }
        self.write_command_arg(Command::SetMeasurementInterval, seconds)
    }

    pub fn data_ready(&mut self) -> Result<bool, Error<I2C::Error>> {
        let mut word = [0u16; 1];
        self.read_words(Command::GetDataReady, &mut word)?;
        Ok(word[0] == 1)
    }

    /// Reads the buffered measurement, `NotReady` if there is none yet.
    pub fn measurement(&mut self) -> Result<Measurement, Error<I2C::Error>> {
        if !self.data_ready()? {
            debug!("no SCD30 data yet");
            return Err(Error::NotReady);
        }
        let mut words = [0u16; 6];
        self.read_words(Command::ReadMeasurement, &mut words)?;
        let float = |hi: u16, lo: u16| f32::from_bits((hi as u32) << 16 | lo as u32);
        Ok(Measurement {
            co2: float(words[0], words[1]),
            temperature: float(words[2], words[3]),
            humidity: float(words[4], words[5]),
        })
    }

    /// CO2 concentration, ppm.
    pub fn co2(&mut self) -> Result<f32, Error<I2C::Error>> {
        self.measurement().map(|it| it.co2)
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn write_command(&mut self, command: Command) -> Result<(), Error<I2C::Error>> {
        let bytes = (command as u16).to_be_bytes();
        self.i2c.write(self.address, &bytes).map_err(Error::Bus)
    }

    fn write_command_arg(&mut self, command: Command, arg: u16) -> Result<(), Error<I2C::Error>> {
        let [c0, c1] = (command as u16).to_be_bytes();
        let [a0, a1] = arg.to_be_bytes();
        let frame = [c0, c1, a0, a1, crc::sensirion(&[a0, a1])];
        self.i2c.write(self.address, &frame).map_err(Error::Bus)
    }

    fn read_words(&mut self, command: Command, words: &mut [u16]) -> Result<(), Error<I2C::Error>> {
        let mut buf = [0u8; 18];
        let buf = &mut buf[..words.len() * 3];
        self.write_command(command)?;
        self.delay.delay_ms(COMMAND_DELAY_MS);
        self.i2c.read(self.address, buf).map_err(Error::Bus)?;
        for (word, chunk) in words.iter_mut().zip(buf.chunks(3)) {
            if crc::sensirion(&chunk[..2]) != chunk[2] {
                return Err(Error::Crc);
            }
            *word = u16::from_be_bytes([chunk[0], chunk[1]]);
        }
        Ok(())
    }
}
