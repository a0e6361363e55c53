//! DS18B20 one-wire thermometer buried in the soil.
use crate::bsp::one_wire::ThermometerBus;
use crate::crc;
use crate::error::Error;

/// Temperature at power-on, before any conversion ran.
pub const POWER_ON_RESET_C: f32 = 85.0;

/// Conversion resolution, bits 5..6 of the configuration register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    Bits9,
    Bits10,
    Bits11,
    Bits12,
}

impl Resolution {
    fn from_config(config: u8) -> Self {
        match (config >> 5) & 0x03 {
            0 => Resolution::Bits9,
            1 => Resolution::Bits10,
            2 => Resolution::Bits11,
            _ => Resolution::Bits12,
        }
    }

    /// Low bits of the raw reading that are undefined at this resolution.
    fn undefined_bits(&self) -> i16 {
        match self {
            Resolution::Bits9 => 0b111,
            Resolution::Bits10 => 0b11,
            Resolution::Bits11 => 0b1,
            Resolution::Bits12 => 0,
        }
    }
}

/// Decoded scratchpad.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scratchpad {
    pub temperature: f32,
    pub resolution: Resolution,
}

/// Checks and decodes the 9 scratchpad bytes as read from the device.
pub fn decode_scratchpad<E>(bytes: &[u8; 9]) -> Result<Scratchpad, Error<E>> {
    if bytes.iter().all(|b| *b == 0xff) {
        // nobody pulled the line low
        return Err(Error::Disconnected);
    }
    if crc::maxim(&bytes[..8]) != bytes[8] {
        return Err(Error::Crc);
    }
    let resolution = Resolution::from_config(bytes[4]);
    let raw = i16::from_le_bytes([bytes[0], bytes[1]]) & !resolution.undefined_bits();
    Ok(Scratchpad {
        temperature: raw as f32 / 16.0,
        resolution,
    })
}

/// First thermometer found on the bus.
pub struct SoilTemperatureSensor<B: ThermometerBus> {
    bus: B,
}

impl<B: ThermometerBus> SoilTemperatureSensor<B> {
    pub fn new(bus: B) -> Self {
        SoilTemperatureSensor { bus }
    }

    pub fn init(&mut self) -> Result<(), Error<B::Error>> {
        let found = self.bus.begin().map_err(Error::Bus)?;
        if found == 0 {
            warn!("no thermometer on the one-wire bus");
            return Err(Error::Disconnected);
        }
        debug!("{} thermometer(s) on the one-wire bus", found);
        Ok(())
    }

    /// Soil temperature, °C.
    pub fn temperature(&mut self) -> Result<f32, Error<B::Error>> {
        self.bus.request_temperatures().map_err(Error::Bus)?;
        let bytes = self.bus.read_scratchpad(0).map_err(Error::Bus)?;
        match decode_scratchpad(&bytes) {
            Ok(scratchpad) => Ok(scratchpad.temperature),
            Err(e) => {
                error!("cannot read soil temperature: {}", e.kind());
                Err(e)
            }
        }
    }

    pub fn release(self) -> B {
        self.bus
    }
}
