//! Seams to the board. Buses with an `embedded-hal` trait (I2C, delays) use it directly,
//! the rest is described here and implemented by the firmware or the simulator.

pub mod analog {
    /// An analog input pin sampled by the ADC.
    pub trait AnalogInput {
        /// Raw conversion result, `0..=full_scale`.
        fn read_raw(&mut self) -> u16;
    }
}

pub mod one_wire {
    /// A one-wire bus with DS18B20 style thermometers on it.
    ///
    /// Reset pulses, ROM search and bit timing belong to the implementation.
    pub trait ThermometerBus {
        type Error: core::fmt::Debug;

        /// Resets the bus, counts the devices present.
        fn begin(&mut self) -> Result<usize, Self::Error>;

        /// Starts a conversion on every device and waits for it to finish.
        fn request_temperatures(&mut self) -> Result<(), Self::Error>;

        /// Reads the 9 byte scratchpad of the `index`th device found by `begin`.
        fn read_scratchpad(&mut self, index: usize) -> Result<[u8; 9], Self::Error>;
    }
}

pub mod dht {
    /// Single-wire line of a DHT sensor.
    pub trait DhtLine {
        type Error: core::fmt::Debug;

        /// Idles the line high so the sensor can settle.
        fn release(&mut self) -> Result<(), Self::Error>;

        /// Sends the start pulse and captures the 40 bit answer.
        fn read_frame(&mut self) -> Result<[u8; 5], Self::Error>;
    }
}

pub mod sensors {
    use crate::error::SensorError;

    /// Everything the measurement cycle reads. Implementations own the drivers and hide
    /// their buses, see [crate::node::SensorSuite].
    pub trait Sensors {
        /// Absolute pressure, Pa.
        fn pressure(&self) -> Result<f32, SensorError>;
        /// Air temperature (°C) and relative humidity (%).
        fn air(&self) -> Result<(f32, f32), SensorError>;
        /// CO2 concentration, ppm. `NotReady` until the sensor has a fresh sample.
        fn co2(&self) -> Result<f32, SensorError>;
        /// Power cycles the CO2 sensor.
        fn restart_co2(&self) -> Result<(), SensorError>;
        /// Illuminance, lx.
        fn light(&self) -> Result<f32, SensorError>;
        /// Soil humidity, %.
        fn soil_moisture(&self) -> Result<u8, SensorError>;
        /// Soil temperature, °C.
        fn soil_temperature(&self) -> Result<f32, SensorError>;
        /// Remaining battery charge, %.
        fn battery(&self) -> Result<u8, SensorError>;
    }
}

pub mod radio {
    use crate::lorawan::LoraError;

    /// Uplink used by the measurement cycle.
    pub trait Radio {
        fn send(&self, port: u8, data: &[u8]) -> Result<(), LoraError>;
    }
}
