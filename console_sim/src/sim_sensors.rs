use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::Rng;

use node_control::bsp::analog::AnalogInput;
use node_control::bsp::dht::DhtLine;
use node_control::bsp::one_wire::ThermometerBus;
use node_control::bsp::sensors::Sensors;
use node_control::crc;
use node_control::dht22::Dht22Sensor;
use node_control::ds18b20::SoilTemperatureSensor;
use node_control::error::SensorError;
use node_control::fuel_gauge::{BatteryGauge, DischargeModel, GaugeConfig};
use node_control::soil_moisture::SoilMoistureSensor;

use crate::battery::Battery;

/// Soil probe calibration, dry and saturated.
pub const SOIL_DRY_RAW: u16 = 620;
pub const SOIL_WET_RAW: u16 = 310;

/// Weather around the node, drifting as time goes by.
pub struct World {
    pub now: u64,
    pub pressure_pa: f32,
    pub air_temperature_c: f32,
    pub air_humidity: f32,
    pub co2_ppm: f32,
    pub light_lux: f32,
    pub soil_raw: f32,
    pub soil_temperature_c: f32,
    pub battery: Battery,
    pub gauge: GaugeConfig,
    pub co2_not_ready: f64,
    pub sensor_faults: f64,
    pub co2_restarts: u32,
    rng: StdRng,
}

fn walk(rng: &mut StdRng, value: f32, step: f32, min: f32, max: f32) -> f32 {
    (value + rng.gen_range(-step..=step)).clamp(min, max)
}

impl World {
    pub fn new(battery: Battery, co2_not_ready: f64, sensor_faults: f64, rng: StdRng) -> Self {
        World {
            now: 0,
            pressure_pa: 95_000.0,
            air_temperature_c: 18.0,
            air_humidity: 55.0,
            co2_ppm: 450.0,
            light_lux: 800.0,
            soil_raw: 450.0,
            soil_temperature_c: 12.0,
            battery,
            gauge: GaugeConfig::default(),
            co2_not_ready: co2_not_ready.clamp(0.0, 1.0),
            sensor_faults: sensor_faults.clamp(0.0, 1.0),
            co2_restarts: 0,
            rng,
        }
    }

    /// Moves the world to `now`, one random step per elapsed simulated minute.
    pub fn advance_to(&mut self, now: u64) {
        let elapsed = now.saturating_sub(self.now);
        if elapsed == 0 {
            return;
        }
        self.now = now;
        self.battery.drain(elapsed);
        let minutes = (elapsed / 60_000).clamp(1, 60) as f32;
        let rng = &mut self.rng;
        self.pressure_pa = walk(rng, self.pressure_pa, 5.0 * minutes, 90_000.0, 105_000.0);
        self.air_temperature_c = walk(rng, self.air_temperature_c, 0.1 * minutes, -20.0, 45.0);
        self.air_humidity = walk(rng, self.air_humidity, 0.3 * minutes, 5.0, 100.0);
        self.co2_ppm = walk(rng, self.co2_ppm, 4.0 * minutes, 400.0, 5000.0);
        self.light_lux = walk(rng, self.light_lux, 40.0 * minutes, 0.0, 60_000.0);
        self.soil_raw = walk(rng, self.soil_raw, 1.0 * minutes, 250.0, 700.0);
        self.soil_temperature_c = walk(rng, self.soil_temperature_c, 0.02 * minutes, -5.0, 35.0);
    }

    fn fault(&mut self) -> bool {
        let chance = self.sensor_faults;
        self.rng.gen_bool(chance)
    }

    fn co2_ready(&mut self) -> bool {
        let chance = self.co2_not_ready;
        !self.rng.gen_bool(chance)
    }
}

pub type SharedWorld = Rc<RefCell<World>>;

enum Channel {
    Battery,
    Soil,
}

pub struct SimAdc {
    world: SharedWorld,
    channel: Channel,
}

impl AnalogInput for SimAdc {
    fn read_raw(&mut self) -> u16 {
        let world = self.world.borrow();
        match self.channel {
            Channel::Battery => world.battery.adc_raw(&world.gauge),
            Channel::Soil => world.soil_raw.round() as u16,
        }
    }
}

#[derive(Debug)]
pub struct NoAnswer;

/// DHT22 answering with the world's air, now and then with a broken checksum.
pub struct SimDhtLine {
    world: SharedWorld,
}

impl DhtLine for SimDhtLine {
    type Error = NoAnswer;

    fn release(&mut self) -> Result<(), NoAnswer> {
        Ok(())
    }

    fn read_frame(&mut self) -> Result<[u8; 5], NoAnswer> {
        let mut world = self.world.borrow_mut();
        let humidity = (world.air_humidity * 10.0).round() as u16;
        let magnitude = (world.air_temperature_c.abs() * 10.0).round() as u16;
        let [h_hi, h_lo] = humidity.to_be_bytes();
        let [t_hi, t_lo] = magnitude.to_be_bytes();
        let t_hi = if world.air_temperature_c < 0.0 {
            t_hi | 0x80
        } else {
            t_hi
        };
        let mut checksum = h_hi.wrapping_add(h_lo).wrapping_add(t_hi).wrapping_add(t_lo);
        if world.fault() {
            checksum = !checksum;
        }
        Ok([h_hi, h_lo, t_hi, t_lo, checksum])
    }
}

/// A single DS18B20 in the soil.
pub struct SimThermometers {
    world: SharedWorld,
}

impl ThermometerBus for SimThermometers {
    type Error = NoAnswer;

    fn begin(&mut self) -> Result<usize, NoAnswer> {
        Ok(1)
    }

    fn request_temperatures(&mut self) -> Result<(), NoAnswer> {
        Ok(())
    }

    fn read_scratchpad(&mut self, index: usize) -> Result<[u8; 9], NoAnswer> {
        if index != 0 {
            return Err(NoAnswer);
        }
        let mut world = self.world.borrow_mut();
        if world.fault() {
            // probe unplugged, the line stays high
            return Ok([0xff; 9]);
        }
        let raw = (world.soil_temperature_c * 16.0).round() as i16;
        let [lsb, msb] = raw.to_le_bytes();
        let mut scratchpad = [lsb, msb, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10, 0x00];
        scratchpad[8] = crc::maxim(&scratchpad[..8]);
        Ok(scratchpad)
    }
}

/// The node's sensors. Air, soil and battery go through the real drivers, the I2C
/// devices are read from the world directly.
pub struct SimSensors {
    world: SharedWorld,
    air: RefCell<Dht22Sensor<SimDhtLine>>,
    soil: RefCell<SoilMoistureSensor<SimAdc>>,
    soil_temperature: RefCell<SoilTemperatureSensor<SimThermometers>>,
    battery: RefCell<BatteryGauge<SimAdc>>,
}

impl SimSensors {
    pub fn new(world: SharedWorld) -> Self {
        let gauge = world.borrow().gauge;
        SimSensors {
            air: RefCell::new(Dht22Sensor::new(SimDhtLine {
                world: world.clone(),
            })),
            soil: RefCell::new(SoilMoistureSensor::new(
                SimAdc {
                    world: world.clone(),
                    channel: Channel::Soil,
                },
                SOIL_DRY_RAW,
                SOIL_WET_RAW,
            )),
            soil_temperature: RefCell::new(SoilTemperatureSensor::new(SimThermometers {
                world: world.clone(),
            })),
            battery: RefCell::new(BatteryGauge::new(
                SimAdc {
                    world: world.clone(),
                    channel: Channel::Battery,
                },
                gauge,
                DischargeModel::Curve,
            )),
            world,
        }
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }
}

impl Sensors for SimSensors {
    fn pressure(&self) -> Result<f32, SensorError> {
        Ok(self.world.borrow().pressure_pa)
    }

    fn air(&self) -> Result<(f32, f32), SensorError> {
        let reading = self.air.borrow_mut().read()?;
        Ok((reading.temperature, reading.humidity))
    }

    fn co2(&self) -> Result<f32, SensorError> {
        let mut world = self.world.borrow_mut();
        if world.co2_ready() {
            Ok(world.co2_ppm)
        } else {
            Err(SensorError::NotReady)
        }
    }

    fn restart_co2(&self) -> Result<(), SensorError> {
        self.world.borrow_mut().co2_restarts += 1;
        Ok(())
    }

    fn light(&self) -> Result<f32, SensorError> {
        Ok(self.world.borrow().light_lux)
    }

    fn soil_moisture(&self) -> Result<u8, SensorError> {
        Ok(self.soil.borrow_mut().humidity_level())
    }

    fn soil_temperature(&self) -> Result<f32, SensorError> {
        Ok(self.soil_temperature.borrow_mut().temperature()?)
    }

    fn battery(&self) -> Result<u8, SensorError> {
        Ok(self.battery.borrow_mut().level())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use node_control::bsp::sensors::Sensors;
    use node_control::error::SensorError;

    use crate::battery::Battery;
    use crate::sim_sensors::{SimSensors, World};

    fn sensors(co2_not_ready: f64, sensor_faults: f64) -> SimSensors {
        let world = World::new(
            Battery::new(2000.0, 80.0, 10.0),
            co2_not_ready,
            sensor_faults,
            StdRng::seed_from_u64(1),
        );
        SimSensors::new(Rc::new(RefCell::new(world)))
    }

    #[test]
    fn drivers_decode_the_world() {
        let sensors = sensors(0.0, 0.0);
        {
            let mut world = sensors.world().borrow_mut();
            world.air_temperature_c = -4.5;
            world.air_humidity = 61.2;
            world.soil_temperature_c = 9.25;
            world.soil_raw = 465.0;
        }
        assert_eq!(sensors.air(), Ok((-4.5, 61.2)));
        assert_eq!(sensors.soil_temperature(), Ok(9.25));
        assert_eq!(sensors.soil_moisture(), Ok(50));
        let battery = sensors.battery().unwrap() as i32;
        assert!((battery - 80).abs() <= 2, "got {}", battery);
        assert_eq!(sensors.co2(), Ok(450.0));
    }

    #[test]
    fn faults_reach_the_node() {
        let sensors = sensors(1.0, 1.0);
        assert_eq!(sensors.air(), Err(SensorError::Corrupted));
        assert_eq!(sensors.soil_temperature(), Err(SensorError::Disconnected));
        assert_eq!(sensors.co2(), Err(SensorError::NotReady));
    }

    #[test]
    fn world_drifts_within_bounds() {
        let sensors = sensors(0.0, 0.0);
        let mut world = sensors.world().borrow_mut();
        for minute in 1..=1000 {
            world.advance_to(minute * 60_000);
        }
        assert!((90_000.0..=105_000.0).contains(&world.pressure_pa));
        assert!((5.0..=100.0).contains(&world.air_humidity));
        assert!(world.battery.charge_percent() < 80.0);
    }
}
