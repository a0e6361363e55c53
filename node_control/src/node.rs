use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use no_std_compat::cell::{Cell, RefCell};

use crate::bmp388::Bmp388Sensor;
use crate::bsp::analog::AnalogInput;
use crate::bsp::dht::DhtLine;
use crate::bsp::one_wire::ThermometerBus;
use crate::bsp::radio::Radio;
use crate::bsp::sensors::Sensors;
use crate::config::NodeConfig;
use crate::dht22::Dht22Sensor;
use crate::ds18b20::SoilTemperatureSensor;
use crate::edt::EDT;
use crate::error::SensorError;
use crate::fuel_gauge::BatteryGauge;
use crate::light::LightSensor;
use crate::payload::Measurements;
use crate::scd30::Co2Sensor;
use crate::soil_moisture::SoilMoistureSensor;

#[derive(Clone, Debug, Eq, PartialEq, Copy)]
pub enum Action {
    Measure,
    PollCo2 { attempt: u8 },
    Transmit,
    RestartCo2,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Copy)]
pub struct UplinkStats {
    pub sent: u32,
    pub failed: u32,
}

/// Measurement cycle: reads every sensor, waits for the CO2 sensor, sends the frame and
/// sleeps until the next cycle.
pub struct NodeControl<'a> {
    sensors: &'a dyn Sensors,
    radio: &'a dyn Radio,
    edt: &'a EDT<Action>,
    config: NodeConfig,
    pending: Cell<Measurements>,
    last: Cell<Option<Measurements>>,
    co2_failures: Cell<u8>,
    stats: Cell<UplinkStats>,
}

impl<'a> NodeControl<'a> {
    pub fn new(
        sensors: &'a dyn Sensors,
        radio: &'a dyn Radio,
        edt: &'a EDT<Action>,
        config: NodeConfig,
    ) -> Self {
        NodeControl {
            sensors,
            radio,
            edt,
            config,
            pending: Cell::new(Measurements::default()),
            last: Cell::new(None),
            co2_failures: Cell::new(0),
            stats: Cell::new(UplinkStats::default()),
        }
    }

    pub fn start(&self) {
        self.post(0, Action::Measure);
    }

    /// Drops the running cycle and starts a new one right away.
    pub fn measure_now(&self) {
        self.edt
            .remove(|action| !matches!(action, Action::RestartCo2));
        self.pending.set(Measurements::default());
        self.post(0, Action::Measure);
    }

    pub fn restart_co2(&self) {
        self.post(0, Action::RestartCo2);
    }

    pub fn process_message(&self, action: Action) {
        match action {
            Action::Measure => self.measure(),
            Action::PollCo2 { attempt } => self.poll_co2(attempt),
            Action::Transmit => self.transmit(),
            Action::RestartCo2 => self.restart_co2_sensor(),
        }
    }

    /// Values of the last transmitted cycle.
    pub fn last_measurements(&self) -> Option<Measurements> {
        self.last.get()
    }

    pub fn stats(&self) -> UplinkStats {
        self.stats.get()
    }

    pub fn co2_failures(&self) -> u8 {
        self.co2_failures.get()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn post(&self, delay: u32, action: Action) {
        if self.edt.schedule(delay, action).is_err() {
            error!("event queue is full, action dropped");
        }
    }

    fn measure(&self) {
        info!("measuring");
        let air = checked("air", self.sensors.air());
        self.pending.set(Measurements {
            pressure_pa: checked("pressure", self.sensors.pressure()),
            air_temperature_c: air.map(|(t, _)| t),
            air_humidity: air.map(|(_, h)| h),
            co2_ppm: None,
            light_lux: checked("light", self.sensors.light()),
            soil_moisture: checked("soil moisture", self.sensors.soil_moisture()),
            soil_temperature_c: checked("soil temperature", self.sensors.soil_temperature()),
            battery: checked("battery", self.sensors.battery()),
        });
        self.post(0, Action::PollCo2 { attempt: 1 });
    }

    fn poll_co2(&self, attempt: u8) {
        match self.sensors.co2() {
            Ok(ppm) => {
                debug!("CO2 {} ppm after {} polls", ppm, attempt);
                self.pending.set(Measurements {
                    co2_ppm: Some(ppm),
                    ..self.pending.get()
                });
                self.co2_failures.set(0);
                self.post(0, Action::Transmit);
            }
            Err(e) if attempt < self.config.co2_max_attempts => {
                debug!("CO2 poll {}: {}", attempt, e);
                self.post(self.config.co2_retry_ms, Action::PollCo2 { attempt: attempt + 1 });
            }
            Err(e) => {
                let failures = self.co2_failures.get().saturating_add(1);
                warn!("no CO2 value after {} polls: {}", attempt, e);
                if failures >= self.config.co2_restart_after {
                    self.co2_failures.set(0);
                    self.post(0, Action::RestartCo2);
                } else {
                    self.co2_failures.set(failures);
                }
                self.post(0, Action::Transmit);
            }
        }
    }

    fn transmit(&self) {
        let measurements = self.pending.get();
        let frame = measurements.encode();
        let mut stats = self.stats.get();
        match self.radio.send(self.config.uplink_port, &frame) {
            Ok(()) => stats.sent += 1,
            Err(e) => {
                warn!("frame not delivered: {}", e);
                stats.failed += 1;
            }
        }
        self.stats.set(stats);
        self.last.set(Some(measurements));
        self.pending.set(Measurements::default());
        self.post(self.config.measurement_period_ms, Action::Measure);
    }

    fn restart_co2_sensor(&self) {
        warn!("restarting the CO2 sensor");
        if let Err(e) = self.sensors.restart_co2() {
            error!("CO2 sensor restart failed: {}", e);
        }
    }
}

fn checked<T>(name: &str, result: Result<T, SensorError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} sensor: {}", name, e);
            None
        }
    }
}

/// The node's sensors behind [Sensors].
///
/// Each driver sits in a `RefCell` since the measurement cycle only has shared access.
pub struct SensorSuite<Baro, Air, Co2, Light, Soil, SoilTemp, Battery> {
    barometer: RefCell<Baro>,
    air: RefCell<Air>,
    co2: RefCell<Co2>,
    light: RefCell<Light>,
    soil: RefCell<Soil>,
    soil_temperature: RefCell<SoilTemp>,
    battery: RefCell<Battery>,
}

impl<Baro, Air, Co2, Light, Soil, SoilTemp, Battery>
    SensorSuite<Baro, Air, Co2, Light, Soil, SoilTemp, Battery>
{
    pub fn new(
        barometer: Baro,
        air: Air,
        co2: Co2,
        light: Light,
        soil: Soil,
        soil_temperature: SoilTemp,
        battery: Battery,
    ) -> Self {
        SensorSuite {
            barometer: RefCell::new(barometer),
            air: RefCell::new(air),
            co2: RefCell::new(co2),
            light: RefCell::new(light),
            soil: RefCell::new(soil),
            soil_temperature: RefCell::new(soil_temperature),
            battery: RefCell::new(battery),
        }
    }
}

type Suite<BI, BD, AL, CI, CD, LI, LD, SA, TB, BA> = SensorSuite<
    Bmp388Sensor<BI, BD>,
    Dht22Sensor<AL>,
    Co2Sensor<CI, CD>,
    LightSensor<LI, LD>,
    SoilMoistureSensor<SA>,
    SoilTemperatureSensor<TB>,
    BatteryGauge<BA>,
>;

impl<BI, BD, AL, CI, CD, LI, LD, SA, TB, BA> Suite<BI, BD, AL, CI, CD, LI, LD, SA, TB, BA>
where
    BI: I2c,
    BD: DelayNs,
    AL: DhtLine,
    CI: I2c,
    CD: DelayNs,
    LI: I2c,
    LD: DelayNs,
    SA: AnalogInput,
    TB: ThermometerBus,
    BA: AnalogInput,
{
    /// Brings every sensor up with the site settings of `config`. A failing sensor does
    /// not keep the others from starting, the first failure is returned.
    pub fn init(&self, config: &NodeConfig, barometer_attempts: u8) -> Result<(), SensorError> {
        self.barometer.borrow_mut().set_altitude_base(config.altitude_m);
        self.co2.borrow_mut().set_interval(config.co2_interval_s);

        let mut first = Ok(());
        let mut check = |name: &str, result: Result<(), SensorError>| {
            if let Err(e) = result {
                error!("{} sensor failed to start: {}", name, e);
                first = first.and(Err(e));
            }
        };
        let attempts = barometer_attempts;
        check("barometer", self.barometer.borrow_mut().begin(attempts).map_err(Into::into));
        check("air", self.air.borrow_mut().begin().map_err(Into::into));
        check("CO2", self.co2.borrow_mut().init().map_err(Into::into));
        check("light", self.light.borrow_mut().init().map_err(Into::into));
        check("soil temperature", self.soil_temperature.borrow_mut().init().map_err(Into::into));
        first
    }
}

impl<BI, BD, AL, CI, CD, LI, LD, SA, TB, BA> Sensors
    for Suite<BI, BD, AL, CI, CD, LI, LD, SA, TB, BA>
where
    BI: I2c,
    BD: DelayNs,
    AL: DhtLine,
    CI: I2c,
    CD: DelayNs,
    LI: I2c,
    LD: DelayNs,
    SA: AnalogInput,
    TB: ThermometerBus,
    BA: AnalogInput,
{
    fn pressure(&self) -> Result<f32, SensorError> {
        Ok(self.barometer.borrow_mut().pressure()?)
    }

    fn air(&self) -> Result<(f32, f32), SensorError> {
        let reading = self.air.borrow_mut().read()?;
        Ok((reading.temperature, reading.humidity))
    }

    fn co2(&self) -> Result<f32, SensorError> {
        Ok(self.co2.borrow_mut().co2()?)
    }

    fn restart_co2(&self) -> Result<(), SensorError> {
        Ok(self.co2.borrow_mut().restart()?)
    }

    fn light(&self) -> Result<f32, SensorError> {
        Ok(self.light.borrow_mut().lux()?)
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
mod test {
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    use crate::bmp388::{self, Bmp388Sensor};
    use crate::bsp::analog::AnalogInput;
    use crate::bsp::dht::DhtLine;
    use crate::bsp::one_wire::ThermometerBus;
    use crate::bsp::sensors::Sensors;
    use crate::config::NodeConfig;
    use crate::dht22::Dht22Sensor;
    use crate::ds18b20::SoilTemperatureSensor;
    use crate::error::SensorError;
    use crate::fuel_gauge::{BatteryGauge, DischargeModel, GaugeConfig};
    use crate::light::{self, LightSensor};
    use crate::node::SensorSuite;
    use crate::scd30::{self, Co2Sensor};
    use crate::soil_moisture::SoilMoistureSensor;

    struct FixedAdc(u16);

    impl AnalogInput for FixedAdc {
        fn read_raw(&mut self) -> u16 {
            self.0
        }
    }

    struct FixedLine([u8; 5]);

    impl DhtLine for FixedLine {
        type Error = ();

        fn release(&mut self) -> Result<(), ()> {
            Ok(())
        }

        fn read_frame(&mut self) -> Result<[u8; 5], ()> {
            Ok(self.0)
        }
    }

    /// One thermometer still holding its power-on scratchpad.
    struct FreshThermometer;

    impl ThermometerBus for FreshThermometer {
        type Error = ();

        fn begin(&mut self) -> Result<usize, ()> {
            Ok(1)
        }

        fn request_temperatures(&mut self) -> Result<(), ()> {
            Ok(())
        }

        fn read_scratchpad(&mut self, _index: usize) -> Result<[u8; 9], ()> {
            Ok([0x50, 0x05, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10, 0x1c])
        }
    }

    #[test]
    fn suite_forwards_readings_and_error_kinds() {
        let baro_i2c = I2cMock::new(&[I2cTransaction::write_read(
            bmp388::DEFAULT_ADDRESS,
            vec![0x31],
            vec![0; 21],
        )
        .with_error(ErrorKind::Other)]);
        let co2_i2c = I2cMock::new(&[
            I2cTransaction::write(scd30::DEFAULT_ADDRESS, vec![0x02, 0x02]),
            I2cTransaction::read(scd30::DEFAULT_ADDRESS, vec![0x00, 0x00, 0x81]),
        ]);
        let light_i2c = I2cMock::new(&[
            I2cTransaction::write(light::DEFAULT_ADDRESS, vec![0x10]),
            I2cTransaction::read(light::DEFAULT_ADDRESS, vec![0x01, 0x2c]),
        ]);
        let (mut baro_done, mut co2_done, mut light_done) =
            (baro_i2c.clone(), co2_i2c.clone(), light_i2c.clone());

        let suite = SensorSuite::new(
            Bmp388Sensor::new(baro_i2c, NoopDelay::new(), bmp388::DEFAULT_ADDRESS, 540),
            // 40.0 %, 21.5 °C
            Dht22Sensor::new(FixedLine([0x01, 0x90, 0x00, 0xd7, 0x68])),
            Co2Sensor::new(co2_i2c, NoopDelay::new(), scd30::DEFAULT_ADDRESS),
            LightSensor::new(light_i2c, NoopDelay::new(), light::DEFAULT_ADDRESS),
            SoilMoistureSensor::new(FixedAdc(465), 620, 310),
            SoilTemperatureSensor::new(FreshThermometer),
            BatteryGauge::new(
                FixedAdc(1023),
                GaugeConfig::default(),
                DischargeModel::Linear {
                    min_raw: 0,
                    max_raw: 1023,
                },
            ),
        );

        assert_eq!(suite.pressure(), Err(SensorError::Bus));
        assert_eq!(suite.air(), Ok((21.5, 40.0)));
        assert_eq!(suite.co2(), Err(SensorError::NotReady));
        let lux = suite.light().unwrap();
        assert!((lux - 250.0).abs() < 1e-3, "got {}", lux);
        assert_eq!(suite.soil_moisture(), Ok(50));
        assert_eq!(suite.soil_temperature(), Ok(85.0));
        assert_eq!(suite.battery(), Ok(100));

        baro_done.done();
        co2_done.done();
        light_done.done();
    }

    #[test]
    fn init_starts_the_rest_when_one_sensor_fails() {
        let baro_i2c = I2cMock::new(&[I2cTransaction::write_read(
            bmp388::DEFAULT_ADDRESS,
            vec![0x00],
            vec![0x00],
        )
        .with_error(ErrorKind::Other)]);
        let co2_i2c = I2cMock::new(&[
            I2cTransaction::write(scd30::DEFAULT_ADDRESS, vec![0xd3, 0x04]),
            I2cTransaction::write(scd30::DEFAULT_ADDRESS, vec![0xd1, 0x00]),
            I2cTransaction::read(scd30::DEFAULT_ADDRESS, vec![0x03, 0x42, 0xf3]),
            I2cTransaction::write(scd30::DEFAULT_ADDRESS, vec![0x00, 0x10, 0x00, 0x00, 0x81]),
            // interval from the site configuration, 30 s
            I2cTransaction::write(scd30::DEFAULT_ADDRESS, vec![0x46, 0x00, 0x00, 0x1e, 0xdd]),
        ]);
        let light_i2c = I2cMock::new(&[I2cTransaction::write(light::DEFAULT_ADDRESS, vec![0x10])]);
        let (mut baro_done, mut co2_done, mut light_done) =
            (baro_i2c.clone(), co2_i2c.clone(), light_i2c.clone());

        let suite = SensorSuite::new(
            Bmp388Sensor::new(baro_i2c, NoopDelay::new(), bmp388::DEFAULT_ADDRESS, 540),
            Dht22Sensor::new(FixedLine([0; 5])),
            Co2Sensor::new(co2_i2c, NoopDelay::new(), scd30::DEFAULT_ADDRESS),
            LightSensor::new(light_i2c, NoopDelay::new(), light::DEFAULT_ADDRESS),
            SoilMoistureSensor::new(FixedAdc(0), 620, 310),
            SoilTemperatureSensor::new(FreshThermometer),
            BatteryGauge::new(FixedAdc(0), GaugeConfig::default(), DischargeModel::Curve),
        );

        let config = NodeConfig {
            co2_interval_s: 30,
            altitude_m: 1200,
            ..Default::default()
        };
        assert_eq!(suite.init(&config, 1), Err(SensorError::Bus));
        assert_eq!(suite.barometer.borrow().altitude_base(), 1200);
        assert_eq!(suite.co2.borrow().interval(), 30);
        baro_done.done();
        co2_done.done();
        light_done.done();
    }
}
