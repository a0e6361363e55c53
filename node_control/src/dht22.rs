//! DHT22 / AM2302 air temperature and humidity sensor.
use crate::bsp::dht::DhtLine;
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AirReading {
    /// °C
    pub temperature: f32,
    /// Relative humidity, %.
    pub humidity: f32,
}

/// Decodes the 40 bit answer: humidity and temperature in tenths, sign in the top bit of
/// the temperature, then a checksum.
pub fn decode_frame<E>(frame: &[u8; 5]) -> Result<AirReading, Error<E>> {
    let sum = frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != frame[4] {
        return Err(Error::Checksum);
    }
    let humidity = u16::from_be_bytes([frame[0], frame[1]]) as f32 / 10.0;
    let magnitude = u16::from_be_bytes([frame[2] & 0x7f, frame[3]]) as f32 / 10.0;
    let temperature = if frame[2] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    };
    Ok(AirReading {
        temperature,
        humidity,
    })
}

pub struct Dht22Sensor<L: DhtLine> {
    line: L,
}

impl<L: DhtLine> Dht22Sensor<L> {
    pub fn new(line: L) -> Self {
        Dht22Sensor { line }
    }

    pub fn begin(&mut self) -> Result<(), Error<L::Error>> {
        self.line.release().map_err(Error::Bus)?;
        info!("DHT22 ready");
        Ok(())
    }

    pub fn read(&mut self) -> Result<AirReading, Error<L::Error>> {
        let frame = self.line.read_frame().map_err(Error::Bus)?;
        decode_frame(&frame)
    }

    pub fn temperature(&mut self) -> Result<f32, Error<L::Error>> {
        self.read().map(|it| it.temperature).map_err(|e| {
            error!("cannot read air temperature: {}", e.kind());
            e
        })
    }

    pub fn humidity(&mut self) -> Result<f32, Error<L::Error>> {
        self.read().map(|it| it.humidity).map_err(|e| {
            error!("cannot read air humidity: {}", e.kind());
            e
        })
    }

    pub fn release(self) -> L {
        self.line
    }
}

#[cfg(test)]
mod test {
    use crate::bsp::dht::DhtLine;
    use crate::dht22::{decode_frame, Dht22Sensor};
    use crate::error::Error;

    struct TestLine {
        frame: Result<[u8; 5], ()>,
    }

    impl DhtLine for TestLine {
        type Error = ();

        fn release(&mut self) -> Result<(), ()> {
            Ok(())
        }

        fn read_frame(&mut self) -> Result<[u8; 5], ()> {
            self.frame
        }
    }

    #[test]
    fn datasheet_frame() {
        let reading = decode_frame::<()>(&[0x02, 0x8c, 0x01, 0x5f, 0xee]).unwrap();
        assert!((reading.humidity - 65.2).abs() < 1e-4);
        assert!((reading.temperature - 35.1).abs() < 1e-4);
    }

    #[test]
    fn below_zero() {
        let reading = decode_frame::<()>(&[0x01, 0xf4, 0x80, 0x65, 0xda]).unwrap();
        assert!((reading.humidity - 50.0).abs() < 1e-4);
        assert!((reading.temperature + 10.1).abs() < 1e-4);
    }

    #[test]
    fn bad_checksum() {
        assert_eq!(
            decode_frame::<()>(&[0x02, 0x8c, 0x01, 0x5f, 0xef]),
            Err(Error::Checksum)
        );
    }

    #[test]
    fn line_errors_are_reported() {
        let mut sensor = Dht22Sensor::new(TestLine { frame: Err(()) });
        assert_eq!(sensor.begin(), Ok(()));
        assert_eq!(sensor.temperature(), Err(Error::Bus(())));
        assert_eq!(sensor.humidity(), Err(Error::Bus(())));
    }
}
