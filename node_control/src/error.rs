use core::fmt;

/// Error of a driver talking over a bus whose own error type is `E`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The underlying bus (I2C, one-wire, single-wire line) failed.
    Bus(E),
    /// A Sensirion or Maxim CRC-8 did not match.
    Crc,
    /// Frame checksum of a DHT transmission did not match.
    Checksum,
    /// The sensor has no fresh data yet, ask again later.
    NotReady,
    /// Nothing answered on the line.
    Disconnected,
    /// The chip identified itself as something else.
    UnexpectedChipId(u8),
    /// An argument was outside of what the device accepts.
    InvalidArgument,
    /// Gave up after the configured number of attempts.
    Timeout,
}

impl<E> Error<E> {
    /// Drops the bus error payload, keeping only what went wrong.
    pub fn kind(&self) -> SensorError {
        match self {
            Error::Bus(_) => SensorError::Bus,
            Error::Crc | Error::Checksum => SensorError::Corrupted,
            Error::NotReady => SensorError::NotReady,
            Error::Disconnected => SensorError::Disconnected,
            Error::UnexpectedChipId(_) => SensorError::WrongDevice,
            Error::InvalidArgument => SensorError::InvalidArgument,
            Error::Timeout => SensorError::Timeout,
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {:?}", e),
            Error::UnexpectedChipId(id) => write!(f, "unexpected chip id 0x{:02x}", id),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Bus independent error, what the measurement cycle gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    Bus,
    Corrupted,
    NotReady,
    Disconnected,
    WrongDevice,
    InvalidArgument,
    Timeout,
}

impl<E> From<Error<E>> for SensorError {
    fn from(e: Error<E>) -> Self {
        e.kind()
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SensorError::Bus => "bus error",
            SensorError::Corrupted => "corrupted data",
            SensorError::NotReady => "data not ready",
            SensorError::Disconnected => "device disconnected",
            SensorError::WrongDevice => "unexpected device",
            SensorError::InvalidArgument => "invalid argument",
            SensorError::Timeout => "timed out",
        };
        f.write_str(s)
    }
}
