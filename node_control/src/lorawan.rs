//! LoRaWAN uplink: identifiers, the modem seam and the helper the node sends through.
use core::fmt;

use no_std_compat::cell::{Cell, RefCell};

use crate::bsp::radio::Radio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoraError {
    /// The modem did not answer or answered garbage.
    NotResponding,
    /// The modem refused a command, with its error code if it gave one.
    Rejected(i8),
    /// The modem refused to switch to the configured band.
    UnsupportedRegion,
    JoinFailed,
    NotJoined,
    /// The confirmed uplink was not acknowledged.
    NoAck,
    PayloadTooLarge,
    /// The serial line failed or closed.
    Io,
}

impl fmt::Display for LoraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoraError::NotResponding => f.write_str("modem not responding"),
            LoraError::Rejected(code) => write!(f, "command rejected ({})", code),
            LoraError::UnsupportedRegion => f.write_str("unsupported region"),
            LoraError::JoinFailed => f.write_str("OTAA join failed"),
            LoraError::NotJoined => f.write_str("not joined"),
            LoraError::NoAck => f.write_str("uplink not acknowledged"),
            LoraError::PayloadTooLarge => f.write_str("payload too large"),
            LoraError::Io => f.write_str("serial error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Region {
    AS923,
    AU915,
    CN470,
    CN779,
    EU433,
    EU868,
    KR920,
    IN865,
    US915,
}

/// A hex string did not have the expected length or contained other characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidHex;

impl fmt::Display for InvalidHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid hex identifier")
    }
}

fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N], InvalidHex> {
    let s = s.trim();
    if s.len() != N * 2 || !s.is_ascii() {
        return Err(InvalidHex);
    }
    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| InvalidHex)?;
    }
    Ok(out)
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{:02X}", b)?;
    }
    Ok(())
}

/// 64 bit extended unique identifier, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Eui(pub [u8; 8]);

impl Eui {
    pub fn from_hex(s: &str) -> Result<Self, InvalidHex> {
        parse_hex(s).map(Eui)
    }
}

impl fmt::Display for Eui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// AES-128 application root key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AppKey(pub [u8; 16]);

impl AppKey {
    pub fn from_hex(s: &str) -> Result<Self, InvalidHex> {
        parse_hex(s).map(AppKey)
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for AppKey {
    // keys stay out of logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AppKey(..)")
    }
}

/// Over-the-air activation identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub dev_eui: Eui,
    pub app_eui: Eui,
    pub app_key: AppKey,
}

impl Credentials {
    pub fn from_hex(dev_eui: &str, app_eui: &str, app_key: &str) -> Result<Self, InvalidHex> {
        Ok(Credentials {
            dev_eui: Eui::from_hex(dev_eui)?,
            app_eui: Eui::from_hex(app_eui)?,
            app_key: AppKey::from_hex(app_key)?,
        })
    }
}

/// A LoRaWAN modem running the MAC itself, we only tell it what to do.
pub trait Modem {
    /// Resets the modem and selects the frequency plan.
    fn begin(&mut self, region: Region) -> Result<(), LoraError>;

    /// Joins the network, returns once the join was accepted or refused.
    fn join_otaa(&mut self, credentials: &Credentials) -> Result<(), LoraError>;

    /// Sends one uplink on application port `port`.
    fn send(&mut self, port: u8, data: &[u8], confirmed: bool) -> Result<(), LoraError>;
}

/// Joins the network once and then sends the node's frames.
pub struct LoraUplink<M: Modem> {
    modem: RefCell<M>,
    region: Region,
    credentials: Credentials,
    join_attempts: u8,
    confirmed: bool,
    joined: Cell<bool>,
}

impl<M: Modem> LoraUplink<M> {
    pub fn new(modem: M, region: Region, credentials: Credentials) -> Self {
        LoraUplink {
            modem: RefCell::new(modem),
            region,
            credentials,
            join_attempts: 1,
            confirmed: true,
            joined: Cell::new(false),
        }
    }

    pub fn with_join_attempts(mut self, attempts: u8) -> Self {
        self.join_attempts = attempts.max(1);
        self
    }

    pub fn with_confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = confirmed;
        self
    }

    /// Initializes the modem and joins over the air.
    pub fn configure(&self) -> Result<(), LoraError> {
        info!("initializing LoRa modem");
        let mut modem = self.modem.borrow_mut();
        modem.begin(self.region).map_err(|e| {
            error!("cannot initialize the modem: {}", e);
            e
        })?;

        info!("OTAA join in progress, device {}", self.credentials.dev_eui);
        let mut result = Err(LoraError::JoinFailed);
        for attempt in 1..=self.join_attempts {
            result = modem.join_otaa(&self.credentials);
            match result {
                Ok(()) => break,
                Err(e) => warn!("OTAA join attempt {} failed: {}", attempt, e),
            }
        }
        if result.is_ok() {
            info!("joined the network");
        } else {
            error!("OTAA join failed");
        }
        self.joined.set(result.is_ok());
        result
    }

    pub fn is_joined(&self) -> bool {
        self.joined.get()
    }

    pub fn send(&self, port: u8, data: &[u8]) -> Result<(), LoraError> {
        if !self.is_joined() {
            return Err(LoraError::NotJoined);
        }
        match self.modem.borrow_mut().send(port, data, self.confirmed) {
            Ok(()) => {
                info!("uplink of {} bytes sent on port {}", data.len(), port);
                Ok(())
            }
            Err(e) => {
                error!("uplink failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn release(self) -> M {
        self.modem.into_inner()
    }
}

impl<M: Modem> Radio for LoraUplink<M> {
    fn send(&self, port: u8, data: &[u8]) -> Result<(), LoraError> {
        LoraUplink::send(self, port, data)
    }
}
