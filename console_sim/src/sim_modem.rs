use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_io::{ErrorType, Read, Write};
use rand::rngs::StdRng;
use rand::Rng;

use node_control::payload::{Measurements, PayloadError};

/// A frame as the network server sees it.
pub struct Uplink {
    pub port: u8,
    pub confirmed: bool,
    pub measurements: Result<Measurements, PayloadError>,
}

/// What happened on the air, shared with the dashboard.
#[derive(Default)]
pub struct Network {
    pub joined: bool,
    pub band: Option<u8>,
    pub uplinks: Vec<Uplink>,
    pub lost: u32,
}

pub type SharedNetwork = Rc<RefCell<Network>>;

struct PendingUplink {
    remaining: usize,
    confirmed: bool,
    data: Vec<u8>,
}

/// Murata modem firmware as seen through the serial line: answers AT commands and
/// reports uplinks to the [Network].
pub struct SimModem {
    network: SharedNetwork,
    rx: VecDeque<u8>,
    line: Vec<u8>,
    uplink: Option<PendingUplink>,
    port: u8,
    loss: f64,
    rng: StdRng,
}

impl SimModem {
    pub fn new(network: SharedNetwork, loss: f64, rng: StdRng) -> Self {
        SimModem {
            network,
            rx: VecDeque::new(),
            line: Vec::new(),
            uplink: None,
            port: 1,
            loss: loss.clamp(0.0, 1.0),
            rng,
        }
    }

    fn answer(&mut self, reply: &str) {
        self.rx.extend(reply.as_bytes());
        self.rx.extend(b"\r\n");
    }

    fn on_line(&mut self) {
        let line = String::from_utf8_lossy(&self.line).trim().to_string();
        self.line.clear();
        if line.is_empty() {
            return;
        }
        log::trace!("modem got {}", line);
        let (command, argument) = match line.split_once(|c: char| c == '=' || c == ' ') {
            Some((command, argument)) => (command, Some(argument)),
            None => (line.as_str(), None),
        };
        match (command, argument) {
            ("AT", None) | ("AT+MODE", Some("1")) => self.answer("+OK"),
            ("AT+BAND", Some(band)) => match band.parse::<u8>() {
                Ok(band) if band <= 8 => {
                    self.network.borrow_mut().band = Some(band);
                    self.answer("+OK");
                }
                _ => self.answer("+ERR=-1"),
            },
            ("AT+APPEUI", Some(hex)) | ("AT+DEUI", Some(hex)) => self.hex_argument(hex, 16),
            ("AT+AK", Some(hex)) => self.hex_argument(hex, 32),
            ("AT+JOIN", None) => {
                self.answer("+OK");
                self.network.borrow_mut().joined = true;
                self.answer("+EVENT=1,1");
            }
            ("AT+PORT", Some(port)) => match port.parse::<u8>() {
                Ok(port) => {
                    self.port = port;
                    self.answer("+OK");
                }
                Err(_) => self.answer("+ERR=-1"),
            },
            ("AT+CTX", Some(len)) | ("AT+UTX", Some(len)) => match len.parse::<usize>() {
                Ok(remaining) => {
                    self.uplink = Some(PendingUplink {
                        remaining,
                        confirmed: command == "AT+CTX",
                        data: Vec::with_capacity(remaining),
                    });
                    if remaining == 0 {
                        self.on_uplink();
                    }
                }
                Err(_) => self.answer("+ERR=-1"),
            },
            _ => self.answer("+ERR=-1"),
        }
    }

    fn hex_argument(&mut self, hex: &str, len: usize) {
        if hex.len() == len && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            self.answer("+OK");
        } else {
            self.answer("+ERR=-2");
        }
    }

    fn on_uplink(&mut self) {
        let uplink = match self.uplink.take() {
            Some(uplink) => uplink,
            None => return,
        };
        if !self.network.borrow().joined {
            self.answer("+ERR=-4");
            return;
        }
        self.answer("+OK");
        let chance = self.loss;
        if self.rng.gen_bool(chance) {
            self.network.borrow_mut().lost += 1;
            if uplink.confirmed {
                self.answer("+NOACK");
            }
            return;
        }
        self.network.borrow_mut().uplinks.push(Uplink {
            port: self.port,
            confirmed: uplink.confirmed,
            measurements: Measurements::decode(&uplink.data),
        });
        if uplink.confirmed {
            self.answer("+ACK");
        }
    }
}

impl ErrorType for SimModem {
    type Error = Infallible;
}

impl Read for SimModem {
    /// Never blocks, an empty buffer reads as end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimModem {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        for byte in buf {
            match self.uplink.as_mut() {
                Some(uplink) => {
                    uplink.data.push(*byte);
                    uplink.remaining -= 1;
                    if uplink.remaining == 0 {
                        self.on_uplink();
                    }
                }
                None if *byte == b'\r' || *byte == b'\n' => self.on_line(),
                None => self.line.push(*byte),
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}
