//! AT command driver of the Murata module on the Arduino MKR WAN boards.
//!
//! Commands end with `\r`. Every command is answered with `+OK` or `+ERR=<code>`, joins
//! and confirmed uplinks report their outcome later with `+EVENT=1,<ok>` and
//! `+ACK`/`+NOACK`.
use core::fmt::Write as _;

use embedded_io::{Read, Write};
use heapless::{String, Vec};

use crate::lorawan::{Credentials, LoraError, Modem, Region};

/// Largest uplink the module accepts in one command.
pub const MAX_PAYLOAD: usize = 242;
/// Unrelated lines tolerated while waiting for an answer.
const MAX_LINES: usize = 32;
/// Unrelated replies tolerated while waiting for a join or acknowledgement event.
const MAX_REPLIES: usize = 16;
const LINE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Reply {
    Ok,
    Err(i8),
    Event(u8, u8),
    Ack,
    NoAck,
}

fn parse_reply(line: &str) -> Option<Reply> {
    let line = line.trim();
    if line.starts_with("+OK") {
        Some(Reply::Ok)
    } else if let Some(rest) = line.strip_prefix("+ERR") {
        let code = rest.trim_start_matches('=').parse::<i8>().unwrap_or(-1);
        Some(Reply::Err(code))
    } else if let Some(rest) = line.strip_prefix("+EVENT=") {
        let mut parts = rest.split(',').map(|it| it.trim().parse::<u8>());
        match (parts.next(), parts.next()) {
            (Some(Ok(kind)), Some(Ok(status))) => Some(Reply::Event(kind, status)),
            _ => None,
        }
    } else if line.starts_with("+NOACK") {
        Some(Reply::NoAck)
    } else if line.starts_with("+ACK") {
        Some(Reply::Ack)
    } else {
        None
    }
}

fn band(region: Region) -> u8 {
    match region {
        Region::AS923 => 0,
        Region::AU915 => 1,
        Region::CN470 => 2,
        Region::CN779 => 3,
        Region::EU433 => 4,
        Region::EU868 => 5,
        Region::KR920 => 6,
        Region::IN865 => 7,
        Region::US915 => 8,
    }
}

pub struct MkrWanModem<S> {
    serial: S,
    joined: bool,
    port: Option<u8>,
}

impl<S: Read + Write> MkrWanModem<S> {
    pub fn new(serial: S) -> Self {
        MkrWanModem {
            serial,
            joined: false,
            port: None,
        }
    }

    pub fn release(self) -> S {
        self.serial
    }

    fn write_command(&mut self, args: core::fmt::Arguments) -> Result<(), LoraError> {
        let mut line: String<LINE_LEN> = String::new();
        write!(line, "AT{}\r", args).map_err(|_| LoraError::PayloadTooLarge)?;
        trace!("> {}", line.as_str());
        self.serial
            .write_all(line.as_bytes())
            .map_err(|_| LoraError::Io)?;
        self.serial.flush().map_err(|_| LoraError::Io)
    }

    fn command(&mut self, args: core::fmt::Arguments) -> Result<(), LoraError> {
        self.write_command(args)?;
        self.expect_ok()
    }

    fn expect_ok(&mut self) -> Result<(), LoraError> {
        match self.wait_reply()? {
            Reply::Ok => Ok(()),
            Reply::Err(code) => Err(LoraError::Rejected(code)),
            _ => Err(LoraError::NotResponding),
        }
    }

    fn wait_reply(&mut self) -> Result<Reply, LoraError> {
        for _ in 0..MAX_LINES {
            let line = self.read_line()?;
            let text = core::str::from_utf8(&line).unwrap_or("");
            match parse_reply(text) {
                Some(reply) => {
                    trace!("< {}", text);
                    return Ok(reply);
                }
                None if text.trim().is_empty() => {}
                None => debug!("ignoring modem output: {}", text),
            }
        }
        Err(LoraError::NotResponding)
    }

    fn read_line(&mut self) -> Result<Vec<u8, LINE_LEN>, LoraError> {
        let mut line = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let n = self.serial.read(&mut byte).map_err(|_| LoraError::Io)?;
            if n == 0 {
                return Err(LoraError::Io);
            }
            match byte[0] {
                b'\r' | b'\n' => return Ok(line),
                // too long lines are cut, the prefix is all we look at
                b => {
                    let _ = line.push(b);
                }
            }
        }
    }
}

struct Hex<'a>(&'a [u8]);

impl core::fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for b in self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl<S: Read + Write> Modem for MkrWanModem<S> {
    fn begin(&mut self, region: Region) -> Result<(), LoraError> {
        self.joined = false;
        self.port = None;
        self.command(format_args!(""))?;
        match self.command(format_args!("+BAND={}", band(region))) {
            Err(LoraError::Rejected(code)) => {
                error!("modem refused band {:?}: {}", region, code);
                Err(LoraError::UnsupportedRegion)
            }
            other => other,
        }
    }

    fn join_otaa(&mut self, credentials: &Credentials) -> Result<(), LoraError> {
        self.command(format_args!("+MODE=1"))?;
        self.command(format_args!("+APPEUI={}", Hex(&credentials.app_eui.0)))?;
        self.command(format_args!("+AK={}", Hex(&credentials.app_key.0)))?;
        self.command(format_args!("+DEUI={}", Hex(&credentials.dev_eui.0)))?;
        self.command(format_args!("+JOIN"))?;
        for _ in 0..MAX_REPLIES {
            match self.wait_reply()? {
                Reply::Event(1, 1) => {
                    self.joined = true;
                    return Ok(());
                }
                Reply::Event(1, _) => return Err(LoraError::JoinFailed),
                Reply::Err(code) => return Err(LoraError::Rejected(code)),
                reply => debug!("waiting for join, got {:?}", reply),
            }
        }
        Err(LoraError::NotResponding)
    }

    fn send(&mut self, port: u8, data: &[u8], confirmed: bool) -> Result<(), LoraError> {
        if !self.joined {
            return Err(LoraError::NotJoined);
        }
        if data.len() > MAX_PAYLOAD {
            return Err(LoraError::PayloadTooLarge);
        }
        if self.port != Some(port) {
            self.command(format_args!("+PORT={}", port))?;
            self.port = Some(port);
        }
        if confirmed {
            self.write_command(format_args!("+CTX {}", data.len()))?;
        } else {
            self.write_command(format_args!("+UTX {}", data.len()))?;
        }
        self.serial.write_all(data).map_err(|_| LoraError::Io)?;
        self.serial.flush().map_err(|_| LoraError::Io)?;
        self.expect_ok()?;
        if !confirmed {
            return Ok(());
        }
        for _ in 0..MAX_REPLIES {
            match self.wait_reply()? {
                Reply::Ack => return Ok(()),
                Reply::NoAck => return Err(LoraError::NoAck),
                Reply::Err(code) => return Err(LoraError::Rejected(code)),
                reply => debug!("waiting for acknowledgement, got {:?}", reply),
            }
        }
        Err(LoraError::NotResponding)
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::vec::Vec;

    use embedded_io::{ErrorType, Read, Write};

    use crate::lorawan::{Credentials, LoraError, Modem, Region};
    use crate::mkrwan::{parse_reply, MkrWanModem, Reply};

    /// Serial line with the modem's answers queued up front.
    struct FakeSerial {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl FakeSerial {
        fn answering(lines: &[&str]) -> Self {
            let mut rx = VecDeque::new();
            for line in lines {
                rx.extend(line.bytes());
                rx.extend(b"\r\n");
            }
            FakeSerial { rx, tx: Vec::new() }
        }

        fn sent(&self) -> std::string::String {
            std::string::String::from_utf8_lossy(&self.tx).into_owned()
        }
    }

    impl ErrorType for FakeSerial {
        type Error = Infallible;
    }

    impl Read for FakeSerial {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
            let mut n = 0;
            while n < buf.len() {
                match self.rx.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl Write for FakeSerial {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    fn credentials() -> Credentials {
        Credentials::from_hex(
            "A8610A32332C9203",
            "1234567890000000",
            "87C35A509FF383F53757E019092655E0",
        )
        .unwrap()
    }

    #[test]
    fn replies() {
        assert_eq!(parse_reply("+OK"), Some(Reply::Ok));
        assert_eq!(parse_reply("+OK=1.2.1"), Some(Reply::Ok));
        assert_eq!(parse_reply("+ERR=-3"), Some(Reply::Err(-3)));
        assert_eq!(parse_reply("+ERR"), Some(Reply::Err(-1)));
        assert_eq!(parse_reply("+EVENT=1,1"), Some(Reply::Event(1, 1)));
        assert_eq!(parse_reply("+ACK"), Some(Reply::Ack));
        assert_eq!(parse_reply("+NOACK"), Some(Reply::NoAck));
        assert_eq!(parse_reply("ABZ firmware"), None);
    }

    #[test]
    fn begin_and_join() {
        let serial = FakeSerial::answering(&[
            "+OK", "+OK", "+OK", "+OK", "+OK", "+OK", "+OK", "", "+EVENT=0,0", "+EVENT=1,1",
        ]);
        let mut modem = MkrWanModem::new(serial);
        modem.begin(Region::EU868).unwrap();
        modem.join_otaa(&credentials()).unwrap();
        assert_eq!(
            modem.release().sent(),
            "AT\rAT+BAND=5\rAT+MODE=1\rAT+APPEUI=1234567890000000\r\
             AT+AK=87C35A509FF383F53757E019092655E0\rAT+DEUI=A8610A32332C9203\rAT+JOIN\r"
        );
    }

    #[test]
    fn join_refused() {
        let serial = FakeSerial::answering(&["+OK", "+OK", "+OK", "+OK", "+OK", "+EVENT=1,0"]);
        let mut modem = MkrWanModem::new(serial);
        assert_eq!(modem.join_otaa(&credentials()), Err(LoraError::JoinFailed));
        assert_eq!(modem.send(1, &[1], false), Err(LoraError::NotJoined));
    }

    #[test]
    fn confirmed_uplink() {
        let serial = FakeSerial::answering(&[
            "+OK", "+OK", "+OK", "+OK", "+OK", "+EVENT=1,1", "+OK", "+OK", "+ACK", "+OK", "+NOACK",
        ]);
        let mut modem = MkrWanModem::new(serial);
        modem.join_otaa(&credentials()).unwrap();
        assert_eq!(modem.send(3, &[0xca, 0xfe], true), Ok(()));
        assert_eq!(modem.send(3, &[0xca, 0xfe], true), Err(LoraError::NoAck));
        let tx = modem.release().tx;
        let uplink = b"AT+JOIN\rAT+PORT=3\rAT+CTX 2\r\xca\xfeAT+CTX 2\r\xca\xfe";
        assert!(tx.ends_with(uplink));
    }

    #[test]
    fn unconfirmed_uplink_does_not_wait_for_ack() {
        let serial = FakeSerial::answering(&[
            "+OK", "+OK", "+OK", "+OK", "+OK", "+EVENT=1,1", "+OK", "+OK", "+OK",
        ]);
        let mut modem = MkrWanModem::new(serial);
        modem.join_otaa(&credentials()).unwrap();
        assert_eq!(modem.send(2, &[0x01, 0x02, 0x03], false), Ok(()));
        assert_eq!(modem.send(2, &[0x04], false), Ok(()));
        // all answers are used up, waiting for an acknowledgement would have failed
        let serial = modem.release();
        let uplink = b"AT+JOIN\rAT+PORT=2\rAT+UTX 3\r\x01\x02\x03AT+UTX 1\r\x04";
        assert!(serial.tx.ends_with(uplink));
    }

    #[test]
    fn modem_error_code() {
        let serial = FakeSerial::answering(&["+ERR=-2"]);
        let mut modem = MkrWanModem::new(serial);
        assert_eq!(modem.begin(Region::US915), Err(LoraError::Rejected(-2)));
    }

    #[test]
    fn refused_band() {
        let serial = FakeSerial::answering(&["+OK", "+ERR=-3"]);
        let mut modem = MkrWanModem::new(serial);
        assert_eq!(modem.begin(Region::CN779), Err(LoraError::UnsupportedRegion));
        assert_eq!(modem.release().sent(), "AT\rAT+BAND=3\r");
    }

    #[test]
    fn chatty_modem_gives_up_waiting_for_events() {
        let mut join = vec!["+OK"; 5];
        join.extend(vec!["+OK"; 40]);
        let mut modem = MkrWanModem::new(FakeSerial::answering(&join));
        assert_eq!(modem.join_otaa(&credentials()), Err(LoraError::NotResponding));

        let mut uplink = vec!["+OK", "+OK", "+OK", "+OK", "+OK", "+EVENT=1,1", "+OK", "+OK"];
        uplink.extend(vec!["+OK"; 40]);
        let mut modem = MkrWanModem::new(FakeSerial::answering(&uplink));
        modem.join_otaa(&credentials()).unwrap();
        assert_eq!(modem.send(1, &[0xff], true), Err(LoraError::NotResponding));
    }

    #[test]
    fn silent_modem() {
        let mut modem = MkrWanModem::new(FakeSerial::answering(&[]));
        assert_eq!(modem.begin(Region::EU868), Err(LoraError::Io));
    }
}
