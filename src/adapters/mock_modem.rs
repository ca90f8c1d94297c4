//! Mock SBD transceiver for development and testing without hardware.
//!
//! `MockModem` implements `SerialConnection` and answers AT commands the way
//! a 9602/9603 transceiver does: single-slot MO and MT buffers, sequence
//! numbers, ring alerts, the `READY` binary-write handshake and checksummed
//! binary reads. A `MockModemHandle` inspects and scripts the simulated
//! modem from the outside (queue gateway messages, force a failed clear,
//! go silent).
//!
//! Every command is logged at INFO level so you can verify exactly what the
//! driver would send to a real modem.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::at::binary::checksum;
use crate::domain::{SbdResult, MAX_BINARY_PAYLOAD};
use crate::ports::SerialConnection;

const MODEL: &str = "IRIDIUM 9600 Family SBD Transceiver";
const REVISION: &str = "Call Processor Version: TA16005";
const IMEI: &str = "300234010753370";

/// State of the simulated transceiver
#[derive(Debug)]
pub struct ModemSim {
    pub echo: bool,
    pub mo_buffer: Option<Vec<u8>>,
    pub mt_buffer: Option<Vec<u8>>,
    /// Sequence number of the next MO session
    pub momsn: u32,
    /// Sequence number of the message in the MT buffer
    pub mtmsn: Option<u32>,
    pub next_mtmsn: u32,
    /// Messages waiting at the gateway for this modem
    pub gateway_queue: VecDeque<Vec<u8>>,
    /// Messages delivered to the gateway by successful sessions
    pub delivered: Vec<Vec<u8>>,
    pub ring_alert: bool,
    pub ring_alerts_enabled: bool,
    pub session_timeout: u32,
    pub signal: u8,
    pub network_ticks: Option<u32>,
    /// Answer buffer clears with status 1
    pub fail_clear: bool,
    /// Sessions fail to reach the gateway
    pub fail_session: bool,
    /// Flip the checksum of binary reads
    pub corrupt_mt_checksum: bool,
    /// Never answer anything
    pub silent: bool,
    /// Command prefixes answered with `ERROR`
    pub reject: Vec<String>,
    /// Every command line received, in order
    pub commands: Vec<String>,
    line: Vec<u8>,
    after_cr: bool,
    binary_expected: Option<usize>,
    binary_buf: Vec<u8>,
    output: VecDeque<u8>,
}

impl Default for ModemSim {
    fn default() -> Self {
        Self {
            echo: true,
            mo_buffer: None,
            mt_buffer: None,
            momsn: 0,
            mtmsn: None,
            next_mtmsn: 1,
            gateway_queue: VecDeque::new(),
            delivered: Vec::new(),
            ring_alert: false,
            ring_alerts_enabled: true,
            session_timeout: 0,
            signal: 4,
            network_ticks: Some(0x1a2b_3c4d),
            fail_clear: false,
            fail_session: false,
            corrupt_mt_checksum: false,
            silent: false,
            reject: Vec::new(),
            commands: Vec::new(),
            line: Vec::new(),
            after_cr: false,
            binary_expected: None,
            binary_buf: Vec::new(),
            output: VecDeque::new(),
        }
    }
}

fn flag(b: bool) -> u8 {
    u8::from(b)
}

impl ModemSim {
    fn reply(&mut self, text: &str) {
        self.output.extend(text.as_bytes());
    }

    fn reply_ok(&mut self, body: &str) {
        let text = format!("\r\n{body}\r\n\r\nOK\r\n");
        self.reply(&text);
    }

    fn ok(&mut self) {
        self.reply("\r\nOK\r\n");
    }

    fn error(&mut self) {
        self.reply("\r\nERROR\r\n");
    }

    fn receive(&mut self, data: &[u8]) {
        for &byte in data {
            // LF of the CR LF that ended the previous command line
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                continue;
            }
            if let Some(expected) = self.binary_expected {
                self.binary_buf.push(byte);
                if self.binary_buf.len() == expected + 2 {
                    self.finish_binary_write(expected);
                }
                continue;
            }
            if byte == b'\r' {
                self.after_cr = true;
                let line = std::mem::take(&mut self.line);
                let line = String::from_utf8_lossy(&line).into_owned();
                if !line.is_empty() {
                    self.execute(&line);
                }
            } else {
                self.line.push(byte);
            }
        }
    }

    fn finish_binary_write(&mut self, len: usize) {
        self.binary_expected = None;
        let frame = std::mem::take(&mut self.binary_buf);
        let (payload, trailer) = frame.split_at(len);
        let received = u16::from_be_bytes([trailer[0], trailer[1]]);
        if received == checksum(payload) {
            log::info!("[MOCK MODEM] binary MO message loaded ({len} bytes)");
            self.mo_buffer = Some(payload.to_vec());
            self.reply_ok("0");
        } else {
            log::info!("[MOCK MODEM] binary MO checksum mismatch");
            self.reply_ok("2");
        }
    }

    fn execute(&mut self, line: &str) {
        log::info!("[MOCK MODEM] {line}");
        self.commands.push(line.to_string());
        if self.echo {
            let echoed = format!("{line}\r");
            self.reply(&echoed);
        }
        if self.reject.iter().any(|prefix| line.starts_with(prefix.as_str())) {
            self.error();
            return;
        }

        match line {
            "AT" | "AT*F" | "ATZ0" | "ATZ1" => self.ok(),
            "ATE0" => {
                self.echo = false;
                self.ok();
            }
            "ATE1" => {
                self.echo = true;
                self.ok();
            }
            "AT+SBDS" => {
                let body = format!(
                    "+SBDS: {}, {}, {}, {}",
                    flag(self.mo_buffer.is_some()),
                    self.momsn,
                    flag(self.mt_buffer.is_some()),
                    self.mt_sequence()
                );
                self.reply_ok(&body);
            }
            "AT+SBDSX" => {
                let body = format!(
                    "+SBDSX: {}, {}, {}, {}, {}, {}",
                    flag(self.mo_buffer.is_some()),
                    self.momsn,
                    flag(self.mt_buffer.is_some()),
                    self.mt_sequence(),
                    flag(self.ring_alert),
                    self.gateway_queue.len()
                );
                self.reply_ok(&body);
            }
            "AT+CSQ" | "AT+CSQF" => {
                let body = format!("{}:{}", &line[2..], self.signal);
                self.reply_ok(&body);
            }
            "AT-MSSTM" => {
                let body = match self.network_ticks {
                    Some(ticks) => format!("-MSSTM: {ticks:08x}"),
                    None => "-MSSTM: no network service".to_string(),
                };
                self.reply_ok(&body);
            }
            "AT-MSGEO" => self.reply_ok("-MSGEO: -2342,5184,2250,1a2b3c4d"),
            "AT+CGMM" => self.reply_ok(MODEL),
            "AT+CGMR" => self.reply_ok(REVISION),
            "AT+CGSN" => self.reply_ok(IMEI),
            "AT+SBDMTA?" => {
                let body = format!("+SBDMTA:{}", flag(self.ring_alerts_enabled));
                self.reply_ok(&body);
            }
            "AT+SBDST?" => {
                let body = format!("+SBDST:{}", self.session_timeout);
                self.reply_ok(&body);
            }
            "AT+SBDRT" => {
                let text = self
                    .mt_buffer
                    .as_deref()
                    .map(|m| String::from_utf8_lossy(m).into_owned())
                    .unwrap_or_default();
                let body = format!("+SBDRT:\r\n{text}");
                self.reply_ok(&body);
            }
            "AT+SBDRB" => self.read_binary(),
            "AT+SBDD0" | "AT+SBDD1" | "AT+SBDD2" => self.clear(line),
            "AT+SBDI" => {
                let body = self.session("SBDI");
                self.reply_ok(&body);
            }
            "AT+SBDTC" => {
                let size = self.mo_buffer.as_ref().map_or(0, Vec::len);
                self.mt_buffer = self.mo_buffer.clone();
                let body = format!("SBDTC: Outbound SBD Copied to Inbound SBD: size = {size}");
                self.reply_ok(&body);
            }
            _ => self.execute_with_argument(line),
        }
    }

    fn execute_with_argument(&mut self, line: &str) {
        if let Some(arg) = line.strip_prefix("AT+SBDWT=") {
            self.mo_buffer = Some(arg.as_bytes().to_vec());
            self.ok();
        } else if let Some(arg) = line.strip_prefix("AT+SBDWB=") {
            match arg.parse::<usize>() {
                Ok(len) if (1..=MAX_BINARY_PAYLOAD).contains(&len) => {
                    self.binary_expected = Some(len);
                    self.binary_buf.clear();
                    self.reply("READY\r\n");
                }
                Ok(_) => self.reply_ok("3"),
                Err(_) => self.error(),
            }
        } else if let Some(arg) = line.strip_prefix("AT+SBDMTA=") {
            match arg {
                "0" | "1" => {
                    self.ring_alerts_enabled = arg == "1";
                    self.ok();
                }
                _ => self.error(),
            }
        } else if let Some(arg) = line.strip_prefix("AT+SBDST=") {
            match arg.parse() {
                Ok(secs) => {
                    self.session_timeout = secs;
                    self.ok();
                }
                Err(_) => self.error(),
            }
        } else if line.starts_with("AT+SBDIX") {
            let body = self.session("SBDIX");
            self.reply_ok(&body);
        } else if line.starts_with("AT+SBDREG") {
            self.reply_ok("+SBDREG:2,0");
        } else {
            self.error();
        }
    }

    fn mt_sequence(&self) -> i64 {
        match (self.mt_buffer.is_some(), self.mtmsn) {
            (true, Some(seq)) => i64::from(seq),
            _ => -1,
        }
    }

    fn clear(&mut self, line: &str) {
        if self.fail_clear {
            self.reply_ok("1");
            return;
        }
        match line {
            "AT+SBDD0" => self.mo_buffer = None,
            "AT+SBDD1" => self.mt_buffer = None,
            _ => {
                self.mo_buffer = None;
                self.mt_buffer = None;
            }
        }
        self.reply_ok("0");
    }

    fn read_binary(&mut self) {
        let payload = self.mt_buffer.clone().unwrap_or_default();
        let mut sum = checksum(&payload);
        if self.corrupt_mt_checksum {
            sum ^= 0xFFFF;
        }
        let mut out = (payload.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(&payload);
        out.extend_from_slice(&sum.to_be_bytes());
        self.output.extend(out);
        self.reply("\r\nOK\r\n");
    }

    fn session(&mut self, label: &str) -> String {
        self.ring_alert = false;
        if self.fail_session {
            let status = if self.mo_buffer.is_some() { 32 } else { 0 };
            return format!(
                "+{label}: {status}, {}, 2, -1, 0, {}",
                self.momsn,
                self.gateway_queue.len()
            );
        }

        let mo_sequence = self.momsn;
        let mo_status = match &self.mo_buffer {
            Some(msg) => {
                self.delivered.push(msg.clone());
                self.momsn += 1;
                1
            }
            None => 0,
        };

        let (mt_status, mt_sequence, mt_length) = match self.gateway_queue.pop_front() {
            Some(msg) => {
                let seq = self.next_mtmsn;
                self.next_mtmsn += 1;
                let len = msg.len();
                self.mt_buffer = Some(msg);
                self.mtmsn = Some(seq);
                (1, i64::from(seq), len)
            }
            None => (0, -1, 0),
        };

        format!(
            "+{label}: {mo_status}, {mo_sequence}, {mt_status}, {mt_sequence}, {mt_length}, {}",
            self.gateway_queue.len()
        )
    }
}

/// Simulated modem behind the `SerialConnection` trait
pub struct MockModem {
    sim: Arc<Mutex<ModemSim>>,
    connected: bool,
}

/// Shared view of a `MockModem` for scripting and inspection
#[derive(Clone)]
pub struct MockModemHandle {
    sim: Arc<Mutex<ModemSim>>,
}

fn lock(sim: &Mutex<ModemSim>) -> MutexGuard<'_, ModemSim> {
    sim.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockModem {
    pub fn new() -> Self {
        log::info!("[MOCK MODEM] Initialized, IMEI {IMEI}");
        Self {
            sim: Arc::new(Mutex::new(ModemSim::default())),
            connected: true,
        }
    }

    pub fn handle(&self) -> MockModemHandle {
        MockModemHandle {
            sim: Arc::clone(&self.sim),
        }
    }
}

impl Default for MockModem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockModemHandle {
    /// Run `f` against the simulated modem state.
    pub fn with<T>(&self, f: impl FnOnce(&mut ModemSim) -> T) -> T {
        f(&mut lock(&self.sim))
    }

    /// Put a message at the gateway and raise a ring alert for it.
    pub fn queue_mt(&self, message: &[u8]) {
        self.with(|sim| {
            sim.gateway_queue.push_back(message.to_vec());
            if sim.ring_alerts_enabled {
                sim.ring_alert = true;
            }
        });
    }

    pub fn commands(&self) -> Vec<String> {
        self.with(|sim| sim.commands.clone())
    }

    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.with(|sim| sim.delivered.clone())
    }
}

impl SerialConnection for MockModem {
    fn write(&mut self, data: &[u8]) -> SbdResult<()> {
        let mut sim = lock(&self.sim);
        if !sim.silent {
            sim.receive(data);
        }
        Ok(())
    }

    fn read_available(&mut self, _deadline: Instant) -> SbdResult<Vec<u8>> {
        let mut sim = lock(&self.sim);
        Ok(sim.output.drain(..).collect())
    }

    fn flush_input(&mut self) -> SbdResult<()> {
        lock(&self.sim).output.clear();
        Ok(())
    }

    fn close(&mut self) -> SbdResult<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn exchange(modem: &mut MockModem, line: &str) -> String {
        modem.write(format!("{line}\r\n").as_bytes()).unwrap();
        let out = modem
            .read_available(Instant::now() + Duration::from_millis(10))
            .unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn echoes_and_answers_status() {
        let mut modem = MockModem::new();
        let out = exchange(&mut modem, "AT+SBDS");
        assert!(out.starts_with("AT+SBDS\r"), "{out:?}");
        assert!(out.contains("+SBDS: 0, 0, 0, -1"), "{out:?}");
        assert!(out.ends_with("OK\r\n"));
    }

    #[test]
    fn unknown_command_is_an_error() {
        let mut modem = MockModem::new();
        assert!(exchange(&mut modem, "AT+BOGUS").contains("ERROR"));
    }

    #[test]
    fn text_write_then_clear() {
        let mut modem = MockModem::new();
        let handle = modem.handle();
        exchange(&mut modem, "AT+SBDWT=hi");
        assert_eq!(handle.with(|s| s.mo_buffer.clone()), Some(b"hi".to_vec()));
        assert!(exchange(&mut modem, "AT+SBDD0").contains("\r\n0\r\n"));
        assert_eq!(handle.with(|s| s.mo_buffer.clone()), None);
    }

    #[test]
    fn session_moves_gateway_message_into_mt_buffer() {
        let mut modem = MockModem::new();
        let handle = modem.handle();
        handle.queue_mt(b"uplink cmd");
        exchange(&mut modem, "AT+SBDWT=report");
        let out = exchange(&mut modem, "AT+SBDIX");
        assert!(out.contains("+SBDIX: 1, 0, 1, 1, 10, 0"), "{out:?}");
        assert_eq!(handle.delivered(), vec![b"report".to_vec()]);
        assert_eq!(handle.with(|s| s.mt_buffer.clone()), Some(b"uplink cmd".to_vec()));
        assert!(!handle.with(|s| s.ring_alert));
    }

    #[test]
    fn silent_modem_never_answers() {
        let mut modem = MockModem::new();
        modem.handle().with(|s| s.silent = true);
        assert!(exchange(&mut modem, "AT").is_empty());
    }
}
