//! AtChannel: owns a serial connection and drives AT command I/O timing.
//!
//! Pure translation lives in `encode` / `decode`. AtChannel only handles I/O:
//! discard stale input, write the command line, read until a terminal marker
//! or the command's deadline.

use std::time::{Duration, Instant};

use crate::domain::{SbdError, SbdResult};
use crate::ports::SerialConnection;

use super::reader::OK_MARKER;
use super::{encode, AtCommand, RawResponse, ResponseReader, LINE_TERMINATOR};

/// Owns a serial connection and executes AT commands against the modem.
pub struct AtChannel {
    serial: Box<dyn SerialConnection>,
    reader: ResponseReader,
    min_timeout: Duration,
}

impl AtChannel {
    pub fn new(
        serial: Box<dyn SerialConnection>,
        poll_interval: Duration,
        min_timeout: Duration,
    ) -> Self {
        Self {
            serial,
            reader: ResponseReader::new(poll_interval),
            min_timeout,
        }
    }

    /// Effective timeout of a command: its default raised to the floor.
    pub fn timeout_for(&self, cmd: &AtCommand) -> Duration {
        cmd.timeout(self.min_timeout)
    }

    /// Send a command and read its response with the command's own timeout.
    pub fn dispatch(&mut self, cmd: &AtCommand) -> SbdResult<RawResponse> {
        let timeout = self.timeout_for(cmd);
        self.dispatch_until(cmd, timeout, OK_MARKER)
    }

    /// Send a command and read until `success`, `ERROR` or `timeout`.
    ///
    /// Unread input from earlier activity is discarded first so stray bytes
    /// cannot end up in this command's response. An echoed command line is
    /// consumed before the marker scan: text arguments may spell `OK` or
    /// `ERROR` themselves.
    pub fn dispatch_until(
        &mut self,
        cmd: &AtCommand,
        timeout: Duration,
        success: &[u8],
    ) -> SbdResult<RawResponse> {
        let wire = self.send(cmd)?;
        let deadline = Instant::now() + timeout;
        let raw = if self.reader.skip_echo(self.serial.as_mut(), &wire, deadline)? {
            self.reader
                .read_until(self.serial.as_mut(), deadline, success)?
        } else {
            RawResponse::TimedOut
        };

        match &raw {
            RawResponse::Ok(text) => log::debug!("AT RX: {text:?}"),
            RawResponse::ErrorCode(text) => log::debug!("AT RX ({wire} ERROR): {text:?}"),
            RawResponse::TimedOut => {
                log::debug!("AT RX: '{wire}' timed out after {} ms", timeout.as_millis())
            }
        }
        Ok(raw)
    }

    /// Flush stale input and write the command line. Returns the command text.
    pub fn send(&mut self, cmd: &AtCommand) -> SbdResult<String> {
        let wire = encode(cmd);
        log::debug!("AT TX: {wire}");

        self.serial.flush_input()?;
        self.reader.clear();
        self.serial
            .write(format!("{wire}{LINE_TERMINATOR}").as_bytes())?;
        Ok(wire)
    }

    /// Dispatch and require an `OK` response, returning it for parsing.
    pub fn request(&mut self, cmd: &AtCommand) -> SbdResult<RawResponse> {
        let raw = self.dispatch(cmd)?;
        expect_ok(raw, cmd, self.timeout_for(cmd))
    }

    /// Write raw bytes with no framing (binary message body).
    pub fn write_raw(&mut self, data: &[u8]) -> SbdResult<()> {
        self.serial.write(data)
    }

    /// Continue reading after `send`/`write_raw` without re-flushing.
    pub fn read_response(&mut self, timeout: Duration) -> SbdResult<RawResponse> {
        self.reader
            .read_response(self.serial.as_mut(), Instant::now() + timeout)
    }

    pub fn read_exact(&mut self, n: usize, deadline: Instant) -> SbdResult<Option<Vec<u8>>> {
        self.reader.read_exact(self.serial.as_mut(), n, deadline)
    }

    pub fn skip_echo(&mut self, echo: &str, deadline: Instant) -> SbdResult<bool> {
        self.reader.skip_echo(self.serial.as_mut(), echo, deadline)
    }

    pub fn is_connected(&self) -> bool {
        self.serial.is_connected()
    }

    pub fn close(&mut self) -> SbdResult<()> {
        self.serial.close()
    }
}

/// Map a non-`Ok` response onto the error taxonomy.
pub fn expect_ok(raw: RawResponse, cmd: &AtCommand, timeout: Duration) -> SbdResult<RawResponse> {
    match raw {
        RawResponse::Ok(_) => Ok(raw),
        RawResponse::ErrorCode(response) => Err(SbdError::ModemError {
            command: encode(cmd),
            response: response.trim().to_string(),
        }),
        RawResponse::TimedOut => Err(SbdError::TimedOut {
            command: encode(cmd),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClearSelector;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    // ---------------------------------------------------------------------------
    // MockSerial for AtChannel tests
    // ---------------------------------------------------------------------------

    struct MockSerial {
        log: Arc<Mutex<Vec<String>>>,
        flushes: Arc<Mutex<usize>>,
        response: Option<String>,
        pending: Vec<u8>,
    }

    impl SerialConnection for MockSerial {
        fn write(&mut self, data: &[u8]) -> SbdResult<()> {
            self.log
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(data).into());
            if let Some(resp) = &self.response {
                self.pending.extend_from_slice(resp.as_bytes());
            }
            Ok(())
        }
        fn read_available(&mut self, _deadline: Instant) -> SbdResult<Vec<u8>> {
            Ok(std::mem::take(&mut self.pending))
        }
        fn flush_input(&mut self) -> SbdResult<()> {
            *self.flushes.lock().unwrap() += 1;
            self.pending.clear();
            Ok(())
        }
        fn close(&mut self) -> SbdResult<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
    }

    struct Handles {
        log: Arc<Mutex<Vec<String>>>,
        flushes: Arc<Mutex<usize>>,
    }

    fn make_channel(response: Option<&str>, stale: &[u8]) -> (AtChannel, Handles) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let flushes = Arc::new(Mutex::new(0));
        let mock = MockSerial {
            log: Arc::clone(&log),
            flushes: Arc::clone(&flushes),
            response: response.map(str::to_string),
            pending: stale.to_vec(),
        };
        let channel = AtChannel::new(
            Box::new(mock),
            Duration::from_millis(5),
            Duration::from_millis(500),
        );
        (channel, Handles { log, flushes })
    }

    #[test]
    fn dispatch_writes_terminated_command() {
        let (mut channel, h) = make_channel(Some("+SBDS: 0, 1, 0, -1\r\n\r\nOK\r\n"), b"");
        channel.dispatch(&AtCommand::BufferStatus).unwrap();
        assert_eq!(h.log.lock().unwrap()[0], "AT+SBDS\r\n");
    }

    #[test]
    fn dispatch_flushes_stale_input_first() {
        // Stale "OK" from an earlier exchange must not satisfy this command
        let (mut channel, h) = make_channel(Some("0\r\n\r\nOK\r\n"), b"junk OK\r\n");
        let raw = channel
            .dispatch(&AtCommand::ClearBuffer(ClearSelector::Both))
            .unwrap();
        assert_eq!(*h.flushes.lock().unwrap(), 1);
        assert_eq!(raw, RawResponse::Ok("0\r\n\r\nOK\r\n".into()));
    }

    #[test]
    fn dispatch_reports_error_code() {
        let (mut channel, _) = make_channel(Some("\r\nERROR\r\n"), b"");
        let raw = channel.dispatch(&AtCommand::Imei).unwrap();
        assert!(matches!(raw, RawResponse::ErrorCode(_)));
    }

    #[test]
    fn dispatch_is_bounded_by_timeout_plus_poll() {
        let (mut channel, _) = make_channel(None, b"");
        let start = Instant::now();
        let raw = channel.dispatch(&AtCommand::BufferStatus).unwrap();
        assert_eq!(raw, RawResponse::TimedOut);
        // 1 s default timeout, 5 ms poll, generous scheduling slack
        assert!(start.elapsed() < Duration::from_millis(1_000 + 5 + 100));
    }

    #[test]
    fn request_maps_error_code_to_modem_error() {
        let (mut channel, _) = make_channel(Some("ERROR\r\n"), b"");
        let err = channel.request(&AtCommand::Model).unwrap_err();
        match err {
            SbdError::ModemError { command, response } => {
                assert_eq!(command, "AT+CGMM");
                assert_eq!(response, "ERROR");
            }
            other => panic!("expected ModemError, got {other:?}"),
        }
    }

    #[test]
    fn request_maps_silence_to_timed_out() {
        let (mut channel, _) = make_channel(None, b"");
        let err = channel.request(&AtCommand::LastSignalQuality).unwrap_err();
        assert!(matches!(err, SbdError::TimedOut { timeout_ms: 1_000, .. }));
    }

    #[test]
    fn floor_raises_short_timeouts() {
        let (channel, _) = make_channel(None, b"");
        assert_eq!(
            channel.timeout_for(&AtCommand::Initiate),
            Duration::from_secs(60)
        );
        let floor_channel = AtChannel::new(
            Box::new(MockSerial {
                log: Arc::new(Mutex::new(Vec::new())),
                flushes: Arc::new(Mutex::new(0)),
                response: None,
                pending: Vec::new(),
            }),
            Duration::from_millis(5),
            Duration::from_secs(3),
        );
        assert_eq!(
            floor_channel.timeout_for(&AtCommand::BufferStatus),
            Duration::from_secs(3)
        );
    }

    // ---------------------------------------------------------------------------
    // Echoed command lines
    // ---------------------------------------------------------------------------

    /// Echoes each command, then releases the reply one chunk per read.
    struct EchoingSerial {
        replies: VecDeque<Vec<u8>>,
        pending: VecDeque<Vec<u8>>,
    }

    impl SerialConnection for EchoingSerial {
        fn write(&mut self, data: &[u8]) -> SbdResult<()> {
            let line = String::from_utf8_lossy(data);
            self.pending
                .push_back(format!("{}\r", line.trim_end()).into_bytes());
            if let Some(reply) = self.replies.pop_front() {
                self.pending.push_back(reply);
            }
            Ok(())
        }
        fn read_available(&mut self, _deadline: Instant) -> SbdResult<Vec<u8>> {
            Ok(self.pending.pop_front().unwrap_or_default())
        }
        fn flush_input(&mut self) -> SbdResult<()> {
            self.pending.clear();
            Ok(())
        }
        fn close(&mut self) -> SbdResult<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
    }

    fn echoing_channel(replies: &[&[u8]]) -> AtChannel {
        let serial = EchoingSerial {
            replies: replies.iter().map(|r| r.to_vec()).collect(),
            pending: VecDeque::new(),
        };
        AtChannel::new(
            Box::new(serial),
            Duration::from_millis(5),
            Duration::from_millis(500),
        )
    }

    #[test]
    fn error_inside_echoed_text_is_not_a_modem_error() {
        let mut channel = echoing_channel(&[b"\r\nOK\r\n"]);
        let raw = channel
            .request(&AtCommand::WriteText("ERROR count 3".into()))
            .unwrap();
        assert_eq!(raw, RawResponse::Ok("\r\nOK\r\n".into()));
    }

    #[test]
    fn ok_inside_echoed_text_waits_for_the_reply() {
        // The echo arrives alone; only the reply that follows may end the read
        let mut channel = echoing_channel(&[b"\r\nERROR\r\n"]);
        let err = channel
            .request(&AtCommand::WriteText("BOOK club".into()))
            .unwrap_err();
        assert!(matches!(err, SbdError::ModemError { .. }));
    }

    #[test]
    fn echo_without_reply_times_out() {
        let mut channel = echoing_channel(&[]);
        let raw = channel.dispatch(&AtCommand::Model).unwrap();
        assert_eq!(raw, RawResponse::TimedOut);
    }
}
