//! Response Reader: accumulate transport bytes until a terminal marker.
//!
//! Text responses end at the first `ERROR` or `OK` substring; `ERROR` is
//! checked first so an error short-circuits even if more bytes would follow.
//! Binary responses are read byte-exact through a carry-over buffer, so a
//! payload that happens to contain `OK` never terminates the read early.

use std::time::{Duration, Instant};

use crate::domain::SbdResult;
use crate::ports::SerialConnection;

use super::RawResponse;

pub const OK_MARKER: &[u8] = b"OK";
pub const ERROR_MARKER: &[u8] = b"ERROR";
/// Prompt the modem sends before accepting binary message bytes
pub const READY_MARKER: &[u8] = b"READY";

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Polls a `SerialConnection` with a fixed delay between empty reads.
pub struct ResponseReader {
    poll_interval: Duration,
    carry: Vec<u8>,
}

impl ResponseReader {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            carry: Vec::new(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Forget any bytes left over from a previous read.
    pub fn clear(&mut self) {
        self.carry.clear();
    }

    /// Read until `OK`, `ERROR` or `deadline`.
    pub fn read_response(
        &mut self,
        conn: &mut dyn SerialConnection,
        deadline: Instant,
    ) -> SbdResult<RawResponse> {
        self.read_until(conn, deadline, OK_MARKER)
    }

    /// Read until `success`, `ERROR` or `deadline`. Every exit yields a
    /// tagged response; partial text on timeout is logged, not returned.
    pub fn read_until(
        &mut self,
        conn: &mut dyn SerialConnection,
        deadline: Instant,
        success: &[u8],
    ) -> SbdResult<RawResponse> {
        let mut buf = std::mem::take(&mut self.carry);

        loop {
            if contains(&buf, ERROR_MARKER) {
                return Ok(RawResponse::ErrorCode(
                    String::from_utf8_lossy(&buf).into_owned(),
                ));
            }
            if contains(&buf, success) {
                return Ok(RawResponse::Ok(String::from_utf8_lossy(&buf).into_owned()));
            }

            let now = Instant::now();
            if now >= deadline {
                if !buf.is_empty() {
                    log::debug!(
                        "AT RX (incomplete): {:?}",
                        String::from_utf8_lossy(&buf)
                    );
                }
                return Ok(RawResponse::TimedOut);
            }

            let chunk = conn.read_available(deadline)?;
            if chunk.is_empty() {
                std::thread::sleep(self.poll_interval.min(deadline - now));
            } else {
                buf.extend_from_slice(&chunk);
            }
        }
    }

    /// Ensure at least `n` bytes are buffered. Returns false on deadline.
    fn fill(
        &mut self,
        conn: &mut dyn SerialConnection,
        n: usize,
        deadline: Instant,
    ) -> SbdResult<bool> {
        while self.carry.len() < n {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let chunk = conn.read_available(deadline)?;
            if chunk.is_empty() {
                std::thread::sleep(self.poll_interval.min(deadline - now));
            } else {
                self.carry.extend_from_slice(&chunk);
            }
        }
        Ok(true)
    }

    /// Read exactly `n` bytes, or `None` if the deadline passes first.
    /// Bytes beyond `n` stay buffered for the next read.
    pub fn read_exact(
        &mut self,
        conn: &mut dyn SerialConnection,
        n: usize,
        deadline: Instant,
    ) -> SbdResult<Option<Vec<u8>>> {
        if !self.fill(conn, n, deadline)? {
            return Ok(None);
        }
        Ok(Some(self.carry.drain(..n).collect()))
    }

    /// Consume an echoed command line (`<echo>\r`, optionally `\n`) if the
    /// buffered input starts with one. Returns false on deadline.
    pub fn skip_echo(
        &mut self,
        conn: &mut dyn SerialConnection,
        echo: &str,
        deadline: Instant,
    ) -> SbdResult<bool> {
        let Some(&first) = echo.as_bytes().first() else {
            return Ok(true);
        };
        if !self.fill(conn, 1, deadline)? {
            return Ok(false);
        }
        if self.carry[0] != first {
            return Ok(true);
        }
        loop {
            if let Some(pos) = self.carry.iter().position(|&b| b == b'\r') {
                self.carry.drain(..=pos);
                break;
            }
            let want = self.carry.len() + 1;
            if !self.fill(conn, want, deadline)? {
                return Ok(false);
            }
        }
        if !self.fill(conn, 1, deadline)? {
            return Ok(false);
        }
        if self.carry[0] == b'\n' {
            self.carry.remove(0);
        }
        Ok(true)
    }
}
