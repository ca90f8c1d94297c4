//! Binary Transfer Codec: checksum-framed message transfer.
//!
//! Write (`AT+SBDWB=<len>`): wait for `READY`, send the payload followed by
//! the 16-bit checksum MSB first, then read a numeric status:
//! 0 success, 1 not enough bytes within 60 s, 2 checksum mismatch,
//! 3 length out of bounds.
//!
//! Read (`AT+SBDRB`): the modem answers with a 2-byte big-endian length,
//! the payload and the 2-byte checksum, then `OK`. These bytes are read
//! byte-exact; binary data may contain anything, including `OK`.

use std::time::{Duration, Instant};

use crate::domain::{SbdError, SbdResult, TransferError, MAX_BINARY_PAYLOAD};

use super::channel::expect_ok;
use super::decode::parse_status_code;
use super::reader::READY_MARKER;
use super::{AtChannel, AtCommand, RawResponse};

pub const CHECKSUM_LEN: usize = 2;
pub const LENGTH_PREFIX_LEN: usize = 2;

/// How long the modem may take to report the status of a binary write
const WRITE_STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Sum of all payload bytes, truncated to 16 bits.
pub fn checksum(payload: &[u8]) -> u16 {
    payload
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

/// A payload validated against the modem's transfer limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFrame {
    payload: Vec<u8>,
}

impl BinaryFrame {
    pub fn new(payload: &[u8]) -> Result<Self, TransferError> {
        if payload.len() > MAX_BINARY_PAYLOAD {
            return Err(TransferError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_BINARY_PAYLOAD,
            });
        }
        if payload.is_empty() {
            return Err(TransferError::LengthOutOfBounds(0));
        }
        Ok(Self {
            payload: payload.to_vec(),
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn checksum(&self) -> u16 {
        checksum(&self.payload)
    }

    /// Bytes sent after the `READY` prompt: payload then checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + CHECKSUM_LEN);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.checksum().to_be_bytes());
        out
    }

    /// Length-prefixed form, as the modem returns it for a binary read.
    pub fn encode_prefixed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LENGTH_PREFIX_LEN + self.payload.len() + CHECKSUM_LEN);
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend(self.encode());
        out
    }

    /// Parse and verify a length-prefixed frame.
    pub fn decode_prefixed(bytes: &[u8]) -> Result<Vec<u8>, TransferError> {
        if bytes.len() < LENGTH_PREFIX_LEN + CHECKSUM_LEN {
            return Err(TransferError::LengthOutOfBounds(bytes.len()));
        }
        let len = usize::from(u16::from_be_bytes([bytes[0], bytes[1]]));
        if len > MAX_BINARY_PAYLOAD || bytes.len() != LENGTH_PREFIX_LEN + len + CHECKSUM_LEN {
            return Err(TransferError::LengthOutOfBounds(len));
        }
        let body = &bytes[LENGTH_PREFIX_LEN..];
        let (payload, trailer) = body.split_at(len);
        verify(payload, trailer)?;
        Ok(payload.to_vec())
    }
}

/// Check a received payload against its 2-byte big-endian checksum trailer.
pub fn verify(payload: &[u8], trailer: &[u8]) -> Result<(), TransferError> {
    let [hi, lo] = trailer else {
        return Err(TransferError::LengthOutOfBounds(trailer.len()));
    };
    let expected = u16::from_be_bytes([*hi, *lo]);
    let computed = checksum(payload);
    if expected != computed {
        log::warn!("binary checksum mismatch: expected {expected:#06x}, computed {computed:#06x}");
        return Err(TransferError::ChecksumMismatch);
    }
    Ok(())
}

/// Map the final status of a binary write onto the error taxonomy.
pub fn write_status(code: u32) -> Result<(), TransferError> {
    match code {
        0 => Ok(()),
        1 => Err(TransferError::InsufficientBytes),
        2 => Err(TransferError::ChecksumMismatch),
        3 => Err(TransferError::LengthOutOfBounds(0)),
        other => Err(TransferError::UnknownStatus(other)),
    }
}

/// Load a binary message into the MO buffer.
///
/// The payload is validated before any byte is sent. Failures are never
/// retried here.
pub fn write_binary(channel: &mut AtChannel, payload: &[u8]) -> SbdResult<()> {
    let frame = BinaryFrame::new(payload)?;
    let cmd = AtCommand::WriteBinary(frame.len());
    let timeout = channel.timeout_for(&cmd);

    let prompt = channel.dispatch_until(&cmd, timeout, READY_MARKER)?;
    expect_ok(prompt, &cmd, timeout)?;

    channel.write_raw(&frame.encode())?;
    log::debug!(
        "AT TX: {} binary bytes, checksum {:#06x}",
        frame.len(),
        frame.checksum()
    );

    let raw = channel.read_response(WRITE_STATUS_TIMEOUT)?;
    let raw = expect_ok(raw, &cmd, WRITE_STATUS_TIMEOUT)?;
    let code = parse_status_code(&raw, "")?;
    match write_status(code) {
        // The modem knows the real length; report it
        Err(TransferError::LengthOutOfBounds(_)) => {
            Err(TransferError::LengthOutOfBounds(frame.len()).into())
        }
        other => other.map_err(SbdError::from),
    }
}

/// Read the MT buffer as binary. An empty buffer yields an empty payload.
pub fn read_binary(channel: &mut AtChannel) -> SbdResult<Vec<u8>> {
    let cmd = AtCommand::ReadBinary;
    let timeout = channel.timeout_for(&cmd);
    let deadline = Instant::now() + timeout;
    let wire = channel.send(&cmd)?;

    let timed_out = || SbdError::TimedOut {
        command: wire.clone(),
        timeout_ms: timeout.as_millis() as u64,
    };

    if !channel.skip_echo(&wire, deadline)? {
        return Err(timed_out());
    }
    let prefix = channel
        .read_exact(LENGTH_PREFIX_LEN, deadline)?
        .ok_or_else(timed_out)?;
    let len = usize::from(u16::from_be_bytes([prefix[0], prefix[1]]));

    if len > MAX_BINARY_PAYLOAD {
        // Not a length prefix: the modem answered with text
        let rest = channel.read_response(deadline.saturating_duration_since(Instant::now()))?;
        if let RawResponse::ErrorCode(response) = rest {
            return Err(SbdError::ModemError {
                command: wire.clone(),
                response: response.trim().to_string(),
            });
        }
        return Err(TransferError::LengthOutOfBounds(len).into());
    }

    let body = channel
        .read_exact(len + CHECKSUM_LEN, deadline)?
        .ok_or_else(timed_out)?;
    let (payload, trailer) = body.split_at(len);
    verify(payload, trailer)?;

    let tail = channel.read_response(deadline.saturating_duration_since(Instant::now()))?;
    expect_ok(tail, &cmd, timeout)?;

    log::debug!("AT RX: {len} binary bytes");
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_truncated_sum() {
        assert_eq!(checksum(b"hello"), 0x0214);
        assert_eq!(checksum(&[0xFF; 300]), (0xFFu32 * 300 % 0x1_0000) as u16);
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn encode_appends_checksum_msb_first() {
        let frame = BinaryFrame::new(b"hello").unwrap();
        assert_eq!(frame.encode(), b"hello\x02\x14".to_vec());
    }

    #[test]
    fn prefixed_frame_round_trip() {
        for len in [1usize, 17, MAX_BINARY_PAYLOAD] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let frame = BinaryFrame::new(&payload).unwrap();
            let wire = frame.encode_prefixed();
            assert_eq!(wire.len(), len + 4);
            assert_eq!(BinaryFrame::decode_prefixed(&wire).unwrap(), payload);
        }
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_BINARY_PAYLOAD + 1];
        assert_eq!(
            BinaryFrame::new(&payload),
            Err(TransferError::PayloadTooLarge {
                len: 341,
                max: MAX_BINARY_PAYLOAD
            })
        );
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert_eq!(BinaryFrame::new(&[]), Err(TransferError::LengthOutOfBounds(0)));
    }

    #[test]
    fn corrupted_frame_fails_checksum() {
        let mut wire = BinaryFrame::new(b"telemetry").unwrap().encode_prefixed();
        wire[4] ^= 0x01;
        assert_eq!(
            BinaryFrame::decode_prefixed(&wire),
            Err(TransferError::ChecksumMismatch)
        );
    }

    #[test]
    fn truncated_frame_is_out_of_bounds() {
        let wire = BinaryFrame::new(b"telemetry").unwrap().encode_prefixed();
        assert!(matches!(
            BinaryFrame::decode_prefixed(&wire[..wire.len() - 1]),
            Err(TransferError::LengthOutOfBounds(_))
        ));
    }

    #[test]
    fn write_status_codes() {
        assert_eq!(write_status(0), Ok(()));
        assert_eq!(write_status(1), Err(TransferError::InsufficientBytes));
        assert_eq!(write_status(2), Err(TransferError::ChecksumMismatch));
        assert!(matches!(write_status(3), Err(TransferError::LengthOutOfBounds(_))));
        assert_eq!(write_status(9), Err(TransferError::UnknownStatus(9)));
    }
}
