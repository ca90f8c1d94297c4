//! Pure decoding: RawResponse + label → typed values.
//!
//! No I/O, no side effects. Every parser requires an `Ok` response and a
//! present label; a missing label is an error, never a default.

use std::str::FromStr;

use crate::domain::{
    BufferState, Geolocation, MoStatus, MtStatus, NetworkTime, ParseError, Registration,
    RegistrationStatus, SessionResult, SignalQuality,
};

use super::RawResponse;

/// Status marker that closes a successful response
const OK_MARKER: &str = "OK";

/// One comma-separated token of a response payload, already trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a>(pub &'a str);

impl<'a> Field<'a> {
    pub fn as_str(&self) -> &'a str {
        self.0
    }

    pub fn parse<T: FromStr>(&self) -> Result<T, ParseError> {
        self.0.parse::<T>().map_err(|_| ParseError::InvalidNumber {
            value: self.0.to_string(),
        })
    }

    /// A `0`/`1` flag
    pub fn as_flag(&self) -> Result<bool, ParseError> {
        match self.0 {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(ParseError::UnexpectedValue(format!(
                "expected 0 or 1, got '{other}'"
            ))),
        }
    }
}

fn ok_text(raw: &RawResponse) -> Result<&str, ParseError> {
    match raw {
        RawResponse::Ok(text) => Ok(text),
        RawResponse::ErrorCode(_) | RawResponse::TimedOut => Err(ParseError::NotOk),
    }
}

/// Drop everything from the final status marker on.
fn strip_marker(text: &str) -> &str {
    match text.rfind(OK_MARKER) {
        Some(pos) => &text[..pos],
        None => text,
    }
}

/// Text following `label:` with the status marker and surrounding
/// whitespace removed.
pub fn extract_text<'a>(raw: &'a RawResponse, label: &str) -> Result<&'a str, ParseError> {
    let text = ok_text(raw)?;
    let tag = format!("{label}:");
    let start = text
        .find(&tag)
        .ok_or_else(|| ParseError::LabelNotFound(label.to_string()))?;
    Ok(strip_marker(&text[start + tag.len()..]).trim())
}

/// Split the payload of a labeled response line into fields.
///
/// `"+SBDS: 0, 15, 1, 7\r\n\r\nOK\r\n"` with label `"SBDS"` yields
/// `["0", "15", "1", "7"]`.
pub fn extract_payload<'a>(raw: &'a RawResponse, label: &str) -> Result<Vec<Field<'a>>, ParseError> {
    let payload = extract_text(raw, label)?;
    // Only the first line belongs to the labeled payload
    let line = payload.lines().next().unwrap_or("");
    Ok(line.split(',').map(|t| Field(t.trim())).collect())
}

/// Payload of a response with no label: the text between the command echo
/// (if the modem echoed it) and the status marker.
pub fn extract_unlabeled<'a>(raw: &'a RawResponse, echo: &str) -> Result<&'a str, ParseError> {
    let text = ok_text(raw)?;
    let body = if echo.is_empty() {
        text
    } else {
        match text.find(echo) {
            Some(pos) => &text[pos + echo.len()..],
            None => text,
        }
    };
    let body = strip_marker(body).trim();
    if body.is_empty() {
        return Err(ParseError::UnexpectedValue("empty response body".into()));
    }
    Ok(body)
}

fn field<'a>(fields: &[Field<'a>], index: usize, label: &str) -> Result<Field<'a>, ParseError> {
    fields.get(index).copied().ok_or_else(|| ParseError::MissingField {
        label: label.to_string(),
        index,
    })
}

/// `+SBDS: <MO flag>, <MOMSN>, <MT flag>, <MTMSN>`
pub fn parse_buffer_status(raw: &RawResponse) -> Result<BufferState, ParseError> {
    const LABEL: &str = "SBDS";
    let f = extract_payload(raw, LABEL)?;
    Ok(BufferState {
        mo_has_message: field(&f, 0, LABEL)?.as_flag()?,
        mo_sequence: field(&f, 1, LABEL)?.parse()?,
        mt_has_message: field(&f, 2, LABEL)?.as_flag()?,
        mt_sequence: field(&f, 3, LABEL)?.parse()?,
        ring_alert_pending: false,
        mt_queued_count: 0,
    })
}

/// `+SBDSX: <MO flag>, <MOMSN>, <MT flag>, <MTMSN>, <RA flag>, <msg waiting>`
pub fn parse_buffer_status_ex(raw: &RawResponse) -> Result<BufferState, ParseError> {
    const LABEL: &str = "SBDSX";
    let f = extract_payload(raw, LABEL)?;
    Ok(BufferState {
        mo_has_message: field(&f, 0, LABEL)?.as_flag()?,
        mo_sequence: field(&f, 1, LABEL)?.parse()?,
        mt_has_message: field(&f, 2, LABEL)?.as_flag()?,
        mt_sequence: field(&f, 3, LABEL)?.parse()?,
        ring_alert_pending: field(&f, 4, LABEL)?.as_flag()?,
        mt_queued_count: field(&f, 5, LABEL)?.parse()?,
    })
}

/// `+SBDI` / `+SBDIX`:
/// `<MO status>, <MOMSN>, <MT status>, <MTMSN>, <MT length>, <MT queued>`
pub fn parse_session_result(raw: &RawResponse, label: &str) -> Result<SessionResult, ParseError> {
    let f = extract_payload(raw, label)?;
    Ok(SessionResult {
        mo_status: MoStatus::from_code(field(&f, 0, label)?.parse()?),
        mo_sequence: field(&f, 1, label)?.parse()?,
        mt_status: MtStatus::from_code(field(&f, 2, label)?.parse()?),
        mt_sequence: field(&f, 3, label)?.parse()?,
        mt_length: field(&f, 4, label)?.parse()?,
        mt_queued: field(&f, 5, label)?.parse()?,
    })
}

/// `+CSQ:<n>` or `+CSQF:<n>`, n in 0..=5
pub fn parse_signal(raw: &RawResponse, label: &str) -> Result<SignalQuality, ParseError> {
    let f = extract_payload(raw, label)?;
    let bars: u8 = field(&f, 0, label)?.parse()?;
    if bars > SignalQuality::MAX {
        return Err(ParseError::UnexpectedValue(format!(
            "signal quality {bars} out of range"
        )));
    }
    Ok(SignalQuality(bars))
}

fn parse_hex_ticks(text: &str) -> Result<NetworkTime, ParseError> {
    u32::from_str_radix(text, 16)
        .map(|ticks| NetworkTime { ticks })
        .map_err(|_| ParseError::InvalidNumber {
            value: text.to_string(),
        })
}

/// `-MSSTM: <hex ticks>` or `-MSSTM: no network service`
pub fn parse_network_time(raw: &RawResponse) -> Result<Option<NetworkTime>, ParseError> {
    let text = extract_text(raw, "MSSTM")?;
    if text.contains("no network service") {
        return Ok(None);
    }
    parse_hex_ticks(text).map(Some)
}

/// `-MSGEO: <x>, <y>, <z>, <hex timestamp>`
pub fn parse_geolocation(raw: &RawResponse) -> Result<Geolocation, ParseError> {
    const LABEL: &str = "MSGEO";
    let f = extract_payload(raw, LABEL)?;
    Ok(Geolocation {
        x: field(&f, 0, LABEL)?.parse()?,
        y: field(&f, 1, LABEL)?.parse()?,
        z: field(&f, 2, LABEL)?.parse()?,
        timestamp: parse_hex_ticks(field(&f, 3, LABEL)?.as_str())?,
    })
}

/// `+SBDREG:<status>[,<error>]`
pub fn parse_registration(raw: &RawResponse) -> Result<Registration, ParseError> {
    const LABEL: &str = "SBDREG";
    let f = extract_payload(raw, LABEL)?;
    let status = match field(&f, 0, LABEL)?.parse::<u32>()? {
        0 => RegistrationStatus::Detached,
        1 => RegistrationStatus::NotRegistered,
        2 => RegistrationStatus::Registered,
        3 => RegistrationStatus::Denied,
        other => {
            return Err(ParseError::UnexpectedValue(format!(
                "registration status {other}"
            )))
        }
    };
    let error = match f.get(1) {
        Some(code) => code.parse()?,
        None => 0,
    };
    Ok(Registration { status, error })
}

/// Single numeric status line, e.g. the `0` of `AT+SBDD2` or of a binary write.
pub fn parse_status_code(raw: &RawResponse, echo: &str) -> Result<u32, ParseError> {
    let body = extract_unlabeled(raw, echo)?;
    let line = body.lines().next().unwrap_or("").trim();
    Field(line).parse()
}

/// `SBDTC: Outbound SBD Copied to Inbound SBD: size = <n>`
pub fn parse_copy_size(raw: &RawResponse) -> Result<usize, ParseError> {
    let text = extract_text(raw, "SBDTC")?;
    let (_, size) = text
        .rsplit_once('=')
        .ok_or_else(|| ParseError::UnexpectedValue(format!("no size in '{text}'")))?;
    let size = size.lines().next().unwrap_or("").trim();
    Field(size).parse()
}

/// `+SBDRT:\r\n<message>`; the message keeps its inner whitespace.
pub fn parse_text_message(raw: &RawResponse) -> Result<String, ParseError> {
    let text = ok_text(raw)?;
    let tag = "SBDRT:";
    let start = text
        .find(tag)
        .ok_or_else(|| ParseError::LabelNotFound("SBDRT".into()))?;
    let body = strip_marker(&text[start + tag.len()..]);
    Ok(body.trim_matches(|c| c == '\r' || c == '\n').to_string())
}
