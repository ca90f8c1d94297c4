//! Domain error types
//!
//! One closed taxonomy for the whole driver. Every failure reaches the caller
//! as a variant of `SbdError`; nothing is recovered silently.

use thiserror::Error;

use super::types::SessionResult;

/// A well-formed `OK` response whose payload did not have the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("response was not OK")]
    NotOk,

    #[error("label '{0}:' not found in response")]
    LabelNotFound(String),

    #[error("field {index} missing from '{label}' response")]
    MissingField { label: String, index: usize },

    #[error("field '{value}' is not a valid number")]
    InvalidNumber { value: String },

    #[error("unexpected value in response: {0}")]
    UnexpectedValue(String),
}

/// Failures specific to the checksum-framed binary transfer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("modem timed out waiting for message bytes")]
    InsufficientBytes,

    #[error("message length {0} out of bounds")]
    LengthOutOfBounds(usize),

    #[error("text message contains a line terminator")]
    InvalidText,

    #[error("unknown write status code {0}")]
    UnknownStatus(u32),
}

/// Which step of the session sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    StatusCheck,
    Initiate,
    /// Reading the MT message delivered by the session
    Receive,
}

impl std::fmt::Display for SessionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStage::StatusCheck => f.write_str("status check"),
            SessionStage::Initiate => f.write_str("session initiate"),
            SessionStage::Receive => f.write_str("MT message read"),
        }
    }
}

/// Errors that can occur while driving the SBD modem
#[derive(Error, Debug)]
pub enum SbdError {
    #[error("Serial I/O error: {0}")]
    Io(String),

    #[error("Command '{command}' timed out after {timeout_ms} ms")]
    TimedOut { command: String, timeout_ms: u64 },

    #[error("Command '{command}' returned ERROR: '{response}'")]
    ModemError { command: String, response: String },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// The modem did not confirm a buffer clear. After a session, `transfer`
    /// holds what the transfer did first, so a delivered MO is not resent.
    #[error("Buffer clear failed: {reason}")]
    BufferClearFailed {
        reason: String,
        transfer: Option<Box<TransferOutcome>>,
    },

    #[error("Session already in progress (state: {state})")]
    SessionInProgress { state: String },

    #[error("Session failed during {stage}: {source}")]
    Session {
        stage: SessionStage,
        #[source]
        source: Box<SbdError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Power error: {0}")]
    Power(String),
}

impl SbdError {
    /// True for transport failures, after which the port should be considered gone.
    /// Looks through a failed session stage to its cause.
    pub fn is_io(&self) -> bool {
        match self {
            SbdError::Io(_) => true,
            SbdError::Session { source, .. } => source.is_io(),
            _ => false,
        }
    }
}

/// What a session's transfer did before its buffer clear failed
#[derive(Debug)]
pub enum TransferOutcome {
    /// The initiate completed; `result.mo_status` says whether the MO went out
    Completed {
        result: SessionResult,
        mt_message: Option<Vec<u8>>,
    },
    /// The initiate or the MT read failed
    Failed(SbdError),
}

impl TransferOutcome {
    pub fn result(&self) -> Option<&SessionResult> {
        match self {
            TransferOutcome::Completed { result, .. } => Some(result),
            TransferOutcome::Failed(_) => None,
        }
    }
}

/// Result type alias for SBD driver operations
pub type SbdResult<T> = Result<T, SbdError>;
