//! AT command layer for Iridium SBD transceivers.
//!
//! This module separates the concerns of AT communication:
//! - `encode`: translate AtCommand → wire string (pure, no I/O)
//! - `decode`: extract and type the payload of a response (pure, no I/O)
//! - `reader`: accumulate bytes until a terminal marker or deadline
//! - `channel`: own the serial port, flush, send and time out commands
//! - `binary`: checksum-framed binary buffer transfers
//!
//! The command table lives here. Each `CommandId` resolves to exactly one
//! `CommandSpec` through an exhaustive match, so a mnemonic cannot be defined
//! twice with different shapes.

use std::time::Duration;

use crate::domain::ClearSelector;

pub mod binary;
pub mod channel;
pub mod decode;
pub mod encode;
pub mod reader;

pub use channel::AtChannel;
pub use decode::{extract_payload, Field};
pub use encode::encode;
pub use reader::ResponseReader;

/// Terminator appended to every command line
pub const LINE_TERMINATOR: &str = "\r\n";

const QUERY: Duration = Duration::from_millis(1_000);
const SIGNAL: Duration = Duration::from_secs(10);
const SESSION: Duration = Duration::from_secs(60);

/// How many arguments a command takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    None,
    Required,
    Optional,
}

/// Static description of one AT command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub mnemonic: &'static str,
    pub arity: Arity,
    pub default_timeout: Duration,
}

const fn spec(mnemonic: &'static str, arity: Arity, default_timeout: Duration) -> CommandSpec {
    CommandSpec {
        mnemonic,
        arity,
        default_timeout,
    }
}

/// Identifier for every command the driver can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    BufferStatus,
    BufferStatusEx,
    SignalQuality,
    LastSignalQuality,
    NetworkTime,
    Geolocation,
    Model,
    Revision,
    Imei,
    Echo,
    RingAlert,
    SessionTimeout,
    WriteText,
    WriteBinary,
    ReadText,
    ReadBinary,
    ClearBuffer,
    Initiate,
    InitiateEx,
    Register,
    CopyMoToMt,
    SoftReset,
    PowerDown,
}

impl CommandId {
    pub const ALL: [CommandId; 23] = [
        CommandId::BufferStatus,
        CommandId::BufferStatusEx,
        CommandId::SignalQuality,
        CommandId::LastSignalQuality,
        CommandId::NetworkTime,
        CommandId::Geolocation,
        CommandId::Model,
        CommandId::Revision,
        CommandId::Imei,
        CommandId::Echo,
        CommandId::RingAlert,
        CommandId::SessionTimeout,
        CommandId::WriteText,
        CommandId::WriteBinary,
        CommandId::ReadText,
        CommandId::ReadBinary,
        CommandId::ClearBuffer,
        CommandId::Initiate,
        CommandId::InitiateEx,
        CommandId::Register,
        CommandId::CopyMoToMt,
        CommandId::SoftReset,
        CommandId::PowerDown,
    ];

    pub const fn spec(self) -> CommandSpec {
        match self {
            CommandId::BufferStatus => spec("AT+SBDS", Arity::None, QUERY),
            CommandId::BufferStatusEx => spec("AT+SBDSX", Arity::None, QUERY),
            // May take up to ten seconds during a satellite handoff
            CommandId::SignalQuality => spec("AT+CSQ", Arity::None, SIGNAL),
            CommandId::LastSignalQuality => spec("AT+CSQF", Arity::None, QUERY),
            CommandId::NetworkTime => spec("AT-MSSTM", Arity::None, QUERY),
            CommandId::Geolocation => spec("AT-MSGEO", Arity::None, QUERY),
            CommandId::Model => spec("AT+CGMM", Arity::None, QUERY),
            CommandId::Revision => spec("AT+CGMR", Arity::None, QUERY),
            CommandId::Imei => spec("AT+CGSN", Arity::None, QUERY),
            CommandId::Echo => spec("ATE", Arity::Required, QUERY),
            CommandId::RingAlert => spec("AT+SBDMTA", Arity::Optional, QUERY),
            CommandId::SessionTimeout => spec("AT+SBDST", Arity::Optional, QUERY),
            CommandId::WriteText => spec("AT+SBDWT", Arity::Required, QUERY),
            CommandId::WriteBinary => spec("AT+SBDWB", Arity::Required, QUERY),
            CommandId::ReadText => spec("AT+SBDRT", Arity::None, QUERY),
            CommandId::ReadBinary => spec("AT+SBDRB", Arity::None, Duration::from_secs(2)),
            CommandId::ClearBuffer => spec("AT+SBDD", Arity::Required, QUERY),
            CommandId::Initiate => spec("AT+SBDI", Arity::None, SESSION),
            CommandId::InitiateEx => spec("AT+SBDIX", Arity::Optional, SESSION),
            CommandId::Register => spec("AT+SBDREG", Arity::Optional, SESSION),
            CommandId::CopyMoToMt => spec("AT+SBDTC", Arity::None, QUERY),
            CommandId::SoftReset => spec("ATZ", Arity::Required, QUERY),
            CommandId::PowerDown => spec("AT*F", Arity::None, QUERY),
        }
    }
}

/// Argument of a command with optional arity: read the setting or write it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting<T> {
    Query,
    Set(T),
}

/// High-level commands understood by the transceiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtCommand {
    BufferStatus,
    BufferStatusEx,
    SignalQuality,
    LastSignalQuality,
    NetworkTime,
    Geolocation,
    Model,
    Revision,
    Imei,
    Echo(bool),
    RingAlert(Setting<bool>),
    /// Seconds, 0 = no timeout
    SessionTimeout(Setting<u32>),
    WriteText(String),
    /// Byte length of the message that follows the READY prompt
    WriteBinary(usize),
    ReadText,
    ReadBinary,
    ClearBuffer(ClearSelector),
    Initiate,
    InitiateEx {
        answer_ring_alert: bool,
        location: Option<String>,
    },
    Register(Option<String>),
    CopyMoToMt,
    /// Stored profile to restore, 0 or 1
    SoftReset(u8),
    PowerDown,
}

impl AtCommand {
    pub fn id(&self) -> CommandId {
        match self {
            AtCommand::BufferStatus => CommandId::BufferStatus,
            AtCommand::BufferStatusEx => CommandId::BufferStatusEx,
            AtCommand::SignalQuality => CommandId::SignalQuality,
            AtCommand::LastSignalQuality => CommandId::LastSignalQuality,
            AtCommand::NetworkTime => CommandId::NetworkTime,
            AtCommand::Geolocation => CommandId::Geolocation,
            AtCommand::Model => CommandId::Model,
            AtCommand::Revision => CommandId::Revision,
            AtCommand::Imei => CommandId::Imei,
            AtCommand::Echo(_) => CommandId::Echo,
            AtCommand::RingAlert(_) => CommandId::RingAlert,
            AtCommand::SessionTimeout(_) => CommandId::SessionTimeout,
            AtCommand::WriteText(_) => CommandId::WriteText,
            AtCommand::WriteBinary(_) => CommandId::WriteBinary,
            AtCommand::ReadText => CommandId::ReadText,
            AtCommand::ReadBinary => CommandId::ReadBinary,
            AtCommand::ClearBuffer(_) => CommandId::ClearBuffer,
            AtCommand::Initiate => CommandId::Initiate,
            AtCommand::InitiateEx { .. } => CommandId::InitiateEx,
            AtCommand::Register(_) => CommandId::Register,
            AtCommand::CopyMoToMt => CommandId::CopyMoToMt,
            AtCommand::SoftReset(_) => CommandId::SoftReset,
            AtCommand::PowerDown => CommandId::PowerDown,
        }
    }

    pub fn spec(&self) -> CommandSpec {
        self.id().spec()
    }

    /// Default timeout raised to the configured floor
    pub fn timeout(&self, floor: Duration) -> Duration {
        self.spec().default_timeout.max(floor)
    }
}

/// Unparsed text accumulated for one command, tagged with its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawResponse {
    Ok(String),
    ErrorCode(String),
    TimedOut,
}

impl RawResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, RawResponse::Ok(_))
    }
}
