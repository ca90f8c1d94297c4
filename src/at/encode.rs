//! Pure encoding: AtCommand → AT wire string.
//!
//! No I/O, no side effects. The line terminator is appended by the channel,
//! not here, so echo matching can compare against the bare command text.

use super::{AtCommand, Setting};

/// Encode an AtCommand into its command text (without the line terminator).
pub fn encode(cmd: &AtCommand) -> String {
    let mnemonic = cmd.spec().mnemonic;
    match cmd {
        AtCommand::Echo(on) => format!("{mnemonic}{}", u8::from(*on)),
        AtCommand::RingAlert(Setting::Query) | AtCommand::SessionTimeout(Setting::Query) => {
            format!("{mnemonic}?")
        }
        AtCommand::RingAlert(Setting::Set(on)) => format!("{mnemonic}={}", u8::from(*on)),
        AtCommand::SessionTimeout(Setting::Set(secs)) => format!("{mnemonic}={secs}"),
        AtCommand::WriteText(text) => format!("{mnemonic}={text}"),
        AtCommand::WriteBinary(len) => format!("{mnemonic}={len}"),
        AtCommand::ClearBuffer(selector) => format!("{mnemonic}{}", selector.code()),
        AtCommand::InitiateEx {
            answer_ring_alert,
            location,
        } => {
            let mut wire = mnemonic.to_string();
            if *answer_ring_alert {
                wire.push('A');
            }
            if let Some(loc) = location {
                wire.push('=');
                wire.push_str(loc);
            }
            wire
        }
        AtCommand::Register(Some(loc)) => format!("{mnemonic}={loc}"),
        AtCommand::SoftReset(profile) => format!("{mnemonic}{profile}"),
        AtCommand::BufferStatus
        | AtCommand::BufferStatusEx
        | AtCommand::SignalQuality
        | AtCommand::LastSignalQuality
        | AtCommand::NetworkTime
        | AtCommand::Geolocation
        | AtCommand::Model
        | AtCommand::Revision
        | AtCommand::Imei
        | AtCommand::ReadText
        | AtCommand::ReadBinary
        | AtCommand::Initiate
        | AtCommand::Register(None)
        | AtCommand::CopyMoToMt
        | AtCommand::PowerDown => mnemonic.to_string(),
    }
}
