//! Core domain types
//!
//! Value types derived from modem responses. None of them are cached across
//! sessions; the modem is the source of truth for its own buffers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Largest binary message the modem accepts in either buffer
pub const MAX_BINARY_PAYLOAD: usize = 340;

/// Largest message accepted by the single-line text write
pub const MAX_TEXT_PAYLOAD: usize = 120;

/// Length of one network-time tick
pub const NETWORK_TICK: Duration = Duration::from_millis(90);

/// Current Iridium system-time epoch (2014-05-11 14:23:55 UTC) as unix seconds
pub const IRIDIUM_EPOCH_UNIX_SECS: u64 = 1_399_818_235;

/// State of the MO and MT buffers as reported by a status query.
///
/// `ring_alert_pending` and `mt_queued_count` are only filled by the
/// extended status query; the basic query leaves them `false` / `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BufferState {
    pub mo_has_message: bool,
    pub mo_sequence: u32,
    pub mt_has_message: bool,
    /// -1 when the MT buffer is empty
    pub mt_sequence: i32,
    pub ring_alert_pending: bool,
    pub mt_queued_count: u32,
}

impl BufferState {
    pub fn is_empty(&self) -> bool {
        !self.mo_has_message && !self.mt_has_message
    }
}

/// Mobile-originated outcome of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoStatus {
    None,
    Sent,
    SendError,
}

impl MoStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => MoStatus::None,
            1 => MoStatus::Sent,
            _ => MoStatus::SendError,
        }
    }
}

/// Mobile-terminated outcome of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MtStatus {
    None,
    Received,
    ReceiveError,
}

impl MtStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => MtStatus::None,
            1 => MtStatus::Received,
            _ => MtStatus::ReceiveError,
        }
    }
}

/// Result of one session initiate (`+SBDI` / `+SBDIX`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    pub mo_status: MoStatus,
    pub mo_sequence: u32,
    pub mt_status: MtStatus,
    pub mt_sequence: i32,
    pub mt_length: u16,
    pub mt_queued: u32,
}

/// Buffer selector for the clear command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearSelector {
    Mo,
    Mt,
    Both,
}

impl ClearSelector {
    pub fn code(self) -> u8 {
        match self {
            ClearSelector::Mo => 0,
            ClearSelector::Mt => 1,
            ClearSelector::Both => 2,
        }
    }
}

/// Signal strength in bars, 0 (none) to 5 (best)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalQuality(pub u8);

impl SignalQuality {
    pub const MAX: u8 = 5;

    pub fn bars(&self) -> u8 {
        self.0
    }

    pub fn has_signal(&self) -> bool {
        self.0 > 0
    }
}

/// Iridium network time: count of 90 ms ticks since the current epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkTime {
    pub ticks: u32,
}

impl NetworkTime {
    pub fn since_epoch(&self) -> Duration {
        NETWORK_TICK * self.ticks
    }

    pub fn to_system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(IRIDIUM_EPOCH_UNIX_SECS) + self.since_epoch()
    }
}

/// Model, firmware revision and IMEI of the transceiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemIdentity {
    pub model: String,
    pub revision: String,
    pub imei: String,
}

/// Earth-centred cartesian position (km) from `-MSGEO`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geolocation {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub timestamp: NetworkTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Detached,
    NotRegistered,
    Registered,
    Denied,
}

/// Outcome of a manual registration (`+SBDREG`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub status: RegistrationStatus,
    pub error: u32,
}

/// Information about a serial port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortInfo {
    pub name: String,
    pub port_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_outcomes() {
        assert_eq!(MoStatus::from_code(0), MoStatus::None);
        assert_eq!(MoStatus::from_code(1), MoStatus::Sent);
        assert_eq!(MoStatus::from_code(2), MoStatus::SendError);
        assert_eq!(MoStatus::from_code(32), MoStatus::SendError);
        assert_eq!(MtStatus::from_code(1), MtStatus::Received);
        assert_eq!(MtStatus::from_code(2), MtStatus::ReceiveError);
    }

    #[test]
    fn network_time_counts_90ms_ticks() {
        let t = NetworkTime { ticks: 1000 };
        assert_eq!(t.since_epoch(), Duration::from_secs(90));
        let unix = t
            .to_system_time()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(unix, IRIDIUM_EPOCH_UNIX_SECS + 90);
    }

    #[test]
    fn clear_selector_codes() {
        assert_eq!(ClearSelector::Mo.code(), 0);
        assert_eq!(ClearSelector::Mt.code(), 1);
        assert_eq!(ClearSelector::Both.code(), 2);
    }
}
