//! Session state machine
//!
//! One session walks `Idle → StatusChecked → TransferInitiated →
//! BufferCleared → Idle`. Once the initiate command has been sent the
//! buffers are cleared whether the transfer succeeded or not. A clear that
//! the modem does not confirm leaves the machine in `TransferInitiated`, and
//! no new session starts until `recover` clears the buffers. The failed
//! clear still reports what the transfer did.

use std::fmt;

use serde::Serialize;

use crate::at::decode::{parse_buffer_status, parse_session_result, parse_status_code};
use crate::at::{binary, encode, AtChannel, AtCommand};
use crate::domain::{
    BufferState, ClearSelector, MtStatus, SbdError, SbdResult, SessionResult, SessionStage,
    TransferOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    StatusChecked,
    TransferInitiated,
    BufferCleared,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::StatusChecked => "status checked",
            SessionState::TransferInitiated => "transfer initiated",
            SessionState::BufferCleared => "buffer cleared",
        };
        f.write_str(name)
    }
}

/// Which initiate command opens the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initiation {
    /// `AT+SBDI`
    Basic,
    /// `AT+SBDIX`, or `AT+SBDIXA` when answering a ring alert
    Extended {
        answer_ring_alert: bool,
        location: Option<String>,
    },
}

impl Initiation {
    fn command(&self) -> (AtCommand, &'static str) {
        match self {
            Initiation::Basic => (AtCommand::Initiate, "SBDI"),
            Initiation::Extended {
                answer_ring_alert,
                location,
            } => (
                AtCommand::InitiateEx {
                    answer_ring_alert: *answer_ring_alert,
                    location: location.clone(),
                },
                "SBDIX",
            ),
        }
    }
}

/// Everything one completed session observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Buffer status before the transfer
    pub before: BufferState,
    pub result: SessionResult,
    /// MT message delivered by this session, read before the clear
    pub mt_message: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct SbdSession {
    state: SessionState,
}

impl Default for SbdSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SbdSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }

    fn transition(&mut self, next: SessionState) {
        log::info!("SBD session: {} -> {next}", self.state);
        self.state = next;
    }

    /// Run one full session. Fails with `SessionInProgress`, without
    /// touching the transport, unless the machine is `Idle`.
    pub fn run(&mut self, channel: &mut AtChannel, initiation: &Initiation) -> SbdResult<SessionReport> {
        if !self.is_idle() {
            return Err(SbdError::SessionInProgress {
                state: self.state.to_string(),
            });
        }

        let before = match check_status(channel) {
            Ok(status) => status,
            Err(source) => {
                log::warn!("SBD session aborted at status check: {source}");
                return Err(SbdError::Session {
                    stage: SessionStage::StatusCheck,
                    source: Box::new(source),
                });
            }
        };
        self.transition(SessionState::StatusChecked);

        // From here on the modem may have touched its buffers
        let transfer = initiate(channel, initiation);
        self.transition(SessionState::TransferInitiated);

        let transfer = transfer.and_then(|result| {
            receive(channel, &result)
                .map(|mt_message| (result, mt_message))
                .map_err(|source| SbdError::Session {
                    stage: SessionStage::Receive,
                    source: Box::new(source),
                })
        });

        if let Err(e) = self.clear(channel) {
            return Err(attach_transfer(e, transfer));
        }

        let (result, mt_message) = transfer?;
        Ok(SessionReport {
            before,
            result,
            mt_message,
        })
    }

    /// Clear both buffers after a transfer attempt and return to `Idle`.
    fn clear(&mut self, channel: &mut AtChannel) -> SbdResult<()> {
        if let Err(e) = clear_buffers(channel, ClearSelector::Both) {
            log::error!("SBD buffer clear failed, session stays {}: {e}", self.state);
            return Err(e);
        }
        self.transition(SessionState::BufferCleared);
        self.transition(SessionState::Idle);
        Ok(())
    }

    /// Re-clear both buffers after a failed clear. Succeeds trivially when
    /// the machine is already `Idle`.
    pub fn recover(&mut self, channel: &mut AtChannel) -> SbdResult<()> {
        if self.is_idle() {
            return Ok(());
        }
        log::warn!("SBD session recovering from {}", self.state);
        self.clear(channel)
    }
}

/// Fold the transfer outcome into an unconfirmed clear. A transport failure
/// stays `Io`; the outcome is only logged then.
fn attach_transfer(
    clear_error: SbdError,
    transfer: SbdResult<(SessionResult, Option<Vec<u8>>)>,
) -> SbdError {
    let outcome = match transfer {
        Ok((result, mt_message)) => TransferOutcome::Completed { result, mt_message },
        Err(e) => TransferOutcome::Failed(e),
    };
    match clear_error {
        SbdError::BufferClearFailed { reason, .. } => SbdError::BufferClearFailed {
            reason,
            transfer: Some(Box::new(outcome)),
        },
        other => {
            log::error!("SBD transfer outcome before clear failed: {outcome:?}");
            other
        }
    }
}

fn check_status(channel: &mut AtChannel) -> SbdResult<BufferState> {
    let raw = channel.request(&AtCommand::BufferStatus)?;
    Ok(parse_buffer_status(&raw)?)
}

fn initiate(channel: &mut AtChannel, initiation: &Initiation) -> SbdResult<SessionResult> {
    let (cmd, label) = initiation.command();
    let raw = channel.request(&cmd).map_err(|source| SbdError::Session {
        stage: SessionStage::Initiate,
        source: Box::new(source),
    })?;
    let result = parse_session_result(&raw, label).map_err(|e| SbdError::Session {
        stage: SessionStage::Initiate,
        source: Box::new(e.into()),
    })?;
    log::info!(
        "SBD session result: MO {:?} #{}, MT {:?} #{} ({} bytes, {} queued)",
        result.mo_status,
        result.mo_sequence,
        result.mt_status,
        result.mt_sequence,
        result.mt_length,
        result.mt_queued
    );
    Ok(result)
}

fn receive(channel: &mut AtChannel, result: &SessionResult) -> SbdResult<Option<Vec<u8>>> {
    if result.mt_status != MtStatus::Received {
        return Ok(None);
    }
    binary::read_binary(channel).map(Some)
}

/// Clear the selected buffers, mapping any failure to `BufferClearFailed`.
/// Transport failures stay `Io` so callers can drop the port.
pub fn clear_buffers(channel: &mut AtChannel, selector: ClearSelector) -> SbdResult<()> {
    let cmd = AtCommand::ClearBuffer(selector);
    let code = channel
        .request(&cmd)
        .and_then(|raw| parse_status_code(&raw, &encode(&cmd)).map_err(SbdError::from));
    match code {
        Ok(0) => Ok(()),
        Ok(code) => Err(SbdError::BufferClearFailed {
            reason: format!("modem reported status {code}"),
            transfer: None,
        }),
        Err(e @ SbdError::Io(_)) => Err(e),
        Err(e) => Err(SbdError::BufferClearFailed {
            reason: e.to_string(),
            transfer: None,
        }),
    }
}
