//! Driver configuration
//!
//! A `DriverConfig` is a JSON-persisted profile with the serial settings and
//! the protocol tunables (poll interval, minimum timeout, ring alert policy).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{SbdError, SbdResult};

/// Smallest timeout any command may use
pub const MIN_TIMEOUT_FLOOR_MS: u64 = 500;

/// How pending ring alerts are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingAlertPolicy {
    /// Only reported through an explicit status poll
    #[default]
    Poll,
    /// `idle_tick` answers a pending alert with a full session
    AnswerWhenIdle,
}

fn default_echo() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Serial device, e.g. "/dev/serial0"
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Delay between transport polls while waiting for a response
    pub poll_interval_ms: u64,
    /// Floor applied to every command timeout
    pub min_timeout_ms: u64,
    #[serde(default)]
    pub ring_alert_policy: RingAlertPolicy,
    /// Session timeout pushed to the modem by `configure` (0 = no timeout)
    #[serde(default)]
    pub session_timeout_secs: Option<u32>,
    /// Whether the modem should echo commands
    #[serde(default = "default_echo")]
    pub echo: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 19200,
            poll_interval_ms: 50,
            min_timeout_ms: MIN_TIMEOUT_FLOOR_MS,
            ring_alert_policy: RingAlertPolicy::Poll,
            session_timeout_secs: None,
            echo: default_echo(),
        }
    }
}

impl DriverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn min_timeout(&self) -> Duration {
        Duration::from_millis(self.min_timeout_ms)
    }

    pub fn validate(&self) -> SbdResult<()> {
        if self.baud_rate == 0 {
            return Err(SbdError::Config("baud rate must be non-zero".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(SbdError::Config("poll interval must be non-zero".into()));
        }
        if self.min_timeout_ms < MIN_TIMEOUT_FLOOR_MS {
            return Err(SbdError::Config(format!(
                "minimum timeout {} ms is below the {MIN_TIMEOUT_FLOOR_MS} ms floor",
                self.min_timeout_ms
            )));
        }
        Ok(())
    }

    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> SbdResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            SbdError::Config(format!("Failed to read config '{}': {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            SbdError::Config(format!("Failed to parse config '{}': {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> SbdResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SbdError::Config(format!("Serialization error: {e}")))?;
        std::fs::write(path, json).map_err(|e| {
            SbdError::Config(format!("Failed to write config '{}': {e}", path.display()))
        })
    }
}
