//! Iridium SBD modem driver
//!
//! Drives a 9602/9603-class Short Burst Data transceiver over its AT-command
//! serial interface: buffer status, text and binary message transfer,
//! session initiation with mandatory buffer clearing, and housekeeping
//! queries (signal, network time, identity).
//!
//! ## Architecture (Hexagonal / Ports & Adapters)
//!
//! - `domain/` - Pure domain types, errors and configuration, no I/O
//! - `ports/` - Trait definitions for the serial transport and power switching
//! - `at/` - AT protocol: command table, encode/decode, response reader, channel, binary codec
//! - `sbd/` - Session state machine and the `SbdModem` facade
//! - `adapters/` - Implementations of ports (serialport, mock modem)
//! - `power` - Per-device power state management
//! - `state` - Mutex-guarded shared driver handle

// Core domain (pure, no I/O)
pub mod domain;
pub mod ports;

// Protocol
pub mod at;
pub mod sbd;

// Adapters (external I/O)
pub mod adapters;

pub mod power;
pub mod state;

pub use domain::{DriverConfig, SbdError, SbdResult};
pub use sbd::SbdModem;
