//! Serial port traits
//!
//! Split into two traits:
//! - `SerialFactory`: static methods for listing and opening ports
//! - `SerialConnection`: the byte-stream transport the AT layer drives
//!
//! Neither trait knows anything about AT framing.

use std::time::Instant;

use crate::domain::{SbdResult, SerialPortInfo};

/// Factory for creating serial connections.
pub trait SerialFactory {
    /// List available serial ports on the system
    fn list_ports() -> SbdResult<Vec<SerialPortInfo>>;

    /// Open a serial port at the given baud rate, returning a boxed connection
    fn open(port: &str, baud_rate: u32) -> SbdResult<Box<dyn SerialConnection>>;
}

/// An open duplex byte stream to the modem.
/// Only requires `Send` (not `Sync`); always accessed behind a Mutex.
pub trait SerialConnection: Send {
    /// Write all bytes to the port
    fn write(&mut self, data: &[u8]) -> SbdResult<()>;

    /// Return whatever bytes are available now, possibly none.
    /// Must not block past `deadline`.
    fn read_available(&mut self, deadline: Instant) -> SbdResult<Vec<u8>>;

    /// Discard any unread input
    fn flush_input(&mut self) -> SbdResult<()>;

    /// Close the connection
    fn close(&mut self) -> SbdResult<()>;

    /// Check if the port is still connected
    fn is_connected(&self) -> bool;
}
