//! Serial port adapter using the `serialport` crate
//!
//! Implements `SerialFactory` and `SerialConnection` traits.
//! `SerialPortFactory` has no instance data, just static methods for
//! listing and opening ports.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use crate::domain::{SbdError, SbdResult, SerialPortInfo};
use crate::ports::{SerialConnection, SerialFactory};

/// Per-call timeout of the underlying port
const PORT_TIMEOUT_MS: u64 = 100;

/// Zero-sized factory for creating serial port connections.
pub struct SerialPortFactory;

impl SerialFactory for SerialPortFactory {
    fn list_ports() -> SbdResult<Vec<SerialPortInfo>> {
        let ports = serialport::available_ports()
            .map_err(|e| SbdError::Io(format!("Failed to list ports: {e}")))?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let port_type = match &p.port_type {
                    serialport::SerialPortType::UsbPort(info) => {
                        format!("USB ({:04X}:{:04X})", info.vid, info.pid)
                    }
                    serialport::SerialPortType::PciPort => "PCI".to_string(),
                    serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                    serialport::SerialPortType::Unknown => "Native".to_string(),
                };
                SerialPortInfo {
                    name: p.port_name,
                    port_type,
                }
            })
            .collect())
    }

    fn open(port: &str, baud_rate: u32) -> SbdResult<Box<dyn SerialConnection>> {
        let serial = serialport::new(port, baud_rate)
            .timeout(Duration::from_millis(PORT_TIMEOUT_MS))
            .open()
            .map_err(|e| SbdError::Io(format!("Failed to open {port}: {e}")))?;

        log::info!("Opened {port} at {baud_rate} baud");
        Ok(Box::new(SerialPortConnection {
            port: serial,
            connected: true,
        }))
    }
}

/// An open serial port connection wrapping the `serialport` crate.
pub struct SerialPortConnection {
    port: Box<dyn serialport::SerialPort>,
    connected: bool,
}

impl SerialConnection for SerialPortConnection {
    fn write(&mut self, data: &[u8]) -> SbdResult<()> {
        self.port
            .write_all(data)
            .and_then(|_| self.port.flush())
            .map_err(|e| SbdError::Io(format!("Write failed: {e}")))
    }

    fn read_available(&mut self, deadline: Instant) -> SbdResult<Vec<u8>> {
        if Instant::now() >= deadline {
            return Ok(Vec::new());
        }
        let pending = self
            .port
            .bytes_to_read()
            .map_err(|e| SbdError::Io(format!("Read failed: {e}")))? as usize;
        if pending == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; pending];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(SbdError::Io(format!("Read failed: {e}"))),
        }
    }

    fn flush_input(&mut self) -> SbdResult<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| SbdError::Io(format!("Flush failed: {e}")))
    }

    fn close(&mut self) -> SbdResult<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
