//! Shared driver state
//!
//! The transport must never see interleaved commands, so the modem lives
//! behind one mutex. Each call locks it, checks a modem is attached and runs
//! a closure on it.
//!
//! Transport errors (`SbdError::Io`) mean the port is physically gone:
//! `with_modem` then drops the modem and forgets the port name so the next
//! caller sees a detached driver instead of a dead port.

use std::sync::Mutex;

use crate::adapters::serial_port::SerialPortFactory;
use crate::domain::{DriverConfig, SbdError, SbdResult};
use crate::ports::SerialConnection;
use crate::sbd::SbdModem;

#[derive(Default)]
pub struct DriverState {
    modem: Mutex<Option<SbdModem>>,
    port_name: Mutex<Option<String>>,
}

fn poisoned(what: &str) -> SbdError {
    SbdError::Io(format!("{what} state corrupted"))
}

impl DriverState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the configured serial port, push the configuration and attach.
    pub fn connect(&self, config: DriverConfig) -> SbdResult<()> {
        let port = config
            .port
            .clone()
            .ok_or_else(|| SbdError::Config("no serial port configured".into()))?;
        let mut modem = SbdModem::open::<SerialPortFactory>(config)?;
        modem.configure()?;
        self.attach(modem, &port)
    }

    /// Attach a modem over an arbitrary transport.
    pub fn connect_with(
        &self,
        serial: Box<dyn SerialConnection>,
        config: DriverConfig,
        port: &str,
    ) -> SbdResult<()> {
        let mut modem = SbdModem::new(serial, config)?;
        modem.configure()?;
        self.attach(modem, port)
    }

    pub fn attach(&self, modem: SbdModem, port: &str) -> SbdResult<()> {
        *self.modem.lock().map_err(|_| poisoned("Modem"))? = Some(modem);
        *self.port_name.lock().map_err(|_| poisoned("Port name"))? = Some(port.to_string());
        log::info!("SBD modem attached on {port}");
        Ok(())
    }

    /// Drop the modem without talking to it.
    pub fn detach(&self) -> SbdResult<Option<String>> {
        *self.modem.lock().map_err(|_| poisoned("Modem"))? = None;
        let port = self.port_name.lock().map_err(|_| poisoned("Port name"))?.take();
        if let Some(port) = &port {
            log::info!("SBD modem detached from {port}");
        }
        Ok(port)
    }

    pub fn is_attached(&self) -> bool {
        self.modem.lock().map(|m| m.is_some()).unwrap_or(false)
    }

    pub fn port_name(&self) -> Option<String> {
        self.port_name.lock().ok().and_then(|p| p.clone())
    }

    /// Lock the modem, check it's attached, and run `f` on it.
    ///
    /// On a transport failure the modem is dropped and the port name
    /// cleared before the error is returned.
    pub fn with_modem<T>(&self, f: impl FnOnce(&mut SbdModem) -> SbdResult<T>) -> SbdResult<T> {
        let mut guard = self.modem.lock().map_err(|_| poisoned("Modem"))?;
        let modem = guard
            .as_mut()
            .ok_or_else(|| SbdError::Io("Modem not connected".into()))?;

        match f(modem) {
            Err(e) if e.is_io() => {
                *guard = None;
                // Release the modem mutex before taking the port-name mutex
                drop(guard);
                let port = self
                    .port_name
                    .lock()
                    .ok()
                    .and_then(|mut p| p.take())
                    .unwrap_or_default();
                log::warn!("Serial link to {port} lost, modem detached: {e}");
                Err(e)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_modem::MockModem;
    use std::time::Instant;

    struct UnpluggedSerial;

    impl SerialConnection for UnpluggedSerial {
        fn write(&mut self, _data: &[u8]) -> SbdResult<()> {
            Err(SbdError::Io("device unplugged".into()))
        }
        fn read_available(&mut self, _deadline: Instant) -> SbdResult<Vec<u8>> {
            Err(SbdError::Io("device unplugged".into()))
        }
        fn flush_input(&mut self) -> SbdResult<()> {
            Ok(())
        }
        fn close(&mut self) -> SbdResult<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            false
        }
    }

    fn config() -> DriverConfig {
        DriverConfig {
            poll_interval_ms: 1,
            ..DriverConfig::default()
        }
    }

    #[test]
    fn detached_driver_rejects_calls() {
        let state = DriverState::new();
        let err = state.with_modem(|m| m.buffer_status()).unwrap_err();
        assert!(err.to_string().contains("not connected"));
    }

    #[test]
    fn attached_modem_answers() {
        let state = DriverState::new();
        state
            .connect_with(Box::new(MockModem::new()), config(), "mock")
            .unwrap();
        assert_eq!(state.port_name().as_deref(), Some("mock"));
        let status = state.with_modem(|m| m.buffer_status()).unwrap();
        assert!(status.is_empty());
    }

    #[test]
    fn io_error_detaches_modem() {
        let state = DriverState::new();
        let modem = SbdModem::new(Box::new(UnpluggedSerial), config()).unwrap();
        state.attach(modem, "/dev/ttyUSB0").unwrap();

        let err = state.with_modem(|m| m.imei()).unwrap_err();
        assert!(err.is_io());
        assert!(!state.is_attached());
        assert_eq!(state.port_name(), None);
    }

    #[test]
    fn other_errors_keep_modem_attached() {
        let state = DriverState::new();
        let mock = MockModem::new();
        mock.handle().with(|s| s.reject.push("AT+CGSN".into()));
        state.connect_with(Box::new(mock), config(), "mock").unwrap();

        let err = state.with_modem(|m| m.imei()).unwrap_err();
        assert!(matches!(err, SbdError::ModemError { .. }));
        assert!(state.is_attached());
    }

    #[test]
    fn detach_returns_port_name() {
        let state = DriverState::new();
        state
            .connect_with(Box::new(MockModem::new()), config(), "mock")
            .unwrap();
        assert_eq!(state.detach().unwrap().as_deref(), Some("mock"));
        assert!(!state.is_attached());
    }
}
