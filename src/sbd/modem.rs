//! SbdModem: the driver facade.
//!
//! Owns the `AtChannel` and the session state machine. Housekeeping queries
//! never touch session state; buffer writes and reads are plain commands;
//! `run_session` and friends go through `SbdSession`.

use crate::at::binary;
use crate::at::decode::{
    extract_payload, extract_unlabeled, parse_buffer_status, parse_buffer_status_ex,
    parse_copy_size, parse_geolocation, parse_network_time, parse_registration, parse_signal,
    parse_text_message,
};
use crate::at::{encode, AtChannel, AtCommand, Setting};
use crate::domain::{
    BufferState, ClearSelector, DriverConfig, Geolocation, ModemIdentity, NetworkTime,
    ParseError, Registration, RingAlertPolicy, SbdError, SbdResult, SignalQuality,
    TransferError, MAX_TEXT_PAYLOAD,
};
use crate::ports::{SerialConnection, SerialFactory};

use super::session::{clear_buffers, Initiation, SbdSession, SessionReport, SessionState};

pub struct SbdModem {
    channel: AtChannel,
    session: SbdSession,
    config: DriverConfig,
}

impl SbdModem {
    /// Wrap an already open transport. The modem is assumed powered and
    /// registered.
    pub fn new(serial: Box<dyn SerialConnection>, config: DriverConfig) -> SbdResult<Self> {
        config.validate()?;
        let channel = AtChannel::new(serial, config.poll_interval(), config.min_timeout());
        Ok(Self {
            channel,
            session: SbdSession::new(),
            config,
        })
    }

    /// Open the port named in `config` through `F`.
    pub fn open<F: SerialFactory>(config: DriverConfig) -> SbdResult<Self> {
        let port = config
            .port
            .clone()
            .ok_or_else(|| SbdError::Config("no serial port configured".into()))?;
        let serial = F::open(&port, config.baud_rate)?;
        Self::new(serial, config)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Push the configured echo mode and session timeout to the modem.
    pub fn configure(&mut self) -> SbdResult<()> {
        self.channel.request(&AtCommand::Echo(self.config.echo))?;
        if let Some(secs) = self.config.session_timeout_secs {
            self.set_session_timeout(secs)?;
        }
        log::info!(
            "SBD modem configured (echo {}, session timeout {:?})",
            self.config.echo,
            self.config.session_timeout_secs
        );
        Ok(())
    }

    fn unlabeled(&mut self, cmd: AtCommand) -> SbdResult<String> {
        let raw = self.channel.request(&cmd)?;
        let text = extract_unlabeled(&raw, &encode(&cmd))?;
        Ok(text.to_string())
    }

    // -----------------------------------------------------------------------
    // Housekeeping queries
    // -----------------------------------------------------------------------

    pub fn buffer_status(&mut self) -> SbdResult<BufferState> {
        let raw = self.channel.request(&AtCommand::BufferStatus)?;
        Ok(parse_buffer_status(&raw)?)
    }

    /// Buffer status including the ring alert flag and the gateway queue.
    pub fn buffer_status_ex(&mut self) -> SbdResult<BufferState> {
        let raw = self.channel.request(&AtCommand::BufferStatusEx)?;
        Ok(parse_buffer_status_ex(&raw)?)
    }

    /// Active signal check; may take up to ten seconds.
    pub fn signal_quality(&mut self) -> SbdResult<SignalQuality> {
        let raw = self.channel.request(&AtCommand::SignalQuality)?;
        Ok(parse_signal(&raw, "CSQ")?)
    }

    /// Last known signal quality, answered immediately.
    pub fn last_signal_quality(&mut self) -> SbdResult<SignalQuality> {
        let raw = self.channel.request(&AtCommand::LastSignalQuality)?;
        Ok(parse_signal(&raw, "CSQF")?)
    }

    /// `None` when the modem has no network service.
    pub fn network_time(&mut self) -> SbdResult<Option<NetworkTime>> {
        let raw = self.channel.request(&AtCommand::NetworkTime)?;
        Ok(parse_network_time(&raw)?)
    }

    pub fn geolocation(&mut self) -> SbdResult<Geolocation> {
        let raw = self.channel.request(&AtCommand::Geolocation)?;
        Ok(parse_geolocation(&raw)?)
    }

    pub fn model(&mut self) -> SbdResult<String> {
        self.unlabeled(AtCommand::Model)
    }

    pub fn revision(&mut self) -> SbdResult<String> {
        self.unlabeled(AtCommand::Revision)
    }

    pub fn imei(&mut self) -> SbdResult<String> {
        self.unlabeled(AtCommand::Imei)
    }

    pub fn identity(&mut self) -> SbdResult<ModemIdentity> {
        Ok(ModemIdentity {
            model: self.model()?,
            revision: self.revision()?,
            imei: self.imei()?,
        })
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn ring_alerts_enabled(&mut self) -> SbdResult<bool> {
        let raw = self.channel.request(&AtCommand::RingAlert(Setting::Query))?;
        let fields = extract_payload(&raw, "SBDMTA")?;
        let flag = fields
            .first()
            .ok_or_else(|| ParseError::MissingField {
                label: "SBDMTA".into(),
                index: 0,
            })?
            .as_flag()?;
        Ok(flag)
    }

    pub fn set_ring_alerts(&mut self, enabled: bool) -> SbdResult<()> {
        self.channel
            .request(&AtCommand::RingAlert(Setting::Set(enabled)))?;
        Ok(())
    }

    /// Session timeout in seconds, 0 meaning none.
    pub fn session_timeout(&mut self) -> SbdResult<u32> {
        let raw = self
            .channel
            .request(&AtCommand::SessionTimeout(Setting::Query))?;
        let fields = extract_payload(&raw, "SBDST")?;
        let secs = fields
            .first()
            .ok_or_else(|| ParseError::MissingField {
                label: "SBDST".into(),
                index: 0,
            })?
            .parse()?;
        Ok(secs)
    }

    pub fn set_session_timeout(&mut self, secs: u32) -> SbdResult<()> {
        self.channel
            .request(&AtCommand::SessionTimeout(Setting::Set(secs)))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Buffers
    // -----------------------------------------------------------------------

    /// Load a text message into the MO buffer. Validated before any I/O.
    /// Refused with `SessionInProgress` while an unconfirmed clear is pending.
    pub fn write_text(&mut self, text: &str) -> SbdResult<()> {
        self.ensure_idle()?;
        if text.len() > MAX_TEXT_PAYLOAD {
            return Err(TransferError::PayloadTooLarge {
                len: text.len(),
                max: MAX_TEXT_PAYLOAD,
            }
            .into());
        }
        if text.contains(|c: char| c == '\r' || c == '\n') {
            return Err(TransferError::InvalidText.into());
        }
        self.channel
            .request(&AtCommand::WriteText(text.to_string()))?;
        Ok(())
    }

    /// Text in the MT buffer; empty when the buffer is empty.
    pub fn read_text(&mut self) -> SbdResult<String> {
        let raw = self.channel.request(&AtCommand::ReadText)?;
        Ok(parse_text_message(&raw)?)
    }

    pub fn write_binary(&mut self, payload: &[u8]) -> SbdResult<()> {
        self.ensure_idle()?;
        binary::write_binary(&mut self.channel, payload)
    }

    pub fn read_binary(&mut self) -> SbdResult<Vec<u8>> {
        binary::read_binary(&mut self.channel)
    }

    /// Clear one or both buffers. Clearing both after a failed session clear
    /// is the same as `recover` and returns the session to `Idle`.
    pub fn clear_buffers(&mut self, selector: ClearSelector) -> SbdResult<()> {
        if selector == ClearSelector::Both && !self.session.is_idle() {
            return self.recover();
        }
        clear_buffers(&mut self.channel, selector)
    }

    /// Loop the MO buffer back into the MT buffer. Returns the copied size.
    pub fn copy_mo_to_mt(&mut self) -> SbdResult<usize> {
        let raw = self.channel.request(&AtCommand::CopyMoToMt)?;
        Ok(parse_copy_size(&raw)?)
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Extended session (`AT+SBDIX`).
    pub fn run_session(&mut self) -> SbdResult<SessionReport> {
        self.run(Initiation::Extended {
            answer_ring_alert: false,
            location: None,
        })
    }

    /// Basic session (`AT+SBDI`).
    pub fn run_basic_session(&mut self) -> SbdResult<SessionReport> {
        self.run(Initiation::Basic)
    }

    /// Session answering a pending ring alert (`AT+SBDIXA`).
    pub fn answer_ring_alert(&mut self) -> SbdResult<SessionReport> {
        self.run(Initiation::Extended {
            answer_ring_alert: true,
            location: None,
        })
    }

    pub fn run(&mut self, initiation: Initiation) -> SbdResult<SessionReport> {
        self.session.run(&mut self.channel, &initiation)
    }

    /// Load a text message and send it in one session.
    pub fn send_text(&mut self, text: &str) -> SbdResult<SessionReport> {
        self.ensure_idle()?;
        self.write_text(text)?;
        self.run_session()
    }

    /// Load a binary message and send it in one session.
    pub fn send_binary(&mut self, payload: &[u8]) -> SbdResult<SessionReport> {
        self.ensure_idle()?;
        self.write_binary(payload)?;
        self.run_session()
    }

    fn ensure_idle(&self) -> SbdResult<()> {
        if self.session.is_idle() {
            Ok(())
        } else {
            Err(SbdError::SessionInProgress {
                state: self.session.state().to_string(),
            })
        }
    }

    /// Re-clear both buffers after `BufferClearFailed`.
    pub fn recover(&mut self) -> SbdResult<()> {
        self.session.recover(&mut self.channel)
    }

    pub fn ring_alert_pending(&mut self) -> SbdResult<bool> {
        Ok(self.buffer_status_ex()?.ring_alert_pending)
    }

    /// Service ring alerts according to the configured policy. Under
    /// `AnswerWhenIdle` a pending alert is answered with a full session.
    pub fn idle_tick(&mut self) -> SbdResult<Option<SessionReport>> {
        if self.config.ring_alert_policy == RingAlertPolicy::Poll || !self.session.is_idle() {
            return Ok(None);
        }
        if !self.ring_alert_pending()? {
            return Ok(None);
        }
        log::info!("Ring alert pending, answering");
        self.answer_ring_alert().map(Some)
    }

    /// Manual network registration, optionally with a location string.
    pub fn register(&mut self, location: Option<&str>) -> SbdResult<Registration> {
        let raw = self
            .channel
            .request(&AtCommand::Register(location.map(str::to_string)))?;
        Ok(parse_registration(&raw)?)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn soft_reset(&mut self, profile: u8) -> SbdResult<()> {
        if profile > 1 {
            return Err(SbdError::Config(format!("no stored profile {profile}")));
        }
        self.channel.request(&AtCommand::SoftReset(profile))?;
        Ok(())
    }

    /// Clear both buffers, then flush the modem's state for power-down.
    pub fn shutdown(&mut self) -> SbdResult<()> {
        log::info!("SBD modem shutting down");
        self.clear_buffers(ClearSelector::Both)?;
        self.channel.request(&AtCommand::PowerDown)?;
        self.channel.close()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_modem::{MockModem, MockModemHandle};
    use crate::domain::{MoStatus, MtStatus};

    fn modem_with(config: DriverConfig) -> (SbdModem, MockModemHandle) {
        let mock = MockModem::new();
        let handle = mock.handle();
        (SbdModem::new(Box::new(mock), config).unwrap(), handle)
    }

    fn modem() -> (SbdModem, MockModemHandle) {
        modem_with(DriverConfig {
            poll_interval_ms: 1,
            ..DriverConfig::default()
        })
    }

    #[test]
    fn rejects_invalid_config() {
        let config = DriverConfig {
            poll_interval_ms: 0,
            ..DriverConfig::default()
        };
        assert!(matches!(
            SbdModem::new(Box::new(MockModem::new()), config),
            Err(SbdError::Config(_))
        ));
    }

    #[test]
    fn identity_strips_echo() {
        let (mut m, _) = modem();
        let id = m.identity().unwrap();
        assert_eq!(id.model, "IRIDIUM 9600 Family SBD Transceiver");
        assert_eq!(id.imei, "300234010753370");
        assert!(id.revision.contains("TA16005"));
    }

    #[test]
    fn identity_without_echo() {
        let (mut m, modem) = modem_with(DriverConfig {
            poll_interval_ms: 1,
            echo: false,
            ..DriverConfig::default()
        });
        m.configure().unwrap();
        assert!(!modem.with(|s| s.echo));
        assert_eq!(m.imei().unwrap(), "300234010753370");
    }

    #[test]
    fn signal_and_time() {
        let (mut m, modem) = modem();
        modem.with(|s| s.signal = 3);
        assert_eq!(m.signal_quality().unwrap(), SignalQuality(3));
        assert_eq!(m.last_signal_quality().unwrap().bars(), 3);
        assert_eq!(
            m.network_time().unwrap(),
            Some(NetworkTime { ticks: 0x1a2b_3c4d })
        );
        modem.with(|s| s.network_ticks = None);
        assert_eq!(m.network_time().unwrap(), None);
    }

    #[test]
    fn settings_round_trip_through_modem() {
        let (mut m, _) = modem();
        m.set_session_timeout(90).unwrap();
        assert_eq!(m.session_timeout().unwrap(), 90);
        m.set_ring_alerts(false).unwrap();
        assert!(!m.ring_alerts_enabled().unwrap());
    }

    #[test]
    fn configure_applies_session_timeout() {
        let (mut m, modem) = modem_with(DriverConfig {
            poll_interval_ms: 1,
            session_timeout_secs: Some(45),
            ..DriverConfig::default()
        });
        m.configure().unwrap();
        assert_eq!(modem.with(|s| s.session_timeout), 45);
    }

    #[test]
    fn text_validation_happens_before_io() {
        let (mut m, modem) = modem();
        let long = "x".repeat(MAX_TEXT_PAYLOAD + 1);
        assert!(matches!(
            m.write_text(&long),
            Err(SbdError::Transfer(TransferError::PayloadTooLarge { .. }))
        ));
        assert!(matches!(
            m.write_text("two\r\nlines"),
            Err(SbdError::Transfer(TransferError::InvalidText))
        ));
        assert!(modem.commands().is_empty());
    }

    #[test]
    fn text_loopback_via_self_test() {
        let (mut m, _) = modem();
        m.write_text("hello world").unwrap();
        assert_eq!(m.copy_mo_to_mt().unwrap(), 11);
        assert_eq!(m.read_text().unwrap(), "hello world");
    }

    #[test]
    fn send_text_delivers_and_clears() {
        let (mut m, modem) = modem();
        let report = m.send_text("position 51.5N 0.1W").unwrap();
        assert_eq!(report.result.mo_status, MoStatus::Sent);
        assert!(report.before.mo_has_message);
        assert_eq!(modem.delivered(), vec![b"position 51.5N 0.1W".to_vec()]);
        assert!(m.buffer_status().unwrap().is_empty());
    }

    #[test]
    fn text_spelling_markers_is_stored_with_echo_on() {
        let (mut m, modem) = modem();
        assert!(m.config().echo);
        m.write_text("ERROR count 3").unwrap();
        assert_eq!(
            modem.with(|s| s.mo_buffer.clone()),
            Some(b"ERROR count 3".to_vec())
        );

        let report = m.send_text("BOOK club").unwrap();
        assert_eq!(report.result.mo_status, MoStatus::Sent);
        assert_eq!(modem.delivered(), vec![b"BOOK club".to_vec()]);
    }

    #[test]
    fn clearing_both_after_failed_clear_returns_to_idle() {
        let (mut m, modem) = modem();
        modem.with(|s| s.fail_clear = true);
        assert!(m.send_text("one").is_err());
        assert_eq!(m.session_state(), SessionState::TransferInitiated);

        let sent = modem.commands().len();
        assert!(matches!(
            m.write_text("two"),
            Err(SbdError::SessionInProgress { .. })
        ));
        assert!(matches!(
            m.write_binary(b"two"),
            Err(SbdError::SessionInProgress { .. })
        ));
        assert_eq!(modem.commands().len(), sent);

        modem.with(|s| s.fail_clear = false);
        m.clear_buffers(ClearSelector::Mo).unwrap();
        assert_eq!(m.session_state(), SessionState::TransferInitiated);
        m.clear_buffers(ClearSelector::Both).unwrap();
        assert_eq!(m.session_state(), SessionState::Idle);
        m.send_text("two").unwrap();
    }

    #[test]
    fn idle_tick_is_noop_under_poll() {
        let (mut m, modem) = modem();
        modem.queue_mt(b"cmd");
        assert_eq!(m.idle_tick().unwrap(), None);
        assert!(modem.commands().is_empty());
        assert!(m.ring_alert_pending().unwrap());
    }

    #[test]
    fn idle_tick_answers_ring_alert() {
        let (mut m, modem) = modem_with(DriverConfig {
            poll_interval_ms: 1,
            ring_alert_policy: RingAlertPolicy::AnswerWhenIdle,
            ..DriverConfig::default()
        });
        assert_eq!(m.idle_tick().unwrap(), None);

        modem.queue_mt(b"reboot");
        let report = m.idle_tick().unwrap().unwrap();
        assert_eq!(report.result.mt_status, MtStatus::Received);
        assert_eq!(report.mt_message, Some(b"reboot".to_vec()));
        assert!(modem.commands().contains(&"AT+SBDIXA".to_string()));
        assert!(!m.ring_alert_pending().unwrap());
    }

    #[test]
    fn register_and_geolocate() {
        let (mut m, _) = modem();
        let reg = m.register(None).unwrap();
        assert_eq!(reg.status, crate::domain::RegistrationStatus::Registered);
        let geo = m.geolocation().unwrap();
        assert_eq!((geo.x, geo.y, geo.z), (-2342, 5184, 2250));
    }

    #[test]
    fn soft_reset_rejects_unknown_profile() {
        let (mut m, modem) = modem();
        assert!(matches!(m.soft_reset(2), Err(SbdError::Config(_))));
        m.soft_reset(0).unwrap();
        assert_eq!(modem.commands(), vec!["ATZ0"]);
    }

    #[test]
    fn shutdown_clears_then_powers_down() {
        let (mut m, modem) = modem();
        m.write_text("pending").unwrap();
        m.shutdown().unwrap();
        assert_eq!(modem.commands()[1..], ["AT+SBDD2", "AT*F"]);
        assert!(!m.is_connected());
    }
}
