//! sbd-probe: check an SBD modem from the command line.
//!
//! Usage: `sbd-probe <config.json> [message]`
//!
//! Prints the modem identity, signal and buffer status. With a message
//! argument, loads it as text and runs one session. `RUST_LOG=debug` shows
//! every AT exchange.

use std::path::PathBuf;
use std::process::ExitCode;

use iridium_sbd::adapters::serial_port::SerialPortFactory;
use iridium_sbd::ports::SerialFactory;
use iridium_sbd::{DriverConfig, SbdModem, SbdResult};

fn probe(config_path: PathBuf, message: Option<String>) -> SbdResult<()> {
    let config = DriverConfig::load(&config_path)?;
    let mut modem = SbdModem::open::<SerialPortFactory>(config)?;
    modem.configure()?;

    let identity = modem.identity()?;
    println!("Model:    {}", identity.model);
    println!("Revision: {}", identity.revision);
    println!("IMEI:     {}", identity.imei);

    let signal = modem.signal_quality()?;
    println!("Signal:   {}/5", signal.bars());

    match modem.network_time()? {
        Some(time) => println!("Network:  {} ticks", time.ticks),
        None => println!("Network:  no service"),
    }

    let status = modem.buffer_status_ex()?;
    println!(
        "Buffers:  MO {} (#{}), MT {} (#{}), ring alert {}, {} waiting",
        status.mo_has_message,
        status.mo_sequence,
        status.mt_has_message,
        status.mt_sequence,
        status.ring_alert_pending,
        status.mt_queued_count
    );

    if let Some(message) = message {
        let report = modem.send_text(&message)?;
        println!(
            "Session:  MO {:?} #{}, MT {:?}",
            report.result.mo_status, report.result.mo_sequence, report.result.mt_status
        );
        if let Some(mt) = report.mt_message {
            println!("Received: {}", String::from_utf8_lossy(&mt));
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        eprintln!("usage: sbd-probe <config.json> [message]");
        match SerialPortFactory::list_ports() {
            Ok(ports) => {
                for port in ports {
                    eprintln!("  {} ({})", port.name, port.port_type);
                }
            }
            Err(e) => eprintln!("{e}"),
        }
        return ExitCode::FAILURE;
    };

    match probe(PathBuf::from(config_path), args.next()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("sbd-probe: {e}");
            ExitCode::FAILURE
        }
    }
}
