//! Adapter implementations of port traits

pub mod mock_modem;
pub mod serial_port;
