//! SBD messaging: the session state machine and the modem facade.

pub mod modem;
pub mod session;

pub use modem::SbdModem;
pub use session::{Initiation, SbdSession, SessionReport, SessionState};
