//! Power switching port
//!
//! The power subsystem energises the modem before the driver issues any
//! request. The driver only sees it through this trait.

use serde::{Deserialize, Serialize};

use crate::domain::SbdResult;

/// Switched loads on the power distribution module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    Iridium,
    Imu,
}

/// Trait for the power distribution hardware
pub trait PowerSwitch: Send {
    fn switch_on(&mut self, device: Device) -> SbdResult<()>;

    fn switch_off(&mut self, device: Device) -> SbdResult<()>;
}
