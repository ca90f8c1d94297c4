//! Power state of the switched loads.
//!
//! The driver expects the modem to be energised before it is opened;
//! `PowerManager` is the collaborator that does that. Switching is
//! idempotent and the recorded state only changes once the switch confirms.

use serde::{Deserialize, Serialize};

use crate::domain::SbdResult;
use crate::ports::{Device, PowerSwitch};

/// Which loads are currently powered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePowerState {
    pub iridium: bool,
    pub imu: bool,
}

impl DevicePowerState {
    pub fn is_on(&self, device: Device) -> bool {
        match device {
            Device::Iridium => self.iridium,
            Device::Imu => self.imu,
        }
    }

    fn set(&mut self, device: Device, on: bool) {
        match device {
            Device::Iridium => self.iridium = on,
            Device::Imu => self.imu = on,
        }
    }
}

pub struct PowerManager<S: PowerSwitch> {
    switch: S,
    state: DevicePowerState,
}

impl<S: PowerSwitch> PowerManager<S> {
    /// All loads start off.
    pub fn new(switch: S) -> Self {
        Self {
            switch,
            state: DevicePowerState::default(),
        }
    }

    pub fn state(&self) -> DevicePowerState {
        self.state
    }

    pub fn power_on(&mut self, device: Device) -> SbdResult<()> {
        if self.state.is_on(device) {
            log::debug!("{device:?} already on");
            return Ok(());
        }
        self.switch.switch_on(device)?;
        self.state.set(device, true);
        log::info!("{device:?} powered on");
        Ok(())
    }

    pub fn power_off(&mut self, device: Device) -> SbdResult<()> {
        if !self.state.is_on(device) {
            log::debug!("{device:?} already off");
            return Ok(());
        }
        self.switch.switch_off(device)?;
        self.state.set(device, false);
        log::info!("{device:?} powered off");
        Ok(())
    }

    /// Switch every powered load off, stopping at the first failure.
    pub fn power_off_all(&mut self) -> SbdResult<()> {
        for device in [Device::Iridium, Device::Imu] {
            self.power_off(device)?;
        }
        Ok(())
    }
}
