/*
 * This file is part of WaterPi.
 *
 * Copyright (C) 2025 WaterPi contributors
 *
 * WaterPi is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * WaterPi is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with WaterPi. If not, see <https://www.gnu.org/licenses/>.
 */

//! Two-pin actuation state machine
//!
//! ```text
//! Disabled ──enable──▶ EnablingTransition ──▶ Enabled
//!    ▲                                           │
//!    └──────── DisablingTransition ◀──disable────┘
//! ```
//!
//! Enable drives the primary leg first and the secondary leg 250 ms later.
//! Disable is the mirror image with a 100 ms gap: secondary off first, then
//! primary. Both orders and both delays come from the driven hardware and
//! must not change.
//!
//! Any pin error inside a sequence hands over to the fallback controller
//! before the error is returned, so no sequence ever stops half way.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, error, info};
use wp_error::{Result, WaterPiError};

use crate::clock::Clock;
use crate::constants::sequencing::{DISABLE_SETTLE, ENABLE_SETTLE};
use crate::fallback::FallbackController;
use crate::gpio::{GpioDriver, PinId, PinLevel};
use crate::hardware::{DeviceObservedState, HardwareContext};
use crate::logger;
use crate::registry::{Device, DeviceRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Disabled,
    EnablingTransition,
    Enabled,
    DisablingTransition,
}

impl From<DeviceObservedState> for DeviceState {
    fn from(observed: DeviceObservedState) -> Self {
        match observed {
            DeviceObservedState::Off => Self::Disabled,
            DeviceObservedState::On => Self::Enabled,
            // Only a disable can resolve a half-on device.
            DeviceObservedState::Partial => Self::DisablingTransition,
        }
    }
}

pub struct Actuator {
    gpio: Arc<dyn GpioDriver>,
    registry: Arc<DeviceRegistry>,
    fallback: Arc<FallbackController>,
    clock: Arc<dyn Clock>,
    states: Mutex<Vec<DeviceState>>,
}

impl Actuator {
    pub fn new(hardware: &HardwareContext, fallback: Arc<FallbackController>, clock: Arc<dyn Clock>) -> Self {
        let states = hardware
            .statuses()
            .iter()
            .map(|s| DeviceState::from(s.observed))
            .collect();
        Self {
            gpio: hardware.gpio().clone(),
            registry: hardware.registry().clone(),
            fallback,
            clock,
            states: Mutex::new(states),
        }
    }

    pub fn state(&self, name: &str) -> Result<DeviceState> {
        let (idx, _) = self.resolve(name)?;
        Ok(self.states.lock()[idx])
    }

    /// Primary on, settle, secondary on.
    pub fn enable(&self, name: &str) -> Result<()> {
        if self.fallback.is_engaged() {
            return Err(WaterPiError::FallbackEngaged);
        }
        let (idx, device) = self.resolve(name)?;
        info!("Enabling {}", device.display_name());

        self.set_state(idx, DeviceState::EnablingTransition);
        self.sequence(|| {
            self.drive(device.pin_primary, PinLevel::ON)?;
            self.clock.sleep(ENABLE_SETTLE);
            self.drive(device.pin_secondary, PinLevel::ON)
        })?;
        self.set_state(idx, DeviceState::Enabled);

        logger::log_event("enable", json!({ "device": device.name }));
        Ok(())
    }

    /// Secondary off, settle, primary off.
    pub fn disable(&self, name: &str) -> Result<()> {
        let (idx, device) = self.resolve(name)?;
        info!("Disabling {}", device.display_name());

        self.set_state(idx, DeviceState::DisablingTransition);
        self.sequence(|| {
            self.drive(device.pin_secondary, PinLevel::OFF)?;
            self.clock.sleep(DISABLE_SETTLE);
            self.drive(device.pin_primary, PinLevel::OFF)
        })?;
        self.set_state(idx, DeviceState::Disabled);

        logger::log_event("disable", json!({ "device": device.name }));
        Ok(())
    }

    /// Enable, hold for `duration`, disable.
    ///
    /// The disable runs on every way out of the hold, including a panic.
    pub fn enable_for(&self, name: &str, duration: Duration) -> Result<()> {
        let guard = self.enable_scoped(name)?;
        info!("Holding {} on for {:?}", guard.device().display_name(), duration);
        self.clock.sleep(duration);
        guard.release()
    }

    /// Enable a device and return a guard that disables it when dropped.
    pub fn enable_scoped(&self, name: &str) -> Result<EnabledGuard<'_>> {
        self.enable(name)?;
        let (_, device) = self.resolve(name)?;
        Ok(EnabledGuard {
            actuator: self,
            device,
            released: false,
        })
    }

    fn resolve(&self, name: &str) -> Result<(usize, &Device)> {
        self.registry.lookup_indexed(name)
    }

    fn drive(&self, pin: PinId, level: PinLevel) -> Result<()> {
        debug!("{} -> {}", pin, level);
        self.gpio
            .write_pin(pin, level)
            .map_err(|e| WaterPiError::gpio(pin.number(), "write", e))
    }

    /// Run a pin sequence; on failure, force everything off before returning the error.
    fn sequence(&self, steps: impl FnOnce() -> Result<()>) -> Result<()> {
        steps().map_err(|e| {
            error!("Actuation failed: {}", e);
            self.fallback.disable_all();
            self.states.lock().fill(DeviceState::Disabled);
            e
        })
    }

    fn set_state(&self, idx: usize, state: DeviceState) {
        if let Some(slot) = self.states.lock().get_mut(idx) {
            *slot = state;
        }
    }
}

/// A device held on; dropping it without [`EnabledGuard::release`] still disables.
pub struct EnabledGuard<'a> {
    actuator: &'a Actuator,
    device: &'a Device,
    released: bool,
}

impl EnabledGuard<'_> {
    pub fn device(&self) -> &Device {
        self.device
    }

    /// Disable the device and report the result.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.actuator.disable(&self.device.name)
    }
}

impl Drop for EnabledGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // disable() already runs the fallback if it fails.
        if let Err(e) = self.actuator.disable(&self.device.name) {
            error!("Error during cleanup of {}: {}", self.device.display_name(), e);
        }
    }
}
