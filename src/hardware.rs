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

//! Hardware context and startup initialization
//!
//! Owns the GPIO driver and the device registry for the life of the process.
//! Initialization reads every pin once and re-asserts it as an output at the
//! level it already had, so a device left running by a previous invocation
//! (or switched by hand) does not glitch.

use std::sync::Arc;

use tracing::{debug, warn};
use wp_error::{Result, WaterPiError};

use crate::gpio::{GpioDriver, PinId, PinLevel};
use crate::registry::{Device, DeviceRegistry};

/// What the legs of a device were doing at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceObservedState {
    Off,
    On,
    /// One leg energized, the other not: an interrupted sequence
    Partial,
}

impl DeviceObservedState {
    pub fn from_levels(primary: PinLevel, secondary: PinLevel) -> Self {
        match (primary.is_on(), secondary.is_on()) {
            (false, false) => Self::Off,
            (true, true) => Self::On,
            _ => Self::Partial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub device: Device,
    pub primary: PinLevel,
    pub secondary: PinLevel,
    pub observed: DeviceObservedState,
}

pub struct HardwareContext {
    gpio: Arc<dyn GpioDriver>,
    registry: Arc<DeviceRegistry>,
    statuses: Vec<DeviceStatus>,
}

impl HardwareContext {
    /// Read live pin state and configure every pin as an output at that level.
    pub fn initialize(gpio: Arc<dyn GpioDriver>, registry: Arc<DeviceRegistry>) -> Result<Self> {
        let mut statuses = Vec::with_capacity(registry.len());
        for device in registry.devices() {
            let primary = observe(gpio.as_ref(), device.pin_primary);
            let secondary = observe(gpio.as_ref(), device.pin_secondary);
            gpio.configure_pin_output(device.pin_primary, primary)
                .map_err(|e| WaterPiError::gpio(device.pin_primary.number(), "configure", e))?;
            gpio.configure_pin_output(device.pin_secondary, secondary)
                .map_err(|e| WaterPiError::gpio(device.pin_secondary.number(), "configure", e))?;
            statuses.push(DeviceStatus {
                device: device.clone(),
                primary,
                secondary,
                observed: DeviceObservedState::from_levels(primary, secondary),
            });
        }
        debug!("Hardware initialized for {} devices", statuses.len());
        Ok(Self { gpio, registry, statuses })
    }

    pub fn gpio(&self) -> &Arc<dyn GpioDriver> {
        &self.gpio
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Pin levels observed at initialization, in registry order
    pub fn statuses(&self) -> &[DeviceStatus] {
        &self.statuses
    }
}

/// Anything short of a conclusive "on" reading is treated as off.
fn observe(gpio: &dyn GpioDriver, pin: PinId) -> PinLevel {
    match gpio.read_pin(pin) {
        Ok(level) => level,
        Err(e) => {
            warn!("Error reading state for {}: {}; assuming off", pin, e);
            PinLevel::OFF
        }
    }
}
