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

//! Device registry
//!
//! Fixed mapping from device name to its two relay pins. Built once at
//! process start and never mutated afterwards.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use wp_error::{Result, WaterPiError};

use crate::constants::devices;
use crate::gpio::PinId;

/// A two-leg actuator (pump, heater)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Device {
    /// Lookup key used on the command line
    pub name: String,
    /// Human-readable name for status output
    #[serde(default)]
    pub label: String,
    /// Leads on enable, trails on disable
    pub pin_primary: PinId,
    /// Trails on enable, leads on disable
    pub pin_secondary: PinId,
}

impl Device {
    pub fn new(name: &str, label: &str, pin_primary: u32, pin_secondary: u32) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            pin_primary: PinId(pin_primary),
            pin_secondary: PinId(pin_secondary),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.label.is_empty() { &self.name } else { &self.label }
    }

    pub fn pins(&self) -> [PinId; 2] {
        [self.pin_primary, self.pin_secondary]
    }
}

#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Validate and freeze a device list.
    ///
    /// Names must be unique and non-empty; no pin may appear twice, neither
    /// within one device nor across devices.
    pub fn new(devices: Vec<Device>) -> Result<Self> {
        if devices.is_empty() {
            return Err(WaterPiError::invalid_registry("no devices configured"));
        }
        let mut names = HashSet::new();
        let mut pins = HashSet::new();
        for device in &devices {
            if device.name.is_empty() || device.name.chars().any(char::is_whitespace) {
                return Err(WaterPiError::invalid_registry(format!(
                    "invalid device name '{}'",
                    device.name
                )));
            }
            if !names.insert(device.name.as_str()) {
                return Err(WaterPiError::invalid_registry(format!(
                    "duplicate device name '{}'",
                    device.name
                )));
            }
            for pin in device.pins() {
                if !pins.insert(pin) {
                    return Err(WaterPiError::invalid_registry(format!(
                        "{} is assigned more than once (device '{}')",
                        pin, device.name
                    )));
                }
            }
        }
        Ok(Self { devices })
    }

    pub fn lookup(&self, name: &str) -> Result<&Device> {
        self.lookup_indexed(name).map(|(_, d)| d)
    }

    /// Lookup that also returns the registration index
    pub fn lookup_indexed(&self, name: &str) -> Result<(usize, &Device)> {
        self.devices
            .iter()
            .enumerate()
            .find(|(_, d)| d.name == name)
            .ok_or_else(|| WaterPiError::UnknownDevice {
                name: name.to_string(),
                known: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name.as_str())
    }

    /// Every pin owned by a registered device
    pub fn pins(&self) -> impl Iterator<Item = PinId> + '_ {
        self.devices.iter().flat_map(Device::pins)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Longest display name, for aligned status output
    pub fn name_width(&self) -> usize {
        self.devices.iter().map(|d| d.display_name().len()).max().unwrap_or(0)
    }
}

/// The stock wiring: pump on 17/27, heater on 23/24
pub fn default_devices() -> Vec<Device> {
    vec![
        Device::new("pump", "Pump", devices::PUMP_PRIMARY, devices::PUMP_SECONDARY),
        Device::new("heater", "Heater", devices::HEATER_PRIMARY, devices::HEATER_SECONDARY),
    ]
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self { devices: default_devices() }
    }
}
