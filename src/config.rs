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

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use wp_error::{Result, WaterPiError};

use crate::constants::paths;
use crate::registry::{default_devices, Device, DeviceRegistry};

/// How the external watchdog is launched and where its pipe lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WatchdogSettings {
    /// Script receiving `<pipe_path> <deadline_secs>`
    pub script: PathBuf,
    /// Interpreter for the script
    pub shell: PathBuf,
    /// Directory for rendezvous pipes
    pub pipe_dir: PathBuf,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            script: PathBuf::from(paths::WATCHDOG_SCRIPT),
            shell: PathBuf::from(paths::WATCHDOG_SHELL),
            pipe_dir: PathBuf::from(paths::PIPE_DIR),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub devices: Vec<Device>,
    /// sysfs GPIO class directory
    pub gpio_root: PathBuf,
    pub fail_flag: PathBuf,
    pub watchdog: WatchdogSettings,
    pub audit_log: PathBuf,
    /// Send diagnostics to journald when its socket is present
    pub log_to_journald: bool,
    /// File this configuration was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            devices: default_devices(),
            gpio_root: PathBuf::from(paths::GPIO_ROOT),
            fail_flag: PathBuf::from(paths::FAIL_FLAG),
            watchdog: WatchdogSettings::default(),
            audit_log: PathBuf::from(paths::AUDIT_LOG),
            log_to_journald: false,
            source: None,
        }
    }
}

impl Config {
    /// Freeze the configured devices into a validated registry.
    pub fn registry(&self) -> Result<DeviceRegistry> {
        DeviceRegistry::new(self.devices.clone())
    }
}

/// Candidate config locations, most specific first.
pub fn config_candidates() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(p) = env::var(paths::CONFIG_ENV) {
        if !p.is_empty() {
            out.push(PathBuf::from(p));
        }
    }
    if let Some(dir) = dirs::config_dir() {
        out.push(dir.join(paths::APP_DIR).join(paths::CONFIG_FILE));
    }
    out.push(PathBuf::from(paths::SYSTEM_CONFIG));
    out
}

pub fn parse_config(data: &str) -> Result<Config> {
    let config: Config = serde_json::from_str(data)?;
    // Surface registry problems at load time rather than mid-command.
    config.registry()?;
    Ok(config)
}

pub fn load_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .map_err(|e| WaterPiError::config(format!("cannot read {}: {}", path.display(), e)))?;
    let mut config = parse_config(&data)?;
    config.source = Some(path.to_path_buf());
    Ok(config)
}

/// Load configuration.
///
/// An explicit path must exist. Otherwise the first existing candidate is
/// used, and built-in defaults apply when there is none.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }
    for candidate in config_candidates() {
        if candidate.is_file() {
            debug!("Loading config from {}", candidate.display());
            return load_config_file(&candidate);
        }
    }
    debug!("No config file found; using defaults");
    Ok(Config::default())
}
