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

//! Command Line Interface

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use wp_error::{Result, WaterPiError};

use crate::commands::Command;

#[derive(Parser, Debug)]
#[command(name = "waterpi")]
#[command(version)]
#[command(about = "WaterPi - fail-safe pump and heater control")]
#[command(long_about = "WaterPi - fail-safe pump and heater control

Every device is switched by two relays in series. State changes run under an
external watchdog; on any error, fatal signal or missed rendezvous all relays
are forced off and the process exits with status 1.

EXAMPLES:
    waterpi status                     Show relay levels for every device
    waterpi enable pump                Turn the pump on and leave it on
    waterpi disable heater             Turn the heater off
    waterpi enable_for pump 30000      Run the pump for 30 seconds
    waterpi kill                       Force every relay off

ENVIRONMENT VARIABLES:
    WATERPI_LOG=debug      Diagnostic log filter
    WATERPI_CONFIG=PATH    Configuration file

FILES:
    ~/.config/waterpi/config.json      User configuration
    /etc/waterpi/config.json           System configuration
    /var/lib/waterpi/fail              Fail flag, blocks enable/disable while present")]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Append JSON audit events to the configured audit log
    #[arg(long)]
    pub logging: bool,

    /// Action to perform
    #[arg(value_enum)]
    pub action: Action,

    /// Device name (enable, disable, enable_for)
    pub device: Option<String>,

    /// Duration in milliseconds (enable_for)
    pub duration: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Status,
    Enable,
    Disable,
    #[value(name = "enable_for", alias = "enable-for")]
    EnableFor,
    Kill,
}

impl Cli {
    pub fn command(&self) -> Result<Command> {
        match self.action {
            Action::Status => Ok(Command::Status),
            Action::Kill => Ok(Command::Kill),
            Action::Enable => Ok(Command::Enable { device: self.device()? }),
            Action::Disable => Ok(Command::Disable { device: self.device()? }),
            Action::EnableFor => {
                let device = self.device()?;
                let duration_ms = self.duration.ok_or(WaterPiError::MissingArgument("duration"))?;
                Ok(Command::EnableFor { device, duration_ms })
            }
        }
    }

    fn device(&self) -> Result<String> {
        self.device.clone().ok_or(WaterPiError::MissingArgument("device"))
    }
}
