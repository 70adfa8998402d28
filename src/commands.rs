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

//! Command execution
//!
//! Validation (registry, fail-flag, device name) runs before the GPIO
//! driver is even opened, so a rejected command never touches a pin. After
//! that every state-changing command runs inside a watchdog window, and any
//! error that may have left hardware in doubt ends in the fallback.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::style::{Color, Stylize};
use tracing::{debug, error};
use wp_error::{Result, WaterPiError};

use crate::actuator::Actuator;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::console;
use crate::constants::{exit, paths, watchdog::SINGLE_STEP_WINDOW_MS};
use crate::failflag::FailFlag;
use crate::fallback::FallbackController;
use crate::gpio::GpioDriver;
use crate::hardware::HardwareContext;
use crate::registry::DeviceRegistry;
use crate::signals;
use crate::watchdog::WatchdogSupervisor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Enable { device: String },
    Disable { device: String },
    EnableFor { device: String, duration_ms: u64 },
    Kill,
}

impl Command {
    pub fn device(&self) -> Option<&str> {
        match self {
            Command::Enable { device } | Command::Disable { device } | Command::EnableFor { device, .. } => {
                Some(device)
            }
            Command::Status | Command::Kill => None,
        }
    }

    /// Commands gated by the fail-flag and guarded by the watchdog
    pub fn changes_state(&self) -> bool {
        self.device().is_some()
    }
}

/// Result of one invocation
#[derive(Debug)]
pub struct Outcome {
    pub exit_code: i32,
    pub error: Option<WaterPiError>,
    pub fallback_engaged: bool,
}

pub struct Runner {
    config: Config,
    clock: Arc<dyn Clock>,
    route_signals: bool,
}

impl Runner {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            route_signals: true,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Leave process signal dispositions alone
    pub fn without_signal_routing(mut self) -> Self {
        self.route_signals = false;
        self
    }

    /// Run `command`, opening the GPIO driver only once validation has passed.
    pub fn run<F>(&self, command: &Command, open_gpio: F) -> Outcome
    where
        F: FnOnce(&DeviceRegistry) -> io::Result<Arc<dyn GpioDriver>>,
    {
        let mut fallback = None;
        let result = self.execute(command, open_gpio, &mut fallback);

        if let (Err(e), Some(fb)) = (&result, &fallback) {
            if e.requires_fallback() && !fb.is_engaged() {
                error!("Error in {:?}: {}", command, e);
                fb.disable_all();
            }
        }
        let fallback_engaged = fallback.as_ref().is_some_and(|fb| fb.is_engaged());

        match result {
            Ok(()) if !fallback_engaged => {
                if matches!(command, Command::Enable { .. } | Command::Disable { .. }) {
                    console::dprint("Leaving devices in their current state.");
                }
                console::notice("Done! 💧", Color::Blue);
                Outcome { exit_code: exit::OK, error: None, fallback_engaged }
            }
            Ok(()) => Outcome { exit_code: exit::FAILURE, error: None, fallback_engaged },
            Err(e) => {
                console::eprint(format!("Error: {}", e));
                Outcome { exit_code: exit::FAILURE, error: Some(e), fallback_engaged }
            }
        }
    }

    fn execute<F>(
        &self,
        command: &Command,
        open_gpio: F,
        fallback_slot: &mut Option<Arc<FallbackController>>,
    ) -> Result<()>
    where
        F: FnOnce(&DeviceRegistry) -> io::Result<Arc<dyn GpioDriver>>,
    {
        let registry = Arc::new(self.config.registry()?);
        if command.changes_state() {
            FailFlag::new(&self.config.fail_flag).check()?;
        }
        if let Some(device) = command.device() {
            registry.lookup(device)?;
        }

        let gpio = open_gpio(&registry)?;
        let fallback = Arc::new(FallbackController::new(gpio.clone(), registry.clone()));
        *fallback_slot = Some(fallback.clone());
        if self.route_signals {
            signals::install(fallback.clone())?;
        }

        let hardware = HardwareContext::initialize(gpio, registry)?;
        print_status(&hardware);

        let actuator = Actuator::new(&hardware, fallback.clone(), self.clock.clone());
        let watchdog = self.watchdog(fallback.clone());

        match command {
            Command::Status => Ok(()),
            Command::Kill => {
                console::notice("Using fallback disable function to kill all", Color::Red);
                fallback.disable_all();
                Ok(())
            }
            Command::Enable { device } => {
                let session = watchdog.start(SINGLE_STEP_WINDOW_MS)?;
                actuator.enable(device)?;
                watchdog.notify_complete(session)
            }
            Command::Disable { device } => {
                let session = watchdog.start(SINGLE_STEP_WINDOW_MS)?;
                actuator.disable(device)?;
                watchdog.notify_complete(session)
            }
            Command::EnableFor { device, duration_ms } => {
                let session = watchdog.start(*duration_ms)?;
                actuator.enable_for(device, Duration::from_millis(*duration_ms))?;
                watchdog.notify_complete(session)
            }
        }
    }

    /// The watchdog acts on the same fail-flag and config as this run.
    fn watchdog(&self, fallback: Arc<FallbackController>) -> WatchdogSupervisor {
        let mut watchdog = WatchdogSupervisor::new(self.config.watchdog.clone(), fallback, self.clock.clone())
            .with_env(paths::FAIL_FLAG_ENV, &self.config.fail_flag);
        if let Some(source) = &self.config.source {
            watchdog = watchdog.with_env(paths::CONFIG_ENV, source);
        }
        watchdog
    }
}

fn print_status(hardware: &HardwareContext) {
    let width = hardware.registry().name_width();
    for status in hardware.statuses() {
        let name = format!("{:<width$}", status.device.display_name(), width = width);
        console::print_l(format!(
            "{} {}: {} {}: {}",
            name.bold(),
            status.device.pin_primary.number(),
            console::level_label(status.primary),
            status.device.pin_secondary.number(),
            console::level_label(status.secondary),
        ));
    }
    debug!("Observed: {:?}", hardware.statuses().iter().map(|s| s.observed).collect::<Vec<_>>());
}
