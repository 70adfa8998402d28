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

//! Constants and configuration values for WaterPi
//!
//! Centralizes sequencing delays, watchdog deadline parameters and default
//! paths. Hardware-facing timing lives here and nowhere else.

use std::time::Duration;

/// System paths
pub mod paths {
    /// Linux sysfs GPIO class directory
    pub const GPIO_ROOT: &str = "/sys/class/gpio";

    /// System-wide configuration file
    pub const SYSTEM_CONFIG: &str = "/etc/waterpi/config.json";

    /// Config file name inside the per-user config directory
    pub const CONFIG_FILE: &str = "config.json";

    /// Application directory name under config roots
    pub const APP_DIR: &str = "waterpi";

    /// Environment override for the config file location
    pub const CONFIG_ENV: &str = "WATERPI_CONFIG";

    /// Tells the external watchdog which fail-flag to set
    pub const FAIL_FLAG_ENV: &str = "WATERPI_FAIL_FLAG";

    /// Operator fail-flag; present means "power was cut, confirm before resuming"
    pub const FAIL_FLAG: &str = "/var/lib/waterpi/fail";

    /// Directory that holds watchdog rendezvous pipes
    pub const PIPE_DIR: &str = "/tmp";

    /// Prefix for rendezvous pipe file names
    pub const PIPE_PREFIX: &str = "waterpi_watchdog_";

    /// External watchdog script
    pub const WATCHDOG_SCRIPT: &str = "/usr/lib/waterpi/watchdog.sh";

    /// Interpreter used to launch the watchdog script
    pub const WATCHDOG_SHELL: &str = "bash";

    /// Audit log (JSON lines)
    pub const AUDIT_LOG: &str = "/var/log/waterpi/events.json";

    /// Audit log fallback when the primary location is not writable
    pub const AUDIT_LOG_FALLBACK: &str = "/tmp/waterpi_logs.json";

    /// journald socket, used to decide whether the journald layer can attach
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}

/// Two-pin actuation sequencing
pub mod sequencing {
    use super::Duration;

    /// Pause between primary and secondary legs when switching on
    pub const ENABLE_SETTLE: Duration = Duration::from_millis(250);

    /// Pause between secondary and primary legs when switching off
    pub const DISABLE_SETTLE: Duration = Duration::from_millis(100);
}

/// External watchdog rendezvous
pub mod watchdog {
    use super::Duration;

    /// Guarded window requested for a single enable or disable
    pub const SINGLE_STEP_WINDOW_MS: u64 = 500;

    /// Margin on top of the requested window, as numerator/denominator (1.25)
    pub const MARGIN_NUM: u64 = 5;
    pub const MARGIN_DEN: u64 = 4;

    /// Grace added to every deadline
    pub const GRACE_SECS: u64 = 3;

    /// Interval between checks for the pipe (startup) or a reader (notify)
    pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Completion token written to the pipe
    pub const FINISH_TOKEN: &str = "FINISH\n";
}

/// Default device wiring (BCM numbering)
pub mod devices {
    pub const PUMP_PRIMARY: u32 = 17;
    pub const PUMP_SECONDARY: u32 = 27;
    pub const HEATER_PRIMARY: u32 = 23;
    pub const HEATER_SECONDARY: u32 = 24;
}

/// Process exit statuses
pub mod exit {
    pub const OK: i32 = 0;
    pub const FAILURE: i32 = 1;
}
