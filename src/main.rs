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

use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use waterpi::cli::Cli;
use waterpi::commands::Runner;
use waterpi::config::{load_config, Config};
use waterpi::console;
use waterpi::constants::{exit, paths};
use waterpi::gpio::{GpioDriver, SysfsGpio};
use waterpi::{logger, signals};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config);
    signals::install_panic_hook();

    if cli.logging {
        match logger::init_logging(&config.audit_log) {
            Some(path) => debug!("Audit log: {}", path.display()),
            None => warn!("Audit logging requested but no log file could be opened"),
        }
    }

    let command = match cli.command() {
        Ok(command) => command,
        Err(e) => {
            console::eprint(format!("Error: {}", e));
            process::exit(exit::FAILURE);
        }
    };
    info!("Running {:?}", command);

    let gpio_root = config.gpio_root.clone();
    let outcome = Runner::new(config).run(&command, |registry| {
        let gpio = SysfsGpio::open(&gpio_root, registry.pins())?;
        Ok(Arc::new(gpio) as Arc<dyn GpioDriver>)
    });

    process::exit(outcome.exit_code);
}

fn init_tracing(config: &Config) {
    let log_level = std::env::var("WATERPI_LOG").unwrap_or_else(|_| "info".to_string());

    if config.log_to_journald && Path::new(paths::JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stderr", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(&log_level)
        .with_writer(std::io::stderr)
        .init();
}
