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

//! WaterPi - fail-safe pump and heater control over Raspberry Pi GPIO
//!
//! Each device is switched through two relays wired in series. The library
//! sequences those relays, supervises every state-changing command with an
//! external watchdog process, and forces all outputs off when anything goes
//! wrong: a pin error, a missed watchdog rendezvous, a fatal signal or a panic.

pub mod actuator;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod console;
pub mod constants;
pub mod failflag;
pub mod fallback;
pub mod gpio;
pub mod hardware;
pub mod logger;
pub mod registry;
pub mod signals;
pub mod watchdog;

#[cfg(test)]
pub mod test_utils;

pub use wp_error::{Result, WaterPiError};
