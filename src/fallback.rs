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

//! Fallback controller
//!
//! Forces every registered device off, unconditionally. Reachable from any
//! failure path in the actuator, from the watchdog supervisor, from the
//! `kill` command and from the fatal-signal handler.
//!
//! # Guarantees
//!
//! - **Total**: every pin of every device is driven off, whichever device failed.
//! - **Idempotent**: repeated or nested calls converge on the same end state.
//! - **Latched**: once engaged, the actuator refuses to switch anything on.
//!
//! The pin pass itself allocates nothing and takes no locks, so
//! [`FallbackController::disable_all_from_signal`] may run on top of an
//! interrupted [`FallbackController::disable_all`] or actuation sequence.
//!
//! Process exit is left to the entry point: the signal handler exits after
//! its own pass, the normal path returns and lets `main` exit non-zero.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tracing::error;

use crate::console;
use crate::gpio::{GpioDriver, PinLevel};
use crate::logger;
use crate::registry::DeviceRegistry;

const SIGNAL_BANNER: &[u8] = b"[WaterPi] Fatal signal: disabling all devices\n";

/// Outcome of one pass over all pins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackReport {
    pub pins: usize,
    /// Configure or write operations that returned an error
    pub failures: usize,
}

impl FallbackReport {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

pub struct FallbackController {
    gpio: Arc<dyn GpioDriver>,
    registry: Arc<DeviceRegistry>,
    engaged: AtomicBool,
    passes: AtomicUsize,
}

impl FallbackController {
    pub fn new(gpio: Arc<dyn GpioDriver>, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            gpio,
            registry,
            engaged: AtomicBool::new(false),
            passes: AtomicUsize::new(0),
        }
    }

    /// Loudly force every device off.
    pub fn disable_all(&self) -> FallbackReport {
        self.engaged.store(true, Ordering::SeqCst);
        console::alarm("Fallback: Disabling all devices");
        error!("Fallback engaged: forcing all {} devices off", self.registry.len());

        let report = self.force_all_off();

        if report.is_clean() {
            error!("Fallback complete: {} pins driven off", report.pins);
        } else {
            error!(
                "Fallback completed with {} failed pin operations across {} pins",
                report.failures, report.pins
            );
        }
        logger::log_event(
            "fallback",
            json!({ "pins": report.pins, "failures": report.failures }),
        );
        report
    }

    /// Variant for signal context: a fixed stderr banner and the pin pass, nothing else.
    pub fn disable_all_from_signal(&self) -> FallbackReport {
        self.engaged.store(true, Ordering::SeqCst);
        // SAFETY: write(2) on stderr with a static buffer is async-signal-safe.
        unsafe {
            libc::write(libc::STDERR_FILENO, SIGNAL_BANNER.as_ptr().cast(), SIGNAL_BANNER.len());
        }
        self.force_all_off()
    }

    /// Whether any fallback pass has started in this process
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }

    /// Number of completed passes
    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }

    fn force_all_off(&self) -> FallbackReport {
        let mut report = FallbackReport::default();
        for device in self.registry.devices() {
            let pins = device.pins();
            for pin in pins {
                report.pins += 1;
                if self.gpio.configure_pin_output(pin, PinLevel::OFF).is_err() {
                    report.failures += 1;
                }
            }
            // Explicit writes as well: configure alone is not trusted to change a live output.
            for pin in pins {
                if self.gpio.write_pin(pin, PinLevel::OFF).is_err() {
                    report.failures += 1;
                }
            }
        }
        self.passes.fetch_add(1, Ordering::SeqCst);
        report
    }
}
