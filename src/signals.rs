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

//! Fatal signal routing
//!
//! SIGINT, SIGTERM, SIGABRT and SIGHUP are routed to the fallback controller.
//! The handler does the minimum: load the published controller, run its
//! signal-context pass, `_exit(1)`. No logging, no allocation, no locks.
//!
//! A panic hook routes panics through the same pass and then exits with the
//! fallback status instead of unwinding.

use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use tracing::debug;
use wp_error::{Result, WaterPiError};

use crate::constants::exit;
use crate::fallback::FallbackController;

pub const FATAL_SIGNALS: [libc::c_int; 4] = [libc::SIGINT, libc::SIGTERM, libc::SIGABRT, libc::SIGHUP];

/// Published controller. Replaced pointers are never freed: a handler
/// running on another thread may still hold one.
static ROUTED: AtomicPtr<FallbackController> = AtomicPtr::new(ptr::null_mut());

/// Publish `fallback` and install handlers for every fatal signal.
pub fn install(fallback: Arc<FallbackController>) -> Result<()> {
    publish(fallback);
    for signal in FATAL_SIGNALS {
        // SAFETY: the sigaction struct is fully initialized (zeroed, then the
        // handler and mask set) before being passed to the kernel.
        unsafe {
            let mut action: libc::sigaction = mem::zeroed();
            action.sa_sigaction = on_fatal_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            // Hold off the other fatal signals while one is being handled.
            libc::sigemptyset(&mut action.sa_mask);
            for other in FATAL_SIGNALS {
                libc::sigaddset(&mut action.sa_mask, other);
            }
            action.sa_flags = 0;
            if libc::sigaction(signal, &action, ptr::null_mut()) != 0 {
                return Err(WaterPiError::Signal {
                    signal,
                    source: io::Error::last_os_error(),
                });
            }
        }
    }
    debug!("Fatal signal handlers installed for {:?}", FATAL_SIGNALS);
    Ok(())
}

/// Put the default dispositions back and stop routing.
pub fn restore_default_handlers() -> Result<()> {
    for signal in FATAL_SIGNALS {
        // SAFETY: SIG_DFL is always a valid disposition.
        if unsafe { libc::signal(signal, libc::SIG_DFL) } == libc::SIG_ERR {
            return Err(WaterPiError::Signal {
                signal,
                source: io::Error::last_os_error(),
            });
        }
    }
    ROUTED.store(ptr::null_mut(), Ordering::SeqCst);
    Ok(())
}

/// After the default hook reports a panic, force everything off and exit 1.
///
/// Panics before any controller is published unwind as usual.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        if trip_routed_fallback() {
            eprintln!("Panic: all devices forced off");
            std::process::exit(exit::FAILURE);
        }
    }));
}

fn publish(fallback: Arc<FallbackController>) {
    let raw = Arc::into_raw(fallback).cast_mut();
    ROUTED.swap(raw, Ordering::SeqCst);
}

/// Run the signal-context fallback on the published controller.
///
/// Returns false when nothing has been published yet.
pub fn trip_routed_fallback() -> bool {
    let raw = ROUTED.load(Ordering::SeqCst);
    if raw.is_null() {
        return false;
    }
    // SAFETY: non-null values come from Arc::into_raw in publish() and are never released.
    let fallback = unsafe { &*raw };
    fallback.disable_all_from_signal();
    true
}

extern "C" fn on_fatal_signal(_signal: libc::c_int) {
    trip_routed_fallback();
    // SAFETY: _exit is async-signal-safe and skips atexit handlers.
    unsafe { libc::_exit(exit::FAILURE) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::Actuator;
    use crate::gpio::{PinId, PinLevel, SysfsGpio};
    use crate::hardware::HardwareContext;
    use crate::registry::DeviceRegistry;
    use crate::test_utils::{FakeClock, RecordingGpio};
    use parking_lot::Mutex;
    use serial_test::serial;
    use std::fs;
    use std::process::{Command, Stdio};
    use tempfile::TempDir;

    fn current_handler(signal: libc::c_int) -> libc::sighandler_t {
        // SAFETY: querying with a null new action only reads the disposition.
        unsafe {
            let mut old: libc::sigaction = mem::zeroed();
            libc::sigaction(signal, ptr::null(), &mut old);
            old.sa_sigaction
        }
    }

    #[test]
    #[serial]
    fn install_routes_every_fatal_signal() {
        let gpio = RecordingGpio::new(FakeClock::new());
        let registry = Arc::new(DeviceRegistry::default());
        let fallback = Arc::new(FallbackController::new(gpio, registry));

        install(fallback).unwrap();
        let expected = on_fatal_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        for signal in FATAL_SIGNALS {
            assert_eq!(current_handler(signal), expected);
        }

        restore_default_handlers().unwrap();
        for signal in FATAL_SIGNALS {
            assert_eq!(current_handler(signal), libc::SIG_DFL);
        }
        assert!(!trip_routed_fallback());
    }

    const PANIC_CHILD_ENV: &str = "WATERPI_PANIC_GPIO_ROOT";

    /// Re-runs itself in a child process; the child panics with routing in place.
    #[test]
    fn panic_with_routing_forces_off_and_exits_one() {
        if let Some(root) = std::env::var_os(PANIC_CHILD_ENV) {
            let registry = Arc::new(DeviceRegistry::default());
            let gpio = Arc::new(SysfsGpio::open(root, registry.pins()).unwrap());
            install(Arc::new(FallbackController::new(gpio, registry))).unwrap();
            install_panic_hook();
            panic!("fault while a device is on");
        }

        let tmp = TempDir::new().unwrap();
        let registry = DeviceRegistry::default();
        for pin in registry.pins() {
            let dir = tmp.path().join(format!("gpio{}", pin.number()));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("direction"), "low").unwrap();
            fs::write(dir.join("value"), "0").unwrap();
        }

        let status = Command::new(std::env::current_exe().unwrap())
            .args(["--exact", "signals::tests::panic_with_routing_forces_off_and_exits_one"])
            .args(["--test-threads=1", "--nocapture"])
            .env(PANIC_CHILD_ENV, tmp.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();

        assert_eq!(status.code(), Some(exit::FAILURE));
        for pin in registry.pins() {
            let dir = tmp.path().join(format!("gpio{}", pin.number()));
            assert_eq!(fs::read_to_string(dir.join("direction")).unwrap(), "high");
            assert_eq!(fs::read_to_string(dir.join("value")).unwrap(), "1");
        }
    }

    #[test]
    #[serial]
    fn signal_mid_enable_leaves_everything_off() {
        let clock = FakeClock::new();
        let gpio = RecordingGpio::new(clock.clone());
        let registry = Arc::new(DeviceRegistry::default());
        let hardware = HardwareContext::initialize(gpio.clone(), registry.clone()).unwrap();
        let fallback = Arc::new(FallbackController::new(gpio.clone(), registry.clone()));
        let actuator = Actuator::new(&hardware, fallback.clone(), clock);
        publish(fallback.clone());

        // Deliver the "signal" right after the primary leg went on; the real
        // handler would _exit here, so capture the pin state at that moment.
        let snapshot: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
        let (probe, seen, reg) = (gpio.clone(), snapshot.clone(), registry.clone());
        gpio.on_write(PinId(17), PinLevel::ON, move || {
            assert!(trip_routed_fallback());
            *seen.lock() = Some(probe.all_off(&reg));
        });

        let _ = actuator.enable("pump");

        assert_eq!(*snapshot.lock(), Some(true));
        assert!(fallback.is_engaged());
        restore_default_handlers().unwrap();
    }
}
