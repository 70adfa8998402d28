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

//! Linux sysfs GPIO driver
//!
//! Drives pins through `/sys/class/gpio/gpioN/{direction,value}`. Every pin
//! the driver will ever touch is exported and has its file paths rendered to
//! C strings in [`SysfsGpio::open`], so the write paths below are plain
//! `open`/`write`/`close` syscalls with no allocation and no locking.

use std::ffi::{CStr, CString};
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::{GpioDriver, PinId, PinLevel};

/// How long to wait for the kernel to create `gpioN` after an export
const EXPORT_WAIT_STEPS: u32 = 20;
const EXPORT_WAIT_STEP: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct PinFiles {
    pin: PinId,
    direction: CString,
    value: CString,
}

/// sysfs-backed [`GpioDriver`]
#[derive(Debug)]
pub struct SysfsGpio {
    pins: Vec<PinFiles>,
}

impl SysfsGpio {
    /// Export `pins` under `root` and pre-render their control file paths.
    pub fn open(root: impl Into<PathBuf>, pins: impl IntoIterator<Item = PinId>) -> io::Result<Self> {
        let root = root.into();
        let mut files = Vec::new();
        for pin in pins {
            let dir = root.join(format!("gpio{}", pin.number()));
            if !dir.exists() {
                export(&root, pin)?;
                wait_for(&dir)?;
            }
            files.push(PinFiles {
                pin,
                direction: c_path(&dir.join("direction"))?,
                value: c_path(&dir.join("value"))?,
            });
        }
        debug!("sysfs GPIO ready at {} for {} pins", root.display(), files.len());
        Ok(Self { pins: files })
    }

    fn files(&self, pin: PinId) -> io::Result<&PinFiles> {
        self.pins
            .iter()
            .find(|f| f.pin == pin)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

impl GpioDriver for SysfsGpio {
    fn read_pin(&self, pin: PinId) -> io::Result<PinLevel> {
        let files = self.files(pin)?;
        let direction = read_trimmed(&files.direction)?;
        // An input pin is not driving the relay at all.
        if direction == "in" {
            return Ok(PinLevel::OFF);
        }
        match read_trimmed(&files.value)?.as_str() {
            "0" => Ok(PinLevel::Low),
            "1" => Ok(PinLevel::High),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected value '{}' for {}", other, pin),
            )),
        }
    }

    fn configure_pin_output(&self, pin: PinId, initial: PinLevel) -> io::Result<()> {
        let files = self.files(pin)?;
        // "high"/"low" switch to output and set the level in one write.
        let payload: &[u8] = match initial {
            PinLevel::High => b"high",
            PinLevel::Low => b"low",
        };
        write_raw(&files.direction, payload)
    }

    fn write_pin(&self, pin: PinId, level: PinLevel) -> io::Result<()> {
        let files = self.files(pin)?;
        let payload: &[u8] = match level {
            PinLevel::High => b"1",
            PinLevel::Low => b"0",
        };
        write_raw(&files.value, payload)
    }
}

fn export(root: &Path, pin: PinId) -> io::Result<()> {
    info!("Exporting {} via {}", pin, root.join("export").display());
    fs::write(root.join("export"), pin.number().to_string())
}

fn wait_for(dir: &Path) -> io::Result<()> {
    for _ in 0..EXPORT_WAIT_STEPS {
        if dir.join("direction").exists() {
            return Ok(());
        }
        thread::sleep(EXPORT_WAIT_STEP);
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} did not appear after export", dir.display()),
    ))
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "GPIO path contains a NUL byte"))
}

fn read_trimmed(path: &CStr) -> io::Result<String> {
    let path = Path::new(std::ffi::OsStr::from_bytes(path.to_bytes()));
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// Async-signal-safe write of a whole payload to a sysfs attribute.
fn write_raw(path: &CStr, payload: &[u8]) -> io::Result<()> {
    // SAFETY: `path` is a valid NUL-terminated string owned by self for the
    // duration of the call; open/write/close are async-signal-safe.
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_WRONLY | libc::O_TRUNC | libc::O_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd was opened above and payload is a live slice of payload.len() bytes.
    let written = unsafe { libc::write(fd, payload.as_ptr().cast(), payload.len()) };
    let result = if written < 0 {
        Err(io::Error::last_os_error())
    } else if written as usize != payload.len() {
        Err(io::Error::from(io::ErrorKind::WriteZero))
    } else {
        Ok(())
    };
    // SAFETY: fd is owned here and closed exactly once.
    unsafe { libc::close(fd) };
    result
}
