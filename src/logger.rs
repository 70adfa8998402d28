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

//! JSON-lines audit log
//!
//! Enabled with `--logging`. Each actuation, watchdog and fallback event is
//! appended as one `{"ts_ms", "event", "data"}` object. Logging is a no-op
//! until [`init_logging`] has run.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use serde_json::{json, Value};

use crate::constants::paths;

lazy_static! {
    static ref LOG_FILE: Mutex<Option<(PathBuf, File)>> = Mutex::new(None);
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn open_append(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Open `path` for appending, falling back to /tmp when it is not writable.
/// Returns the path actually in use.
pub fn init_logging(path: &Path) -> Option<PathBuf> {
    let (used, file) = match open_append(path) {
        Some(f) => (path.to_path_buf(), f),
        None => {
            let fallback = PathBuf::from(paths::AUDIT_LOG_FALLBACK);
            let f = open_append(&fallback)?;
            (fallback, f)
        }
    };
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some((used.clone(), file));
    }
    Some(used)
}

pub fn is_enabled() -> bool {
    LOG_FILE.lock().map(|g| g.is_some()).unwrap_or(false)
}

pub fn log_event(event: &str, data: Value) {
    let Ok(mut guard) = LOG_FILE.lock() else { return };
    let Some((_, file)) = guard.as_mut() else { return };
    let line = json!({
        "ts_ms": now_millis(),
        "event": event,
        "data": data,
    })
    .to_string();
    let _ = writeln!(file, "{}", line);
}

#[cfg(test)]
pub(crate) fn shutdown_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = None;
    }
}
