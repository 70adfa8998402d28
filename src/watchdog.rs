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

//! External watchdog rendezvous
//!
//! Before a guarded operation the supervisor launches an independent
//! watchdog process with a pipe path and a deadline, then waits for that
//! process to create the pipe. After the operation the supervisor writes
//! `FINISH` into the pipe. A watchdog that hears nothing by its deadline
//! cuts power on its own; that is what protects against `SIGKILL` or a dead
//! controller, where none of our own cleanup can run.
//!
//! The deadline is `ceil(requested_ms * 1.25 / 1000) + 3` seconds, so the
//! watchdog never trips early on a healthy run.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossterm::style::Color;
use serde_json::json;
use tracing::{debug, error, info};
use wp_error::{Result, WaterPiError};

use crate::clock::Clock;
use crate::config::WatchdogSettings;
use crate::console;
use crate::constants::{paths, watchdog};
use crate::fallback::FallbackController;
use crate::logger;

/// Whole seconds the watchdog should wait for a window of `requested_ms`.
pub fn deadline_secs(requested_ms: u64) -> u64 {
    let scaled = requested_ms.saturating_mul(watchdog::MARGIN_NUM);
    scaled.div_ceil(1000 * watchdog::MARGIN_DEN) + watchdog::GRACE_SECS
}

/// One guarded window. Consumed by [`WatchdogSupervisor::notify_complete`].
#[derive(Debug)]
#[must_use = "an unnotified session makes the external watchdog cut power"]
pub struct WatchdogSession {
    pipe_path: PathBuf,
    deadline: Duration,
    created_at: Instant,
}

impl WatchdogSession {
    pub fn pipe_path(&self) -> &Path {
        &self.pipe_path
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

pub struct WatchdogSupervisor {
    settings: WatchdogSettings,
    fallback: Arc<FallbackController>,
    clock: Arc<dyn Clock>,
    /// Extra environment for the watchdog process
    env: Vec<(&'static str, OsString)>,
}

impl WatchdogSupervisor {
    pub fn new(settings: WatchdogSettings, fallback: Arc<FallbackController>, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            fallback,
            clock,
            env: Vec::new(),
        }
    }

    /// Pass `key=value` to every watchdog this supervisor spawns.
    pub fn with_env(mut self, key: &'static str, value: impl Into<OsString>) -> Self {
        self.env.push((key, value.into()));
        self
    }

    /// Launch the external watchdog for a window of `requested_ms` and wait until it is listening.
    pub fn start(&self, requested_ms: u64) -> Result<WatchdogSession> {
        let deadline_secs = deadline_secs(requested_ms);
        let deadline = Duration::from_secs(deadline_secs);
        let pipe_path = self.next_pipe_path();
        console::dprint(format!("Using watchdog pipe {}", pipe_path.display()));

        if pipe_path.exists() {
            fs::remove_file(&pipe_path).map_err(|e| self.escalate(e.into()))?;
        }

        let created_at = self.clock.now();
        self.spawn(&pipe_path, deadline_secs).map_err(|e| self.escalate(e))?;

        while !pipe_path.exists() {
            if self.clock.now().saturating_duration_since(created_at) > deadline {
                console::eprint("Failed to create watchdog in time");
                return Err(self.escalate(WaterPiError::WatchdogStartupTimeout {
                    path: pipe_path,
                    deadline_secs,
                }));
            }
            self.clock.sleep(watchdog::POLL_INTERVAL);
        }

        console::notice(format!("Watchdog created for {}s", deadline_secs), Color::Yellow);
        logger::log_event(
            "watchdog_start",
            json!({ "pipe": pipe_path, "deadline_secs": deadline_secs, "requested_ms": requested_ms }),
        );
        Ok(WatchdogSession { pipe_path, deadline, created_at })
    }

    /// Tell the watchdog the guarded operation finished.
    pub fn notify_complete(&self, session: WatchdogSession) -> Result<()> {
        if !session.pipe_path.exists() {
            console::eprint("Pipe not found; external watchdog might not be running.");
            return Err(self.escalate(WaterPiError::WatchdogChannelMissing(session.pipe_path)));
        }

        let mut pipe = loop {
            match open_writer(&session.pipe_path) {
                Ok(f) => break f,
                // FIFO exists but nobody has opened it for reading yet.
                Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                    let waited = self.clock.now().saturating_duration_since(session.created_at);
                    if waited > session.deadline {
                        return Err(self.escalate(WaterPiError::WatchdogUnresponsive(session.pipe_path)));
                    }
                    self.clock.sleep(watchdog::POLL_INTERVAL);
                }
                Err(e) => return Err(self.escalate(e.into())),
            }
        };
        pipe.write_all(watchdog::FINISH_TOKEN.as_bytes())
            .map_err(|e| self.escalate(e.into()))?;

        info!("Watchdog {} notified", session.pipe_path.display());
        logger::log_event("watchdog_finish", json!({ "pipe": session.pipe_path }));
        Ok(())
    }

    fn next_pipe_path(&self) -> PathBuf {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.settings
            .pipe_dir
            .join(format!("{}{}_{}", paths::PIPE_PREFIX, secs, std::process::id()))
    }

    /// Start `<shell> <script> <pipe> <deadline_secs>` in its own process group and let it go.
    ///
    /// All three stdio streams go to /dev/null so a caller capturing our
    /// output is not held open by the watchdog.
    fn spawn(&self, pipe_path: &Path, deadline_secs: u64) -> Result<()> {
        let child = Command::new(&self.settings.shell)
            .arg(&self.settings.script)
            .arg(pipe_path)
            .arg(deadline_secs.to_string())
            .envs(self.env.iter().map(|(k, v)| (*k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| WaterPiError::WatchdogSpawn {
                script: self.settings.script.clone(),
                source,
            })?;
        // Never waited on: the watchdog must outlive us if we die.
        debug!("Watchdog spawned as pid {}", child.id());
        Ok(())
    }

    fn escalate(&self, err: WaterPiError) -> WaterPiError {
        error!("Watchdog failure: {}", err);
        self.fallback.disable_all();
        err
    }
}

fn open_writer(path: &Path) -> io::Result<fs::File> {
    OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::registry::DeviceRegistry;
    use crate::test_utils::{FakeClock, RecordingGpio};
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::thread;
    use tempfile::TempDir;

    const LISTENING_SCRIPT: &str = r#"
mkfifo "$1"
exec 3<>"$1"
read -r -t "$2" line <&3
printf '%s' "$line" > "$1.result"
"#;

    // Reports what the watchdog inherited, then listens like the real one.
    const INSPECTING_SCRIPT: &str = r#"
out=$(readlink /proc/$$/fd/1)
err=$(readlink /proc/$$/fd/2)
{
    printf 'fail_flag=%s\n' "$WATERPI_FAIL_FLAG"
    printf 'config=%s\n' "$WATERPI_CONFIG"
    printf 'stdout=%s\n' "$out"
    printf 'stderr=%s\n' "$err"
} > "$1.env.tmp"
mv "$1.env.tmp" "$1.env"
mkfifo "$1"
exec 3<>"$1"
read -r -t "$2" line <&3
"#;

    fn fallback() -> (Arc<RecordingGpio>, Arc<DeviceRegistry>, Arc<FallbackController>) {
        let gpio = RecordingGpio::new(FakeClock::new());
        let registry = Arc::new(DeviceRegistry::default());
        let fallback = Arc::new(FallbackController::new(gpio.clone(), registry.clone()));
        (gpio, registry, fallback)
    }

    fn settings(tmp: &TempDir, script: &str) -> WatchdogSettings {
        let script_path = tmp.path().join("watchdog.sh");
        fs::write(&script_path, script).unwrap();
        WatchdogSettings {
            script: script_path,
            shell: PathBuf::from("bash"),
            pipe_dir: tmp.path().to_path_buf(),
        }
    }

    fn mkfifo(path: &Path) {
        let c = CString::new(path.as_os_str().as_bytes()).unwrap();
        // SAFETY: valid NUL-terminated path
        assert_eq!(unsafe { libc::mkfifo(c.as_ptr(), 0o600) }, 0);
    }

    #[test]
    fn deadline_adds_margin_and_grace() {
        assert_eq!(deadline_secs(500), 4);
        assert_eq!(deadline_secs(4000), 8);
        assert_eq!(deadline_secs(0), 3);
        assert_eq!(deadline_secs(800), 4);
        assert_eq!(deadline_secs(801), 5);
        assert_eq!(deadline_secs(60_000), 78);
    }

    #[test]
    fn deadline_never_shorter_than_window() {
        for ms in [1u64, 250, 999, 1_000, 7_321, 3_600_000] {
            assert!(Duration::from_secs(deadline_secs(ms)) >= Duration::from_millis(ms) + Duration::from_secs(3));
        }
    }

    #[test]
    fn start_and_notify_round_trip_with_real_watchdog() {
        let tmp = TempDir::new().unwrap();
        let (_, _, fallback) = fallback();
        let supervisor = WatchdogSupervisor::new(
            settings(&tmp, LISTENING_SCRIPT),
            fallback.clone(),
            Arc::new(SystemClock),
        );

        let session = supervisor.start(500).unwrap();
        assert_eq!(session.deadline(), Duration::from_secs(4));
        let result = PathBuf::from(format!("{}.result", session.pipe_path().display()));
        supervisor.notify_complete(session).unwrap();

        for _ in 0..100 {
            if result.exists() {
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(fs::read_to_string(&result).unwrap(), "FINISH");
        assert!(!fallback.is_engaged());
    }

    #[test]
    fn watchdog_gets_environment_and_no_inherited_stdio() {
        let tmp = TempDir::new().unwrap();
        let (_, _, fallback) = fallback();
        let supervisor = WatchdogSupervisor::new(
            settings(&tmp, INSPECTING_SCRIPT),
            fallback.clone(),
            Arc::new(SystemClock),
        )
        .with_env(paths::FAIL_FLAG_ENV, tmp.path().join("fail"))
        .with_env(paths::CONFIG_ENV, "/etc/waterpi/bench.json");

        let session = supervisor.start(500).unwrap();
        let report = fs::read_to_string(format!("{}.env", session.pipe_path().display())).unwrap();
        supervisor.notify_complete(session).unwrap();

        let mut lines = report.lines();
        assert_eq!(lines.next(), Some(format!("fail_flag={}", tmp.path().join("fail").display()).as_str()));
        assert_eq!(lines.next(), Some("config=/etc/waterpi/bench.json"));
        assert_eq!(lines.next(), Some("stdout=/dev/null"));
        assert_eq!(lines.next(), Some("stderr=/dev/null"));
        assert!(!fallback.is_engaged());
    }

    #[test]
    fn startup_timeout_runs_fallback() {
        let tmp = TempDir::new().unwrap();
        let (gpio, registry, fallback) = fallback();
        let clock = FakeClock::new();
        let supervisor = WatchdogSupervisor::new(settings(&tmp, "exit 0\n"), fallback.clone(), clock.clone());

        let err = supervisor.start(500).unwrap_err();

        assert!(matches!(err, WaterPiError::WatchdogStartupTimeout { deadline_secs: 4, .. }));
        assert!(clock.elapsed() > Duration::from_secs(4));
        assert!(clock.elapsed() <= Duration::from_secs(4) + watchdog::POLL_INTERVAL * 2);
        assert!(fallback.is_engaged());
        assert!(gpio.all_off(&registry));
    }

    #[test]
    fn spawn_failure_runs_fallback() {
        let tmp = TempDir::new().unwrap();
        let (_, _, fallback) = fallback();
        let mut settings = settings(&tmp, "exit 0\n");
        settings.shell = tmp.path().join("no-such-shell");
        let supervisor = WatchdogSupervisor::new(settings, fallback.clone(), FakeClock::new());

        assert!(matches!(supervisor.start(500), Err(WaterPiError::WatchdogSpawn { .. })));
        assert!(fallback.is_engaged());
    }

    #[test]
    fn missing_pipe_at_notify_runs_fallback() {
        let tmp = TempDir::new().unwrap();
        let (gpio, registry, fallback) = fallback();
        let clock = FakeClock::new();
        let supervisor = WatchdogSupervisor::new(settings(&tmp, ""), fallback.clone(), clock.clone());
        let session = WatchdogSession {
            pipe_path: tmp.path().join("gone"),
            deadline: Duration::from_secs(4),
            created_at: clock.now(),
        };

        let err = supervisor.notify_complete(session).unwrap_err();

        assert!(matches!(err, WaterPiError::WatchdogChannelMissing(_)));
        assert!(gpio.all_off(&registry));
    }

    #[test]
    fn pipe_without_reader_is_unresponsive_after_deadline() {
        let tmp = TempDir::new().unwrap();
        let (_, _, fallback) = fallback();
        let clock = FakeClock::new();
        let supervisor = WatchdogSupervisor::new(settings(&tmp, ""), fallback.clone(), clock.clone());
        let pipe = tmp.path().join("orphan");
        mkfifo(&pipe);
        let session = WatchdogSession {
            pipe_path: pipe,
            deadline: Duration::from_secs(4),
            created_at: clock.now(),
        };

        let err = supervisor.notify_complete(session).unwrap_err();

        assert!(matches!(err, WaterPiError::WatchdogUnresponsive(_)));
        assert!(clock.elapsed() > Duration::from_secs(4));
        assert!(fallback.is_engaged());
    }

    #[test]
    fn notify_writes_single_finish_line() {
        let tmp = TempDir::new().unwrap();
        let (_, _, fallback) = fallback();
        let clock = FakeClock::new();
        let supervisor = WatchdogSupervisor::new(settings(&tmp, ""), fallback.clone(), clock.clone());
        let pipe = tmp.path().join("plain");
        fs::write(&pipe, "").unwrap();
        let session = WatchdogSession {
            pipe_path: pipe.clone(),
            deadline: Duration::from_secs(4),
            created_at: clock.now(),
        };

        supervisor.notify_complete(session).unwrap();

        assert_eq!(fs::read_to_string(&pipe).unwrap(), "FINISH\n");
        assert!(!fallback.is_engaged());
    }
}
