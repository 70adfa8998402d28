/*
 * Test utilities and fakes for WaterPi
 *
 * A recording GPIO driver stamped with virtual time, and a virtual clock
 * whose sleeps return immediately.
 */

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::gpio::{GpioDriver, PinId, PinLevel};
use crate::registry::DeviceRegistry;

/// Clock whose `sleep` only advances virtual time
pub struct FakeClock {
    start: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
    panic_at_or_above: Mutex<Option<Duration>>,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
            panic_at_or_above: Mutex::new(None),
        })
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Panic inside any sleep of at least `threshold`, simulating a fault mid-hold.
    pub fn panic_on_sleep_at_least(&self, threshold: Duration) {
        *self.panic_at_or_above.lock() = Some(threshold);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock()
    }

    fn sleep(&self, duration: Duration) {
        let threshold = *self.panic_at_or_above.lock();
        if matches!(threshold, Some(t) if duration >= t) {
            panic!("simulated fault during sleep");
        }
        self.sleeps.lock().push(duration);
        *self.elapsed.lock() += duration;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOp {
    Configure,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinEvent {
    pub pin: PinId,
    pub op: PinOp,
    pub level: PinLevel,
    /// Virtual time of the operation
    pub at: Duration,
}

type WriteHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct RecorderState {
    outputs: HashMap<PinId, PinLevel>,
    readings: HashMap<PinId, io::ErrorKind>,
    presets: HashMap<PinId, PinLevel>,
    events: Vec<PinEvent>,
    failing_writes: Vec<(PinId, PinLevel)>,
    fail_all: bool,
}

/// GPIO fake that records every configure/write with a virtual timestamp
pub struct RecordingGpio {
    clock: Arc<FakeClock>,
    state: Mutex<RecorderState>,
    hook: Mutex<Option<(PinId, PinLevel, WriteHook)>>,
}

impl RecordingGpio {
    pub fn new(clock: Arc<FakeClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            state: Mutex::new(RecorderState::default()),
            hook: Mutex::new(None),
        })
    }

    /// Level `read_pin` will report before anything is driven
    pub fn preset(&self, pin: PinId, level: PinLevel) {
        self.state.lock().presets.insert(pin, level);
    }

    /// Make `read_pin` fail for a pin
    pub fn fail_read(&self, pin: PinId, kind: io::ErrorKind) {
        self.state.lock().readings.insert(pin, kind);
    }

    /// Make writes (and configures) of `level` to `pin` fail
    pub fn fail_write(&self, pin: PinId, level: PinLevel) {
        self.state.lock().failing_writes.push((pin, level));
    }

    /// Make every configure and write fail
    pub fn fail_everything(&self) {
        self.state.lock().fail_all = true;
    }

    /// Run `hook` once, right after `level` has been written to `pin`.
    pub fn on_write(&self, pin: PinId, level: PinLevel, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock() = Some((pin, level, Box::new(hook)));
    }

    pub fn output(&self, pin: PinId) -> Option<PinLevel> {
        self.state.lock().outputs.get(&pin).copied()
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.state.lock().events.clone()
    }

    pub fn writes(&self) -> Vec<PinEvent> {
        self.events().into_iter().filter(|e| e.op == PinOp::Write).collect()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// True when every registered pin is driven to the off level
    pub fn all_off(&self, registry: &DeviceRegistry) -> bool {
        let state = self.state.lock();
        registry.pins().all(|p| state.outputs.get(&p) == Some(&PinLevel::OFF))
    }

    fn record(&self, pin: PinId, op: PinOp, level: PinLevel) -> io::Result<()> {
        {
            let mut state = self.state.lock();
            if state.fail_all || state.failing_writes.contains(&(pin, level)) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected failure"));
            }
            let at = self.clock.elapsed();
            state.events.push(PinEvent { pin, op, level, at });
            state.outputs.insert(pin, level);
        }
        if op == PinOp::Write {
            let fire = {
                let mut hook = self.hook.lock();
                match hook.as_ref() {
                    Some((p, l, _)) if *p == pin && *l == level => hook.take(),
                    _ => None,
                }
            };
            if let Some((_, _, f)) = fire {
                f();
            }
        }
        Ok(())
    }
}

impl GpioDriver for RecordingGpio {
    fn read_pin(&self, pin: PinId) -> io::Result<PinLevel> {
        let state = self.state.lock();
        if let Some(kind) = state.readings.get(&pin) {
            return Err(io::Error::from(*kind));
        }
        Ok(state
            .outputs
            .get(&pin)
            .or_else(|| state.presets.get(&pin))
            .copied()
            .unwrap_or(PinLevel::OFF))
    }

    fn configure_pin_output(&self, pin: PinId, initial: PinLevel) -> io::Result<()> {
        self.record(pin, PinOp::Configure, initial)
    }

    fn write_pin(&self, pin: PinId, level: PinLevel) -> io::Result<()> {
        self.record(pin, PinOp::Write, level)
    }
}
