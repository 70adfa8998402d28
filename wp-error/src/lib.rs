//! Unified error handling for WaterPi
//!
//! This crate provides a single error type used across all WaterPi components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using WaterPiError
pub type Result<T> = std::result::Result<T, WaterPiError>;

/// Unified error type for all WaterPi operations
#[derive(thiserror::Error, Debug)]
pub enum WaterPiError {
    // ============================================================================
    // Validation Errors (never touch hardware)
    // ============================================================================
    #[error("Unknown device '{name}' (known devices: {known})")]
    UnknownDevice {
        name: String,
        known: String,
    },

    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("Fail flag present at {0}, did you restore power?")]
    FailFlagPresent(PathBuf),

    #[error("Invalid device registry: {0}")]
    InvalidRegistry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("Failed to {op} GPIO {pin}: {source}")]
    Gpio {
        pin: u32,
        op: &'static str,
        source: io::Error,
    },

    #[error("Fallback engaged; refusing further device operations")]
    FallbackEngaged,

    // ============================================================================
    // Watchdog Errors
    // ============================================================================
    #[error("Watchdog did not create {path} within {deadline_secs}s")]
    WatchdogStartupTimeout {
        path: PathBuf,
        deadline_secs: u64,
    },

    #[error("Watchdog pipe {0} not found; external watchdog might not be running")]
    WatchdogChannelMissing(PathBuf),

    #[error("Watchdog pipe {0} has no reader; external watchdog is unresponsive")]
    WatchdogUnresponsive(PathBuf),

    #[error("Failed to spawn watchdog {script}: {source}")]
    WatchdogSpawn {
        script: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Process Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to install handler for signal {signal}: {source}")]
    Signal {
        signal: i32,
        source: io::Error,
    },
}

impl WaterPiError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a registry validation error from a string
    pub fn invalid_registry(msg: impl Into<String>) -> Self {
        Self::InvalidRegistry(msg.into())
    }

    /// Wrap a pin-level I/O failure
    pub fn gpio(pin: u32, op: &'static str, source: io::Error) -> Self {
        Self::Gpio { pin, op, source }
    }

    /// Whether this error leaves hardware in a state that must be forced off.
    ///
    /// Validation errors are raised before any pin is touched and return false.
    pub fn requires_fallback(&self) -> bool {
        !matches!(
            self,
            Self::UnknownDevice { .. }
                | Self::MissingArgument(_)
                | Self::FailFlagPresent(_)
                | Self::InvalidRegistry(_)
                | Self::Config(_)
                | Self::JsonParse(_)
        )
    }
}
