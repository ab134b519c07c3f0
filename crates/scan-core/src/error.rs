//! Error types for scan orchestration.
//!
//! `ScanError` is the single error type returned by the scan engine and the
//! registration APIs. Its variants follow the failure classes an operator
//! needs to tell apart:
//!
//! - **Configuration**: `Configuration`, `DuplicateMnemonic`, `MissingCapability`,
//!   `UnknownDevice`, `Formula`. Raised before any device I/O.
//! - **Device**: `Device`, `OutOfRange`. A move or count was rejected.
//! - **Timeout**: `Timeout`. A device stopped answering within its deadline.
//! - **Hook**: `Hook`. A user callback failed; the original error is kept
//!   as the source.
//!
//! Device drivers report failures through `anyhow::Error`. Drivers that want
//! the engine to distinguish "device refused" from "device unresponsive"
//! return a [`DriverError`] with [`DriverErrorKind::Timeout`].

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Classification of a driver-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device could not be brought up.
    Initialization,
    /// Invalid driver settings.
    Configuration,
    /// Link to the device failed.
    Communication,
    /// Device reported a fault.
    Hardware,
    /// Device did not answer in time.
    Timeout,
    /// Argument rejected by the device.
    InvalidParameter,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Typed error raised by device drivers.
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver identifier, e.g. `sim_motor`.
    pub driver_type: String,
    /// Failure class.
    pub kind: DriverErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

// =============================================================================
// Scan Errors
// =============================================================================

/// Convenience alias for results using [`ScanError`].
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Primary error type for scan orchestration.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Semantic problem in the scan request (mismatched trajectory lengths,
    /// bad count-time array, invalid settings).
    ///
    /// **Error Type**: Permanent - raised before any device I/O.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Two participants share the same mnemonic.
    #[error("Duplicate mnemonic '{0}'")]
    DuplicateMnemonic(String),

    /// A participant lacks the capability its role requires.
    #[error("Device '{mnemonic}' does not implement {capability}")]
    MissingCapability {
        /// Offending device.
        mnemonic: String,
        /// Required capability name.
        capability: &'static str,
    },

    /// Mnemonic not present in the device registry.
    #[error("Unknown device '{0}'")]
    UnknownDevice(String),

    /// Formula failed to parse, bind or evaluate.
    #[error("Formula error: {0}")]
    Formula(String),

    /// Target outside a device's soft limits. For pseudo motors the mnemonic
    /// names the first violating backing motor.
    #[error("Target {target} for '{mnemonic}' outside soft limits [{low}, {high}]")]
    OutOfRange {
        /// Violating device.
        mnemonic: String,
        /// Requested position.
        target: f64,
        /// Low soft limit.
        low: f64,
        /// High soft limit.
        high: f64,
    },

    /// A device rejected a move, count or read.
    ///
    /// **Error Type**: Aborts the current point. Rows already recorded stay valid.
    #[error("Device '{mnemonic}' failed: {source}")]
    Device {
        /// Failing device.
        mnemonic: String,
        /// Driver error.
        #[source]
        source: anyhow::Error,
    },

    /// A device wait exceeded its deadline.
    ///
    /// Treated like [`ScanError::Device`] for point-abort purposes, reported
    /// separately so an unresponsive device is distinguishable from one that
    /// refused a command.
    #[error("Device '{mnemonic}' timed out during {operation} after {after:?}")]
    Timeout {
        /// Unresponsive device.
        mnemonic: String,
        /// Operation that was pending (`wait`, `count`).
        operation: &'static str,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// A user callback failed. Displays as the callback's own error.
    #[error("{source}")]
    Hook {
        /// Callback phase that failed.
        phase: &'static str,
        /// Error returned by the callback.
        #[source]
        source: anyhow::Error,
    },
}

impl ScanError {
    /// Wrap a driver failure, classifying driver timeouts as [`ScanError::Timeout`].
    ///
    /// `ScanError`s that bubble up through a device (e.g. a pseudo motor
    /// rejecting a target) are passed through unchanged.
    pub fn from_device(
        mnemonic: &str,
        operation: &'static str,
        deadline: Duration,
        err: anyhow::Error,
    ) -> Self {
        let err = match err.downcast::<ScanError>() {
            Ok(scan_err) => return scan_err,
            Err(err) => err,
        };
        if let Some(driver) = err.downcast_ref::<DriverError>() {
            if driver.kind == DriverErrorKind::Timeout {
                return ScanError::Timeout {
                    mnemonic: mnemonic.to_string(),
                    operation,
                    after: deadline,
                };
            }
        }
        ScanError::Device {
            mnemonic: mnemonic.to_string(),
            source: err,
        }
    }

    /// True for errors raised before any device I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScanError::Configuration(_)
                | ScanError::DuplicateMnemonic(_)
                | ScanError::MissingCapability { .. }
                | ScanError::UnknownDevice(_)
                | ScanError::Formula(_)
        )
    }

    /// True for failures attributable to a device (refusal or timeout).
    pub fn is_device(&self) -> bool {
        matches!(
            self,
            ScanError::Device { .. } | ScanError::Timeout { .. } | ScanError::OutOfRange { .. }
        )
    }
}
