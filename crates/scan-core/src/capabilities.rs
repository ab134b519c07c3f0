//! Scan Capabilities
//!
//! The two contracts a device must fulfil to take part in a scan:
//!
//! - [`Scannable`] - settable position devices (motors, power supply
//!   setpoints, temperature controllers).
//! - [`Countable`] - value producing devices with a start/wait/read
//!   protocol (detectors, scalers, monitors).
//!
//! Real drivers and pseudo devices implement the same traits; the engine
//! dispatches through `Arc<dyn Scannable>` / `Arc<dyn Countable>` without
//! knowing which variant it holds.
//!
//! # Example
//!
//! ```rust,ignore
//! use scan_core::capabilities::{Scannable, SoftLimits};
//!
//! async fn step(motor: &dyn Scannable, target: f64) -> anyhow::Result<f64> {
//!     motor.move_to(target).await?;
//!     motor.wait().await?;
//!     motor.value().await
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// Soft limits
// =============================================================================

/// Travel range of a scannable device.
///
/// A range of `[0, 0]` means "no limits configured", matching how motor
/// records report unconfigured soft limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftLimits {
    /// Lowest allowed target.
    pub low: f64,
    /// Highest allowed target.
    pub high: f64,
}

impl SoftLimits {
    /// Unbounded range.
    pub const UNBOUNDED: Self = Self {
        low: f64::NEG_INFINITY,
        high: f64::INFINITY,
    };

    /// Create a range, ordering the bounds if given reversed.
    pub fn new(low: f64, high: f64) -> Self {
        if low <= high {
            Self { low, high }
        } else {
            Self {
                low: high,
                high: low,
            }
        }
    }

    /// True when no limit checking applies.
    pub fn is_unbounded(&self) -> bool {
        (self.low == 0.0 && self.high == 0.0)
            || (self.low == f64::NEG_INFINITY && self.high == f64::INFINITY)
    }

    /// Check a target against the range.
    pub fn check(&self, target: f64) -> std::result::Result<(), LimitViolation> {
        if target.is_nan() || (!self.is_unbounded() && (target < self.low || target > self.high))
        {
            return Err(LimitViolation {
                device: None,
                target,
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

impl Default for SoftLimits {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// A target rejected by [`SoftLimits::check`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("target {target} outside soft limits [{low}, {high}]")]
pub struct LimitViolation {
    /// Device that owns the violated range, when it differs from the device
    /// being moved (pseudo motors name their backing motor here).
    pub device: Option<String>,
    /// Requested target.
    pub target: f64,
    /// Low limit.
    pub low: f64,
    /// High limit.
    pub high: f64,
}

impl LimitViolation {
    /// Attribute the violation to `device`.
    pub fn on(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Convert into a [`crate::ScanError::OutOfRange`], falling back to
    /// `mnemonic` when the violation names no device.
    pub fn into_scan_error(self, mnemonic: &str) -> crate::ScanError {
        crate::ScanError::OutOfRange {
            mnemonic: self.device.unwrap_or_else(|| mnemonic.to_string()),
            target: self.target,
            low: self.low,
            high: self.high,
        }
    }
}

// =============================================================================
// Scannable
// =============================================================================

/// Capability: settable position.
///
/// `move_to` only issues the command; `wait` blocks until the device reports
/// settled. The engine issues every move of a point before waiting on any of
/// them, so implementations must not block in `move_to`.
#[async_trait]
pub trait Scannable: Send + Sync {
    /// Issue a move to an absolute target.
    ///
    /// Fails if the target lies outside the configured soft limits.
    async fn move_to(&self, target: f64) -> Result<()>;

    /// Suspend until the device reports settled.
    async fn wait(&self) -> Result<()>;

    /// Instantaneous position readback.
    async fn value(&self) -> Result<f64>;

    /// Configured soft limits.
    fn limits(&self) -> SoftLimits {
        SoftLimits::UNBOUNDED
    }

    /// Low soft limit.
    fn low_limit(&self) -> f64 {
        self.limits().low
    }

    /// High soft limit.
    fn high_limit(&self) -> f64 {
        self.limits().high
    }

    /// Validate a target without moving.
    ///
    /// Pseudo motors override this to validate every backing motor.
    fn check_target(&self, target: f64) -> std::result::Result<(), LimitViolation> {
        self.limits().check(target)
    }

    /// Move relative to the current readback.
    async fn move_relative(&self, delta: f64) -> Result<()> {
        let current = self.value().await?;
        self.move_to(current + delta).await
    }

    /// Whether a move is in progress.
    async fn is_moving(&self) -> Result<bool> {
        Ok(false)
    }

    /// Stop any motion in progress.
    ///
    /// # Default Implementation
    /// Returns an error indicating stop is not supported.
    async fn stop(&self) -> Result<()> {
        anyhow::bail!("Stop not supported by this device")
    }
}

// =============================================================================
// Countable
// =============================================================================

/// Capability: start/wait/read acquisition.
#[async_trait]
pub trait Countable: Send + Sync {
    /// Begin integrating for the configured count time.
    async fn start_count(&self) -> Result<()>;

    /// Suspend until the acquisition window closes.
    async fn wait(&self) -> Result<()>;

    /// Result of the last completed count.
    async fn value(&self) -> Result<f64>;

    /// Best-effort abort. Must be safe on an already finished device.
    async fn stop_count(&self) -> Result<()> {
        Ok(())
    }

    /// Whether this device can act as the monitor (counts to a preset).
    fn can_monitor(&self) -> bool {
        false
    }

    /// Whether `stop_count` has any effect on this device.
    fn can_stop_count(&self) -> bool {
        false
    }

    /// Set the integration time in seconds used by the next `start_count`.
    async fn set_count_time(&self, _seconds: f64) -> Result<()> {
        Ok(())
    }

    /// Set the monitor preset (counts or seconds to reach before stopping).
    ///
    /// # Default Implementation
    /// Returns an error indicating monitor mode is not supported.
    async fn set_preset(&self, _preset: f64) -> Result<()> {
        anyhow::bail!("Monitor preset not supported by this device")
    }

    /// Whether an acquisition is in progress.
    async fn is_counting(&self) -> Result<bool> {
        Ok(false)
    }
}
