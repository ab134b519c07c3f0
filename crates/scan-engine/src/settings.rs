//! Scan settings loaded with Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `RUST_SCAN_`
//!
//! ```toml
//! output = "data/align.txt"
//! x_field = "m1"
//! y_field = "det"
//! fit = true
//! partial_write = true
//! ```
//!
//! `RUST_SCAN_FIT=false` then disables fitting without touching the file.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use scan_core::limits;
use scan_core::{ScanError, ScanResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "RUST_SCAN_";

/// Process-wide configuration surface of a [`ScanContext`](crate::ScanContext).
///
/// The engine copies the settings at Initializing; changes made while a scan
/// runs only apply to the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Output file; `None` keeps the scan in memory only.
    pub output: Option<PathBuf>,
    /// X field for fitting and plotting.
    pub x_field: Option<String>,
    /// Y field for fitting and plotting.
    pub y_field: Option<String>,
    /// Fit the Y data at the end of the scan.
    pub fit: bool,
    /// Print header, rows and summary to the console.
    pub print: bool,
    /// Call the plotter after each row.
    pub plot: bool,
    /// Free-text comment written to the file header.
    pub comment: String,
    /// Stream rows to the file as they are recorded.
    pub partial_write: bool,
    /// Never overwrite: append `_0001`, `_0002`, ... to the output name.
    pub unique_file_names: bool,
    /// Deadline for a device to settle, in milliseconds.
    pub settle_timeout_ms: u64,
    /// Deadline for a count beyond its count time, in milliseconds.
    pub count_timeout_ms: u64,
    /// Pause/abort polling and delay granularity, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            output: None,
            x_field: None,
            y_field: None,
            fit: true,
            print: true,
            plot: true,
            comment: String::new(),
            partial_write: false,
            unique_file_names: true,
            settle_timeout_ms: limits::SETTLE_TIMEOUT.as_millis() as u64,
            count_timeout_ms: limits::COUNT_TIMEOUT.as_millis() as u64,
            poll_interval_ms: limits::POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl ScanSettings {
    /// Load from a TOML file, then apply `RUST_SCAN_*` overrides.
    ///
    /// A missing file is not an error; defaults and the environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ScanResult<Self> {
        Self::extract(Figment::new().merge(Toml::file(path.as_ref())))
    }

    /// Defaults plus `RUST_SCAN_*` overrides.
    pub fn from_env() -> ScanResult<Self> {
        Self::extract(Figment::new())
    }

    fn extract(figment: Figment) -> ScanResult<Self> {
        let settings: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| ScanError::Configuration(format!("invalid scan settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> ScanResult<()> {
        let checks = [
            ("settle_timeout_ms", self.settle_timeout_ms),
            ("count_timeout_ms", self.count_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ScanError::Configuration(format!("{name} must be positive")));
            }
        }
        if self.output.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(ScanError::Configuration("output path is empty".into()));
        }
        Ok(())
    }

    /// Settle deadline.
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    /// Count deadline on top of the count time.
    pub fn count_timeout(&self) -> Duration {
        Duration::from_millis(self.count_timeout_ms)
    }

    /// Polling granularity.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Set the output file.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Set the X and Y fields.
    pub fn with_fields(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_field = Some(x.into());
        self.y_field = Some(y.into());
        self
    }

    /// Turn printing, plotting and fitting off.
    pub fn quiet(mut self) -> Self {
        self.print = false;
        self.plot = false;
        self.fit = false;
        self
    }
}
