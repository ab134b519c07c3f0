//! Operational modes for simulated devices.
//!
//! - **Instant**: No delays. Moves and counts complete as soon as they are awaited.
//! - **Realistic**: Travel, settle and count times are honored.
//! - **Chaos**: Realistic timing plus whatever the device's `ErrorConfig` injects.

use serde::{Deserialize, Serialize};

/// Operational modes for simulated devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    #[default]
    Instant,
    /// Hardware-like timing - for integration tests
    Realistic,
    /// Hardware-like timing with injected failures - for resilience testing
    Chaos,
}

impl MockMode {
    /// Whether simulated time passes in this mode.
    pub fn is_timed(self) -> bool {
        !matches!(self, MockMode::Instant)
    }
}
