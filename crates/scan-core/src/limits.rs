//! Shared timing limits for device waits and engine polling.
//!
//! Every suspension point in a scan is bounded by one of these deadlines.
//! The values here are defaults; `ScanSettings` can override them per context.

use std::time::Duration;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Default deadline for a motor to report settled (60 seconds).
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default deadline added on top of the count time before a counter wait is
/// considered unresponsive (60 seconds).
pub const COUNT_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Polling
// =============================================================================

/// Interval at which abort/pause flags are polled during delays and pauses.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Counting
// =============================================================================

/// Count time assigned to non-monitor counters in monitor mode. They run
/// until the monitor reaches its preset and are then stopped.
pub const UNBOUNDED_COUNT_TIME: f64 = 1.0e9;

/// Digits shown when printing scan values to the console.
pub const PRINT_PRECISION: i32 = 4;
