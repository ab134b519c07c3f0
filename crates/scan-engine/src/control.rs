//! Run state and the abort/pause handle.
//!
//! ```text
//! ┌──────┐   run()   ┌─────────┐  pause()  ┌────────┐
//! │ Idle │──────────▶│ Running │──────────▶│ Paused │
//! └──────┘           └────┬────┘◀──────────└───┬────┘
//!    ▲                    │       resume()     │
//!    │  completed         │ abort()            │ abort()
//!    │                    ▼                    ▼
//!    └──────────── Interrupted / Error ◀───────┘
//! ```
//!
//! Requests are only observed between points; a point that has started
//! always runs to completion.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Coarse run state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ScanState {
    /// No scan running; the last one (if any) completed.
    #[default]
    Idle,
    /// Acquiring points.
    Running,
    /// Waiting between points for `resume()` or `abort()`.
    Paused,
    /// The last scan was aborted by the user.
    Interrupted,
    /// The last scan failed.
    Error,
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanState::Idle => write!(f, "idle"),
            ScanState::Running => write!(f, "running"),
            ScanState::Paused => write!(f, "paused"),
            ScanState::Interrupted => write!(f, "interrupted"),
            ScanState::Error => write!(f, "error"),
        }
    }
}

/// Fine-grained engine phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum EnginePhase {
    /// Not running.
    #[default]
    Idle,
    /// Validating participants and resetting the table.
    Initializing,
    /// Issuing moves.
    Moving,
    /// Waiting for every scannable to settle.
    Settling,
    /// PreOperation callback.
    PreOperation,
    /// Operation callback.
    Counting,
    /// Reading values and committing the row.
    Collecting,
    /// Post-processing X/Y.
    Fitting,
    /// Recording the end time and running PostScan.
    Finalizing,
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EnginePhase::Idle => "idle",
            EnginePhase::Initializing => "initializing",
            EnginePhase::Moving => "moving",
            EnginePhase::Settling => "settling",
            EnginePhase::PreOperation => "pre-operation",
            EnginePhase::Counting => "counting",
            EnginePhase::Collecting => "collecting",
            EnginePhase::Fitting => "fitting",
            EnginePhase::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct ControlInner {
    abort_requested: AtomicBool,
    pause_requested: AtomicBool,
    status: Mutex<(ScanState, EnginePhase)>,
}

/// Cloneable handle to steer a running scan from another task or a callback.
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    inner: Arc<ControlInner>,
}

impl ScanControl {
    /// Ask the engine to stop after the current point.
    pub fn abort(&self) {
        info!(state = %self.state(), "Abort requested");
        self.inner.abort_requested.store(true, Ordering::SeqCst);
    }

    /// Ask the engine to wait before the next point.
    pub fn pause(&self) -> anyhow::Result<()> {
        let state = self.state();
        if state != ScanState::Running {
            anyhow::bail!("Cannot pause: scan is {}", state);
        }
        info!("Pause requested");
        self.inner.pause_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Continue a paused scan, or cancel a pause that has not taken effect.
    pub fn resume(&self) -> anyhow::Result<()> {
        let state = self.state();
        if state != ScanState::Paused && !self.pause_requested() {
            anyhow::bail!("Cannot resume: scan is {}", state);
        }
        info!("Resume requested");
        self.inner.pause_requested.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Whether an abort is pending.
    pub fn abort_requested(&self) -> bool {
        self.inner.abort_requested.load(Ordering::SeqCst)
    }

    /// Whether a pause is pending or in effect.
    pub fn pause_requested(&self) -> bool {
        self.inner.pause_requested.load(Ordering::SeqCst)
    }

    /// Current run state.
    pub fn state(&self) -> ScanState {
        self.inner.status.lock().0
    }

    /// Current engine phase.
    pub fn phase(&self) -> EnginePhase {
        self.inner.status.lock().1
    }

    pub(crate) fn begin(&self) {
        self.inner.abort_requested.store(false, Ordering::SeqCst);
        self.inner.pause_requested.store(false, Ordering::SeqCst);
        *self.inner.status.lock() = (ScanState::Running, EnginePhase::Initializing);
    }

    pub(crate) fn set_state(&self, state: ScanState) {
        self.inner.status.lock().0 = state;
    }

    pub(crate) fn set_phase(&self, phase: EnginePhase) {
        self.inner.status.lock().1 = phase;
    }

    pub(crate) fn finish(&self, state: ScanState) {
        self.inner.pause_requested.store(false, Ordering::SeqCst);
        *self.inner.status.lock() = (state, EnginePhase::Idle);
    }
}
