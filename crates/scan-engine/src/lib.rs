//! `scan-engine`
//!
//! Drives scans over the devices of a [`scan_core::DeviceRegistry`].
//!
//! ## Key Types
//!
//! - [`ScanContext`]: registry, settings, callbacks and result table
//! - [`ScanPlan`] / [`Trajectory`]: what to move where, lockstep, mesh or time
//! - [`ScanEngine`]: the per-point state machine
//! - [`Callbacks`] / [`ScanHook`]: the seven callback slots
//! - [`ScanControl`]: abort, pause and resume from another task
//!
//! ```rust,ignore
//! let mut ctx = ScanContext::new(registry);
//! let report = ctx.scan("m1", 0.0, 10.0, 5, 1.0).await?;
//! assert_eq!(report.points, 6);
//! ```

mod api;
pub mod callbacks;
pub mod console;
pub mod context;
pub mod control;
pub mod engine;
pub mod plot;
pub mod settings;
pub mod trajectory;

pub use callbacks::{hook_fn, Callbacks, HookScope, Phase, ScanHook};
pub use console::Console;
pub use context::ScanContext;
pub use control::{EnginePhase, ScanControl, ScanState};
pub use engine::{ScanEngine, ScanPlan, ScanReport, ScanStatus};
pub use plot::Plotter;
pub use settings::ScanSettings;
pub use trajectory::{MeshOptions, PerPoint, ScanMode, ScanParam, TimeLimits, Trajectory};
