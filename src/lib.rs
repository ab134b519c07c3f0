//! # rust_scan
//!
//! Scan orchestration over scannable and countable devices: motors are
//! stepped through a trajectory, counters are sampled at every point, and
//! the results land in a column-oriented table that can be fitted, written
//! and plotted.
//!
//! ## Crate Structure
//!
//! - **`core`** ([`scan_core`]): capability traits, device registry, pseudo
//!   devices, result table, fitting and the error taxonomy
//! - **`engine`** ([`scan_engine`]): trajectories, callbacks, settings and
//!   the per-point state machine behind `scan`, `mesh` and `timescan`
//! - **`storage`** ([`scan_storage`]): the text scan file writer
//! - **`mock`** ([`scan_driver_mock`]): simulated motors and counters
//! - **`logging`**: `tracing` subscriber setup
//!
//! ```rust,ignore
//! use rust_scan::prelude::*;
//!
//! let mut registry = DeviceRegistry::new();
//! registry.add_scannable("m1", Arc::new(SimMotor::new()))?;
//! registry.add_countable("mon", Arc::new(SimCounter::new()), CounterOptions::default())?;
//! let mut ctx = ScanContext::new(registry);
//! let report = ctx.scan("m1", 0.0, 10.0, 5, 1.0).await?;
//! ```

pub mod logging;

pub use scan_core as core;
pub use scan_driver_mock as mock;
pub use scan_engine as engine;
pub use scan_storage as storage;

/// Types most callers need.
pub mod prelude {
    pub use scan_core::{
        Countable, CounterOptions, DeviceRegistry, Formula, PseudoCounter, PseudoMotor,
        ScanError, ScanResult, ScanTable, Scannable, SoftLimits,
    };
    pub use scan_driver_mock::{NullMotor, SimCounter, SimMotor};
    pub use scan_engine::{
        Phase, Plotter, ScanContext, ScanControl, ScanPlan, ScanReport, ScanSettings,
        ScanStatus,
    };
    pub use std::sync::Arc;
}
