//! `scan-core`
//!
//! Device-facing contracts and data model for rust-scan.
//!
//! This crate defines what a device must do to take part in a scan, the
//! pseudo devices built on top of real ones, and the table a scan records
//! into. The scan engine itself lives in `scan-engine`.
//!
//! ## Key Types
//!
//! - [`Scannable`] / [`Countable`]: capability traits for motors and counters
//! - [`DeviceRegistry`]: mnemonic-keyed registration of devices
//! - [`PseudoMotor`] / [`PseudoCounter`]: formula-defined virtual devices
//! - [`ScanTable`]: column-oriented result table with atomic row commits
//! - [`ScanError`]: error taxonomy shared by every crate
//! - [`fit::fit`]: peak, FWHM and center-of-mass characterization

pub mod capabilities;
pub mod error;
pub mod fit;
pub mod formula;
pub mod limits;
pub mod pseudo;
pub mod registry;
pub mod table;

pub use capabilities::{Countable, LimitViolation, Scannable, SoftLimits};
pub use error::{DriverError, DriverErrorKind, ScanError, ScanResult};
pub use fit::{FitError, FitOutcome, GaussianFit};
pub use formula::{BoundFormula, Formula};
pub use pseudo::{PseudoCounter, PseudoMotor, PseudoMotorBuilder};
pub use registry::{Capability, CounterOptions, DeviceHandle, DeviceRegistry};
pub use table::{Row, ScanTable, SharedTable, TableLayout, POINTS_FIELD};
