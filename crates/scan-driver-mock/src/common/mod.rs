//! Common infrastructure for simulated devices.
//!
//! - **mode**: Operational modes (Instant, Realistic, Chaos)
//! - **timing**: Settle, readout and link delays
//! - **errors**: Error injection
//! - **rng**: Seeded random number generator

pub mod errors;
pub mod mode;
pub mod rng;
pub mod timing;

pub use errors::{ErrorConfig, ErrorScenario};
pub use mode::MockMode;
pub use rng::MockRng;
pub use timing::TimingConfig;
