//! Simulated Devices for rust-scan
//!
//! Scannable and countable devices for exercising the scan engine without
//! hardware. All waiting uses `tokio::time`, so tests can run on a paused
//! clock.
//!
//! # Available Devices
//!
//! - [`SimMotor`] - motor with soft limits, travel speed, settle time and error injection
//! - [`SimCounter`] - counter with random, replayed or position-dependent readings
//! - [`NullMotor`] - always-settled motor without limits
//!
//! # Modes
//!
//! Every device defaults to [`MockMode::Instant`]. `Realistic` honors travel,
//! settle and count times; `Chaos` does the same and is meant to be combined
//! with an [`ErrorConfig`].
//!
//! ```rust,ignore
//! use scan_driver_mock::{ErrorConfig, ErrorScenario, SimMotor};
//!
//! // Fails on the fourth move.
//! let m1 = SimMotor::builder()
//!     .error_config(ErrorConfig::scenario(ErrorScenario::FailAfterN {
//!         operation: "move",
//!         count: 3,
//!     }))
//!     .build();
//! ```

pub mod common;
mod null_motor;
mod sim_counter;
mod sim_motor;

pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig};

pub use null_motor::NullMotor;
pub use sim_counter::{SimCounter, SimCounterBuilder, ValueSource};
pub use sim_motor::{SimMotor, SimMotorBuilder};
