//! Pseudo devices: motors and counters defined by formulas over real devices.

pub mod counter;
pub mod motor;

pub use counter::PseudoCounter;
pub use motor::{PseudoMotor, PseudoMotorBuilder, TARGET_VARIABLE};
