//! Motor placeholder that never moves anything.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use scan_core::capabilities::{Scannable, SoftLimits};

/// Always-settled scannable without limits.
///
/// The readback is the last commanded target. Useful to stand in for an axis
/// that is not installed, or to drive a scan with no physical motion.
#[derive(Debug, Default)]
pub struct NullMotor {
    position: Mutex<f64>,
}

impl NullMotor {
    /// Null motor at 0.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Scannable for NullMotor {
    async fn move_to(&self, target: f64) -> Result<()> {
        *self.position.lock() = target;
        Ok(())
    }

    async fn wait(&self) -> Result<()> {
        Ok(())
    }

    async fn value(&self) -> Result<f64> {
        Ok(*self.position.lock())
    }

    fn limits(&self) -> SoftLimits {
        SoftLimits::UNBOUNDED
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}
