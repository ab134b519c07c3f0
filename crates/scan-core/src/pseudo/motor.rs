//! Pseudo motor: a virtual axis driven through N real motors.
//!
//! Each backing motor has an inverse formula mapping the virtual target `T`
//! to that motor's target. A single forward formula maps the backing motors'
//! current positions back to the virtual position.
//!
//! ```rust,ignore
//! // Center of a two-blade slit with a fixed 2 mm gap.
//! let center = PseudoMotor::builder("center")
//!     .axis("left", Formula::expression("left", "T - 1.0")?)
//!     .axis("right", Formula::expression("right", "T + 1.0")?)
//!     .forward(Formula::expression("center", "(left + right) / 2.0")?)
//!     .build(&registry)?;
//! ```

use crate::capabilities::{LimitViolation, Scannable, SoftLimits};
use crate::error::{ScanError, ScanResult};
use crate::formula::{BoundFormula, Formula};
use crate::registry::DeviceRegistry;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

/// Variable name of the virtual target in inverse formulas.
pub const TARGET_VARIABLE: &str = "T";

struct Axis {
    mnemonic: String,
    device: Arc<dyn Scannable>,
    inverse: BoundFormula,
}

/// Virtual scannable over real motors.
pub struct PseudoMotor {
    name: String,
    axes: Vec<Axis>,
    forward: BoundFormula,
    limits: SoftLimits,
}

impl std::fmt::Debug for PseudoMotor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PseudoMotor")
            .field("name", &self.name)
            .field("axes", &self.backing_mnemonics())
            .field("forward", &self.forward.name())
            .field("limits", &self.limits)
            .finish()
    }
}

impl PseudoMotor {
    /// Start building a pseudo motor.
    pub fn builder(name: impl Into<String>) -> PseudoMotorBuilder {
        PseudoMotorBuilder {
            name: name.into(),
            axes: Vec::new(),
            forward: None,
            limits: SoftLimits::UNBOUNDED,
        }
    }

    /// Pseudo motor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing motor mnemonics, in formula input order.
    pub fn backing_mnemonics(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.mnemonic.as_str()).collect()
    }

    /// Evaluate the inverse formulas: one target per backing motor.
    pub fn real_targets(&self, target: f64) -> ScanResult<Vec<f64>> {
        self.axes
            .iter()
            .map(|axis| axis.inverse.eval(&[target]))
            .collect()
    }

    /// Evaluate the forward formula over explicit real positions.
    pub fn virtual_position(&self, real_positions: &[f64]) -> ScanResult<f64> {
        self.forward.eval(real_positions)
    }

    /// Validate `target` against this motor's own range and every backing
    /// motor's soft limits. Returns the per-motor targets on success.
    fn validate(&self, target: f64) -> std::result::Result<Vec<f64>, ValidateError> {
        self.limits
            .check(target)
            .map_err(|v| ValidateError::Limit(v.on(self.name.clone())))?;
        let targets = self.real_targets(target).map_err(ValidateError::Formula)?;
        for (axis, real) in self.axes.iter().zip(&targets) {
            axis.device
                .check_target(*real)
                .map_err(|v| ValidateError::Limit(v.on(axis.mnemonic.clone())))?;
        }
        Ok(targets)
    }
}

enum ValidateError {
    Limit(LimitViolation),
    Formula(ScanError),
}

impl From<ValidateError> for ScanError {
    fn from(err: ValidateError) -> Self {
        match err {
            ValidateError::Limit(v) => v.into_scan_error(""),
            ValidateError::Formula(e) => e,
        }
    }
}

#[async_trait]
impl Scannable for PseudoMotor {
    /// Validates every backing target before issuing any move, so a rejected
    /// target never produces a partial move.
    async fn move_to(&self, target: f64) -> Result<()> {
        let targets = self.validate(target).map_err(ScanError::from)?;
        tracing::debug!(pseudo = %self.name, target, real_targets = ?targets, "Pseudo motor move");
        for (axis, real) in self.axes.iter().zip(targets) {
            axis.device.move_to(real).await.map_err(|source| ScanError::Device {
                mnemonic: axis.mnemonic.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Joins every backing motor; reports the first failure after all have
    /// finished.
    async fn wait(&self) -> Result<()> {
        let results = join_all(self.axes.iter().map(|axis| axis.device.wait())).await;
        for (axis, result) in self.axes.iter().zip(results) {
            result.map_err(|source| ScanError::Device {
                mnemonic: axis.mnemonic.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Forward formula over current (not target) positions.
    async fn value(&self) -> Result<f64> {
        let readings = join_all(self.axes.iter().map(|axis| axis.device.value())).await;
        let mut positions = Vec::with_capacity(readings.len());
        for (axis, reading) in self.axes.iter().zip(readings) {
            positions.push(reading.map_err(|source| ScanError::Device {
                mnemonic: axis.mnemonic.clone(),
                source,
            })?);
        }
        Ok(self.forward.eval(&positions)?)
    }

    fn limits(&self) -> SoftLimits {
        self.limits
    }

    fn check_target(&self, target: f64) -> std::result::Result<(), LimitViolation> {
        match self.validate(target) {
            Ok(_) => Ok(()),
            Err(ValidateError::Limit(v)) => Err(v),
            // An inverse that cannot be evaluated has no reachable target.
            Err(ValidateError::Formula(_)) => Err(LimitViolation {
                device: Some(self.name.clone()),
                target,
                low: self.limits.low,
                high: self.limits.high,
            }),
        }
    }

    async fn is_moving(&self) -> Result<bool> {
        for axis in &self.axes {
            if axis.device.is_moving().await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Stops every backing motor, even if one of them fails.
    async fn stop(&self) -> Result<()> {
        let results = join_all(self.axes.iter().map(|axis| axis.device.stop())).await;
        let mut first_error = None;
        for (axis, result) in self.axes.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(pseudo = %self.name, motor = %axis.mnemonic, error = %e, "Backing motor failed to stop");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Builder for [`PseudoMotor`].
pub struct PseudoMotorBuilder {
    name: String,
    axes: Vec<(String, Formula)>,
    forward: Option<Formula>,
    limits: SoftLimits,
}

impl PseudoMotorBuilder {
    /// Add a backing motor with its inverse formula (a function of `T`).
    pub fn axis(mut self, mnemonic: impl Into<String>, inverse: Formula) -> Self {
        self.axes.push((mnemonic.into(), inverse));
        self
    }

    /// Set the forward formula, a function of the backing mnemonics in
    /// `axis` order.
    pub fn forward(mut self, forward: Formula) -> Self {
        self.forward = Some(forward);
        self
    }

    /// Restrict the virtual range.
    pub fn with_limits(mut self, low: f64, high: f64) -> Self {
        self.limits = SoftLimits::new(low, high);
        self
    }

    /// Resolve backing motors and bind formulas.
    pub fn build(self, registry: &DeviceRegistry) -> ScanResult<PseudoMotor> {
        if self.axes.is_empty() {
            return Err(ScanError::Configuration(format!(
                "pseudo motor '{}' has no backing motors",
                self.name
            )));
        }
        let forward = self.forward.ok_or_else(|| {
            ScanError::Configuration(format!(
                "pseudo motor '{}' has no forward formula",
                self.name
            ))
        })?;

        let mnemonics: Vec<String> = self.axes.iter().map(|(m, _)| m.clone()).collect();
        for (i, mnemonic) in mnemonics.iter().enumerate() {
            if mnemonics[..i].contains(mnemonic) {
                return Err(ScanError::DuplicateMnemonic(mnemonic.clone()));
            }
        }
        let forward = forward.bind(&mnemonics)?;

        let target_input = [TARGET_VARIABLE.to_string()];
        let mut axes = Vec::with_capacity(self.axes.len());
        for (mnemonic, inverse) in self.axes {
            let device = registry.scannable(&mnemonic)?;
            let inverse = inverse.bind(&target_input)?;
            axes.push(Axis {
                mnemonic,
                device,
                inverse,
            });
        }

        Ok(PseudoMotor {
            name: self.name,
            axes,
            forward,
            limits: self.limits,
        })
    }
}
