//! Pseudo counter: a read-only value computed from real counters.

use crate::capabilities::Countable;
use crate::error::{ScanError, ScanResult};
use crate::formula::{BoundFormula, Formula};
use crate::registry::DeviceRegistry;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Virtual countable evaluating a formula over the last completed values of
/// its backing counters.
///
/// Counting is a no-op: the engine starts and waits on the real counters,
/// and this device reads whatever they last produced. Backing values are
/// raw device values; counter scaling factors apply only to recorded columns.
pub struct PseudoCounter {
    name: String,
    inputs: Vec<(String, Arc<dyn Countable>)>,
    formula: BoundFormula,
}

impl std::fmt::Debug for PseudoCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PseudoCounter")
            .field("name", &self.name)
            .field("inputs", &self.formula.inputs())
            .field("formula", &self.formula.name())
            .finish()
    }
}

impl PseudoCounter {
    /// Resolve `backing` counters from the registry and bind `formula` to
    /// them, in order.
    pub fn new(
        name: impl Into<String>,
        backing: &[&str],
        formula: Formula,
        registry: &DeviceRegistry,
    ) -> ScanResult<Self> {
        let name = name.into();
        if backing.is_empty() {
            return Err(ScanError::Configuration(format!(
                "pseudo counter '{name}' has no backing counters"
            )));
        }
        let mnemonics: Vec<String> = backing.iter().map(|m| m.to_string()).collect();
        let formula = formula.bind(&mnemonics)?;
        let inputs = mnemonics
            .into_iter()
            .map(|m| registry.countable(&m).map(|device| (m, device)))
            .collect::<ScanResult<Vec<_>>>()?;
        Ok(Self {
            name,
            inputs,
            formula,
        })
    }

    /// Pseudo counter name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Countable for PseudoCounter {
    async fn start_count(&self) -> Result<()> {
        Ok(())
    }

    async fn wait(&self) -> Result<()> {
        Ok(())
    }

    async fn value(&self) -> Result<f64> {
        let mut values = Vec::with_capacity(self.inputs.len());
        for (mnemonic, device) in &self.inputs {
            values.push(device.value().await.map_err(|source| ScanError::Device {
                mnemonic: mnemonic.clone(),
                source,
            })?);
        }
        Ok(self.formula.eval(&values)?)
    }
}
