//! Error injection for simulated devices.
//!
//! Failures are raised as [`DriverError`]s so the scan engine classifies them
//! the same way it classifies real driver failures: `Timeout` kinds become
//! scan timeouts, everything else becomes a device error.

use super::rng::MockRng;
use parking_lot::Mutex;
use scan_core::error::{DriverError, DriverErrorKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Error injection configuration for simulated devices
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure probability (0.0 to 1.0); `"*"` matches any operation
    failure_rates: Arc<HashMap<&'static str, f64>>,
    /// Deterministic failure scenarios
    scenarios: Arc<Vec<ErrorScenario>>,
    rng: Arc<MockRng>,
    state: Arc<Mutex<ErrorState>>,
}

/// Deterministic failure scenario
#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// Let `count` calls of `operation` succeed, fail every later one
    FailAfterN {
        /// Operation name (`move`, `wait`, `count`, `read`)
        operation: &'static str,
        /// Successful calls before failing
        count: u32,
    },
    /// Report a timeout on every call of `operation`
    Timeout {
        /// Operation name
        operation: &'static str,
    },
    /// Never complete `operation`; the caller's deadline has to fire
    Stall {
        /// Operation name
        operation: &'static str,
    },
    /// First call fails with a link error; every later call fails too
    CommunicationLoss,
    /// First call latches a hardware fault; every later call fails too
    HardwareFault {
        /// Fault code reported in the message
        code: u32,
    },
}

#[derive(Default, Debug)]
struct ErrorState {
    operation_counts: HashMap<&'static str, u32>,
    communication_lost: bool,
    hardware_fault_code: u32,
}

impl ErrorConfig {
    /// No injected errors
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Uniform random failures on every operation, reproducible with `seed`
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::build(rates, Vec::new(), seed)
    }

    /// A single scenario
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scenarios, checked in order
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Custom failure probability per operation
    pub fn with_rates(rates: HashMap<&'static str, f64>) -> Self {
        Self::build(rates, Vec::new(), None)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Whether `operation` is configured to never complete
    pub fn stalls(&self, operation: &str) -> bool {
        self.scenarios
            .iter()
            .any(|s| matches!(s, ErrorScenario::Stall { operation: op } if *op == operation))
    }

    /// Check whether `operation` fails now, counting the attempt
    pub fn check_operation(
        &self,
        driver_type: &str,
        operation: &'static str,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Communication,
                "Communication lost",
            ));
        }
        if state.hardware_fault_code != 0 {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Hardware fault: {}", state.hardware_fault_code),
            ));
        }

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation => {
                    let seen = state.operation_counts.entry(operation).or_insert(0);
                    *seen += 1;
                    if *seen > *count {
                        return Err(DriverError::new(
                            driver_type,
                            DriverErrorKind::Hardware,
                            format!("Injected '{operation}' failure after {count} calls"),
                        ));
                    }
                }
                ErrorScenario::Timeout { operation: op } if *op == operation => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Timeout,
                        format!("Operation '{operation}' timed out"),
                    ));
                }
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Communication,
                        "Communication lost",
                    ));
                }
                ErrorScenario::HardwareFault { code } => {
                    state.hardware_fault_code = *code;
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Hardware fault: {code}"),
                    ));
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);
        if self.rng.should_fail(rate) {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Random failure on operation '{operation}'"),
            ));
        }
        Ok(())
    }

    /// Clear counters and latched faults
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}
