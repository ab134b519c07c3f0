//! Simulated motor.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use scan_core::capabilities::{Scannable, SoftLimits};
use std::sync::Arc;
use tokio::time::{Duration, Instant, sleep, sleep_until};

use crate::common::{ErrorConfig, MockMode, TimingConfig};

const DRIVER: &str = "sim_motor";

#[derive(Debug)]
struct Motion {
    from: f64,
    to: f64,
    started: Instant,
    travel: Duration,
    settled_at: Instant,
}

#[derive(Debug)]
struct MotorState {
    position: f64,
    motion: Option<Motion>,
}

impl MotorState {
    /// Readback: interpolated along the current motion, if any.
    fn readback(&self, now: Instant) -> f64 {
        match &self.motion {
            None => self.position,
            Some(m) if m.travel.is_zero() => m.to,
            Some(m) => {
                let fraction =
                    (now.saturating_duration_since(m.started).as_secs_f64() / m.travel.as_secs_f64()).min(1.0);
                m.from + (m.to - m.from) * fraction
            }
        }
    }
}

/// Simulated motor.
///
/// `move_to` returns as soon as the move is issued; the readback travels
/// toward the target at the configured speed and `wait` returns once the
/// motor has arrived and settled. Soft limits of `[0, 0]` disable checking.
///
/// ```rust,ignore
/// let m1 = SimMotor::builder()
///     .limits(-10.0, 10.0)
///     .mode(MockMode::Realistic)
///     .speed(20.0)
///     .build();
/// m1.move_to(5.0).await?;
/// m1.wait().await?;
/// ```
#[derive(Clone)]
pub struct SimMotor {
    state: Arc<Mutex<MotorState>>,
    limits: SoftLimits,
    speed: f64,
    timing: TimingConfig,
    mode: MockMode,
    error_config: ErrorConfig,
}

impl SimMotor {
    /// Instant-mode motor at 0 without limits.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Builder.
    pub fn builder() -> SimMotorBuilder {
        SimMotorBuilder::new()
    }

    /// Current target while a move is in progress.
    pub fn target(&self) -> Option<f64> {
        self.state.lock().motion.as_ref().map(|m| m.to)
    }

    /// Error injection handle.
    pub fn error_config(&self) -> &ErrorConfig {
        &self.error_config
    }

    fn travel_time(&self, distance: f64) -> Duration {
        if !self.mode.is_timed() || self.speed <= 0.0 || !self.speed.is_finite() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(distance.abs() / self.speed)
    }

    fn settle_time(&self) -> Duration {
        if self.mode.is_timed() {
            self.timing.settling()
        } else {
            Duration::ZERO
        }
    }
}

impl Default for SimMotor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scannable for SimMotor {
    async fn move_to(&self, target: f64) -> Result<()> {
        self.error_config.check_operation(DRIVER, "move")?;
        self.limits.check(target)?;

        if self.mode.is_timed() {
            sleep(self.timing.communication()).await;
        }

        let now = Instant::now();
        let mut state = self.state.lock();
        let from = state.readback(now);
        let travel = self.travel_time(target - from);
        state.position = from;
        state.motion = Some(Motion {
            from,
            to: target,
            started: now,
            travel,
            settled_at: now + travel + self.settle_time(),
        });
        tracing::debug!(from, target, ?travel, "SimMotor: move issued");
        Ok(())
    }

    async fn wait(&self) -> Result<()> {
        if self.error_config.stalls("wait") {
            std::future::pending::<()>().await;
        }
        self.error_config.check_operation(DRIVER, "wait")?;

        let deadline = self.state.lock().motion.as_ref().map(|m| m.settled_at);
        if let Some(deadline) = deadline {
            sleep_until(deadline).await;
            let mut state = self.state.lock();
            if let Some(motion) = state.motion.take() {
                state.position = motion.to;
                tracing::debug!(position = motion.to, "SimMotor: settled");
            }
        }
        Ok(())
    }

    async fn value(&self) -> Result<f64> {
        self.error_config.check_operation(DRIVER, "read")?;
        Ok(self.state.lock().readback(Instant::now()))
    }

    fn limits(&self) -> SoftLimits {
        self.limits
    }

    async fn is_moving(&self) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .state
            .lock()
            .motion
            .as_ref()
            .is_some_and(|m| now < m.settled_at))
    }

    async fn stop(&self) -> Result<()> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.position = state.readback(now);
        state.motion = None;
        tracing::debug!(position = state.position, "SimMotor: stopped");
        Ok(())
    }
}

/// Builder for [`SimMotor`].
pub struct SimMotorBuilder {
    initial_position: f64,
    limits: SoftLimits,
    speed: f64,
    timing: TimingConfig,
    mode: MockMode,
    error_config: ErrorConfig,
}

impl SimMotorBuilder {
    /// Defaults: position 0, no limits, 10 units/s, instant mode.
    pub fn new() -> Self {
        Self {
            initial_position: 0.0,
            limits: SoftLimits::UNBOUNDED,
            speed: 10.0,
            timing: TimingConfig::motor(),
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
        }
    }

    /// Starting position.
    pub fn initial_position(mut self, position: f64) -> Self {
        self.initial_position = position;
        self
    }

    /// Soft limits; `(0.0, 0.0)` disables checking.
    pub fn limits(mut self, low: f64, high: f64) -> Self {
        self.limits = SoftLimits::new(low, high);
        self
    }

    /// Travel speed in units per second.
    pub fn speed(mut self, units_per_sec: f64) -> Self {
        self.speed = units_per_sec;
        self
    }

    /// Settle and link timing.
    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Operational mode.
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Error injection.
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Build the motor.
    pub fn build(self) -> SimMotor {
        SimMotor {
            state: Arc::new(Mutex::new(MotorState {
                position: self.initial_position,
                motion: None,
            })),
            limits: self.limits,
            speed: self.speed,
            timing: self.timing,
            mode: self.mode,
            error_config: self.error_config,
        }
    }
}

impl Default for SimMotorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
