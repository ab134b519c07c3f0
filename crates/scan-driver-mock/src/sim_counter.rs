//! Simulated counter.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use scan_core::capabilities::{Countable, Scannable};
use scan_core::error::{DriverError, DriverErrorKind};
use std::sync::Arc;
use tokio::time::{Duration, Instant, sleep, sleep_until};

use crate::common::{ErrorConfig, MockMode, MockRng, TimingConfig};

const DRIVER: &str = "sim_counter";

/// Where a simulated counter's readings come from.
#[derive(Clone)]
pub enum ValueSource {
    /// `U(0, 1) * 100 * count_time`
    Random,
    /// Replays the values in order, wrapping around.
    Sequence(Vec<f64>),
    /// Profile evaluated at a scannable's readback when the count completes,
    /// scaled by the count time.
    Profile {
        /// Device whose position is sampled.
        source: Arc<dyn Scannable>,
        /// Rate as a function of position.
        profile: Arc<dyn Fn(f64) -> f64 + Send + Sync>,
    },
}

impl std::fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Random => write!(f, "Random"),
            ValueSource::Sequence(values) => f.debug_tuple("Sequence").field(values).finish(),
            ValueSource::Profile { .. } => write!(f, "Profile"),
        }
    }
}

#[derive(Debug, Default)]
struct CounterState {
    count_time: f64,
    preset: Option<f64>,
    window_end: Option<Instant>,
    started: Option<Instant>,
    last: f64,
    completed: usize,
}

/// Simulated scaler/detector.
///
/// `start_count` opens a window of `count_time` seconds (zero in instant
/// mode); `wait` sleeps until it closes and latches a value from the
/// configured [`ValueSource`]. A counter built with `can_monitor` accepts a
/// preset and then counts for `preset` seconds.
#[derive(Clone)]
pub struct SimCounter {
    state: Arc<Mutex<CounterState>>,
    source: ValueSource,
    can_monitor: bool,
    can_stop: bool,
    timing: TimingConfig,
    mode: MockMode,
    rng: Arc<MockRng>,
    error_config: ErrorConfig,
}

impl SimCounter {
    /// Instant-mode counter with random readings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Builder.
    pub fn builder() -> SimCounterBuilder {
        SimCounterBuilder::new()
    }

    /// Number of completed counts.
    pub fn completed_counts(&self) -> usize {
        self.state.lock().completed
    }

    /// Configured count time in seconds.
    pub fn count_time(&self) -> f64 {
        self.state.lock().count_time
    }

    /// Configured monitor preset.
    pub fn preset(&self) -> Option<f64> {
        self.state.lock().preset
    }

    async fn sample(&self, index: usize, seconds: f64) -> Result<f64> {
        match &self.source {
            ValueSource::Random => Ok(self.rng.next_f64() * 100.0 * seconds),
            ValueSource::Sequence(values) => values
                .get(index % values.len().max(1))
                .copied()
                .ok_or_else(|| anyhow!("sim_counter has an empty value sequence")),
            ValueSource::Profile { source, profile } => {
                let position = source.value().await?;
                Ok(profile(position) * seconds)
            }
        }
    }

    async fn latch(&self, seconds: f64) -> Result<()> {
        let index = self.state.lock().completed;
        let value = self.sample(index, seconds).await?;
        let mut state = self.state.lock();
        state.last = value;
        state.completed += 1;
        state.window_end = None;
        state.started = None;
        tracing::debug!(value, count = state.completed, "SimCounter: count complete");
        Ok(())
    }
}

impl Default for SimCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Countable for SimCounter {
    async fn start_count(&self) -> Result<()> {
        self.error_config.check_operation(DRIVER, "count")?;
        let now = Instant::now();
        let mut state = self.state.lock();
        let window = if self.mode.is_timed() {
            Duration::from_secs_f64(state.count_time.max(0.0)) + self.timing.readout()
        } else {
            Duration::ZERO
        };
        state.started = Some(now);
        state.window_end = Some(now + window);
        Ok(())
    }

    async fn wait(&self) -> Result<()> {
        if self.error_config.stalls("wait") {
            std::future::pending::<()>().await;
        }
        self.error_config.check_operation(DRIVER, "wait")?;
        let (window_end, seconds) = {
            let state = self.state.lock();
            (state.window_end, state.count_time)
        };
        if let Some(end) = window_end {
            sleep_until(end).await;
            self.latch(seconds).await?;
        }
        Ok(())
    }

    async fn value(&self) -> Result<f64> {
        self.error_config.check_operation(DRIVER, "read")?;
        Ok(self.state.lock().last)
    }

    /// Closes an open window early; the latched value reflects the time
    /// actually counted.
    async fn stop_count(&self) -> Result<()> {
        let started = self.state.lock().started;
        if let Some(started) = started {
            let counted = if self.mode.is_timed() {
                started.elapsed().as_secs_f64()
            } else {
                self.state.lock().count_time
            };
            self.latch(counted).await?;
        }
        Ok(())
    }

    fn can_monitor(&self) -> bool {
        self.can_monitor
    }

    fn can_stop_count(&self) -> bool {
        self.can_stop
    }

    async fn set_count_time(&self, seconds: f64) -> Result<()> {
        if seconds.is_nan() || seconds < 0.0 {
            return Err(DriverError::new(
                DRIVER,
                DriverErrorKind::InvalidParameter,
                format!("count time must be non-negative, got {seconds}"),
            )
            .into());
        }
        if self.mode.is_timed() {
            sleep(self.timing.communication()).await;
        }
        self.state.lock().count_time = seconds;
        Ok(())
    }

    async fn set_preset(&self, preset: f64) -> Result<()> {
        if !self.can_monitor {
            anyhow::bail!("Monitor preset not supported by this device");
        }
        let mut state = self.state.lock();
        state.preset = Some(preset);
        state.count_time = preset;
        Ok(())
    }

    async fn is_counting(&self) -> Result<bool> {
        let now = Instant::now();
        Ok(self.state.lock().window_end.is_some_and(|end| now < end))
    }
}

/// Builder for [`SimCounter`].
pub struct SimCounterBuilder {
    source: ValueSource,
    can_monitor: bool,
    can_stop: bool,
    count_time: f64,
    timing: TimingConfig,
    mode: MockMode,
    seed: Option<u64>,
    error_config: ErrorConfig,
}

impl SimCounterBuilder {
    /// Defaults: random readings, 1 s count time, stoppable, instant mode.
    pub fn new() -> Self {
        Self {
            source: ValueSource::Random,
            can_monitor: false,
            can_stop: true,
            count_time: 1.0,
            timing: TimingConfig::counter(),
            mode: MockMode::Instant,
            seed: None,
            error_config: ErrorConfig::none(),
        }
    }

    /// Replay a fixed sequence of readings.
    pub fn sequence(mut self, values: impl Into<Vec<f64>>) -> Self {
        self.source = ValueSource::Sequence(values.into());
        self
    }

    /// Read a rate profile at a scannable's position.
    pub fn profile<F>(mut self, source: Arc<dyn Scannable>, profile: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        self.source = ValueSource::Profile {
            source,
            profile: Arc::new(profile),
        };
        self
    }

    /// Seed the random source.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Allow use as the monitor.
    pub fn can_monitor(mut self, enabled: bool) -> Self {
        self.can_monitor = enabled;
        self
    }

    /// Whether `stop_count` is honored.
    pub fn can_stop(mut self, enabled: bool) -> Self {
        self.can_stop = enabled;
        self
    }

    /// Initial count time in seconds.
    pub fn count_time(mut self, seconds: f64) -> Self {
        self.count_time = seconds;
        self
    }

    /// Readout and link timing.
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

    /// Build the counter.
    pub fn build(self) -> SimCounter {
        SimCounter {
            state: Arc::new(Mutex::new(CounterState {
                count_time: self.count_time,
                ..Default::default()
            })),
            source: self.source,
            can_monitor: self.can_monitor,
            can_stop: self.can_stop,
            timing: self.timing,
            mode: self.mode,
            rng: Arc::new(MockRng::new(self.seed)),
            error_config: self.error_config,
        }
    }
}

impl Default for SimCounterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
