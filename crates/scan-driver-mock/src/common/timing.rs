//! Timing configuration for timed modes.

use std::time::Duration;

/// Delays applied by simulated devices in Realistic and Chaos modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Settling time after arrival, in milliseconds (motors)
    pub settling_time_ms: u64,
    /// Readout time added after the count window, in milliseconds (counters)
    pub readout_ms: u64,
    /// Link latency per command, in milliseconds
    pub communication_delay_ms: u64,
}

impl TimingConfig {
    /// Timing for a stepper motor
    pub fn motor() -> Self {
        Self {
            settling_time_ms: 50,
            readout_ms: 0,
            communication_delay_ms: 5,
        }
    }

    /// Timing for a scaler or detector
    pub fn counter() -> Self {
        Self {
            settling_time_ms: 0,
            readout_ms: 2,
            communication_delay_ms: 2,
        }
    }

    /// Settling time as a `Duration`
    pub fn settling(&self) -> Duration {
        Duration::from_millis(self.settling_time_ms)
    }

    /// Readout time as a `Duration`
    pub fn readout(&self) -> Duration {
        Duration::from_millis(self.readout_ms)
    }

    /// Link latency as a `Duration`
    pub fn communication(&self) -> Duration {
        Duration::from_millis(self.communication_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let config = TimingConfig::default();
        assert_eq!(config.settling(), Duration::ZERO);
        assert_eq!(config.readout(), Duration::ZERO);
        assert_eq!(config.communication(), Duration::ZERO);
    }

    #[test]
    fn test_presets() {
        assert_eq!(TimingConfig::motor().settling(), Duration::from_millis(50));
        assert_eq!(TimingConfig::counter().readout_ms, 2);
    }
}
