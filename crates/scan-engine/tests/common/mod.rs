//! Shared rigs for scan-engine integration tests.
#![allow(dead_code)]

use scan_core::{CounterOptions, DeviceRegistry};
use scan_driver_mock::{MockMode, SimCounter, SimMotor, TimingConfig};
use scan_engine::{Console, ScanContext, ScanSettings};
use std::sync::Arc;

/// One instant motor `m1` and one replaying counter `mon`.
pub struct Rig {
    pub ctx: ScanContext,
    pub m1: Arc<SimMotor>,
    pub mon: Arc<SimCounter>,
}

pub fn quiet_settings() -> ScanSettings {
    ScanSettings::default().quiet()
}

pub fn rig() -> Rig {
    rig_with(SimMotor::new(), SimCounter::builder().sequence(vec![10.0, 20.0, 30.0]).build())
}

pub fn rig_with(m1: SimMotor, mon: SimCounter) -> Rig {
    let m1 = Arc::new(m1);
    let mon = Arc::new(mon);
    let mut registry = DeviceRegistry::new();
    registry.add_scannable("m1", m1.clone()).unwrap();
    registry
        .add_countable("mon", mon.clone(), CounterOptions::default())
        .unwrap();
    let ctx = ScanContext::new(registry)
        .with_settings(quiet_settings())
        .with_console(Console::buffer());
    Rig { ctx, m1, mon }
}

/// Timed devices with no link latency: moves take `distance / speed` plus
/// `settle_ms`, counts take exactly their count time.
pub fn timed_motor(speed: f64, settle_ms: u64) -> SimMotor {
    SimMotor::builder()
        .mode(MockMode::Realistic)
        .speed(speed)
        .timing(TimingConfig {
            settling_time_ms: settle_ms,
            ..TimingConfig::default()
        })
        .build()
}

pub fn timed_counter(values: Vec<f64>) -> SimCounter {
    SimCounter::builder()
        .mode(MockMode::Realistic)
        .timing(TimingConfig::default())
        .sequence(values)
        .build()
}
