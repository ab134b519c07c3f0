//! Simulated alignment scan.
//!
//! Steps a simulated slit pair through a pseudo motor, counts a detector
//! whose rate peaks at 1.2, fits the peak and writes the scan file.
//!
//! Run with:
//! ```bash
//! cargo run --example sim_scan
//! RUST_LOG=debug cargo run --example sim_scan -- data/align.dat
//! ```

use rust_scan::logging::{self, LoggingConfig};
use rust_scan::mock::{MockMode, TimingConfig};
use rust_scan::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(LoggingConfig::from_level_str("info")?)?;

    let motor = |position: f64| {
        Arc::new(
            SimMotor::builder()
                .initial_position(position)
                .limits(-10.0, 10.0)
                .mode(MockMode::Realistic)
                .speed(50.0)
                .timing(TimingConfig {
                    settling_time_ms: 20,
                    ..TimingConfig::default()
                })
                .build(),
        )
    };
    let left = motor(-0.5);
    let right = motor(0.5);

    let mut registry = DeviceRegistry::new();
    registry.add_scannable("left", left.clone())?;
    registry.add_scannable("right", right.clone())?;

    let center = PseudoMotor::builder("center")
        .axis("left", Formula::expression("left", "T - 0.5")?)
        .axis("right", Formula::expression("right", "T + 0.5")?)
        .forward(Formula::expression("center", "(left + right) / 2.0")?)
        .with_limits(-5.0, 5.0)
        .build(&registry)?;
    let center: Arc<dyn Scannable> = Arc::new(center);
    registry.add_scannable("center", center.clone())?;

    let monitor = SimCounter::builder()
        .mode(MockMode::Realistic)
        .sequence(vec![1000.0])
        .build();
    let detector = SimCounter::builder()
        .mode(MockMode::Realistic)
        .profile(center, |x| 20.0 + 800.0 * (-(x - 1.2).powi(2) / 0.5).exp())
        .build();
    registry.add_countable("mon", Arc::new(monitor), CounterOptions::default())?;
    registry.add_countable("det", Arc::new(detector), CounterOptions::default())?;

    let mut settings = ScanSettings::from_env()?;
    settings.x_field = Some("center".into());
    settings.y_field = Some("det".into());
    settings.comment = "simulated slit alignment".into();
    if let Some(path) = std::env::args().nth(1) {
        settings.output = Some(path.into());
    }

    let mut ctx = ScanContext::new(registry).with_settings(settings);
    let report = ctx.scan("center", -2.0, 4.0, 24, 0.05).await?;

    println!();
    println!("scan {} finished: {:?}, {} points", report.scan_uid, report.status, report.points);
    if let Some(fit) = &report.fit {
        println!("peak {:.1} at {:.3}, FWHM {:.3}", fit.peak, fit.peak_at, fit.fwhm);
    }
    if let Some(path) = &report.output {
        println!("written to {}", path.display());
    }
    Ok(())
}
