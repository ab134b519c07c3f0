//! Integration tests for the simulated devices through the capability traits.

use scan_core::capabilities::{Countable, Scannable};
use scan_core::{CounterOptions, DeviceRegistry, Formula, PseudoCounter, PseudoMotor};
use scan_driver_mock::*;
use std::sync::Arc;

#[tokio::test]
async fn devices_work_behind_trait_objects() {
    let motors: Vec<Arc<dyn Scannable>> = vec![
        Arc::new(SimMotor::new()),
        Arc::new(NullMotor::new()),
    ];
    for motor in &motors {
        motor.move_to(2.0).await.unwrap();
        motor.wait().await.unwrap();
        assert_eq!(motor.value().await.unwrap(), 2.0);
    }

    let counter: Arc<dyn Countable> = Arc::new(SimCounter::builder().sequence(vec![5.0]).build());
    counter.set_count_time(0.1).await.unwrap();
    counter.start_count().await.unwrap();
    counter.wait().await.unwrap();
    assert_eq!(counter.value().await.unwrap(), 5.0);
}

#[tokio::test]
async fn fail_after_n_moves() {
    let motor = SimMotor::builder()
        .error_config(ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "move",
            count: 3,
        }))
        .build();
    for target in [1.0, 2.0, 3.0] {
        motor.move_to(target).await.unwrap();
    }
    assert!(motor.move_to(4.0).await.is_err());
    motor.error_config().reset();
    assert!(motor.move_to(4.0).await.is_ok());
}

#[tokio::test]
async fn pseudo_devices_over_simulated_hardware() {
    let mut registry = DeviceRegistry::new();
    registry
        .add_scannable("tth", Arc::new(SimMotor::builder().limits(-90.0, 90.0).build()))
        .unwrap();
    registry
        .add_scannable("th", Arc::new(SimMotor::builder().limits(-45.0, 45.0).build()))
        .unwrap();
    let c1 = Arc::new(SimCounter::builder().sequence(vec![10.0]).build());
    let c2 = Arc::new(SimCounter::builder().sequence(vec![4.0]).build());
    registry
        .add_countable("c1", c1.clone(), CounterOptions::default())
        .unwrap();
    registry
        .add_countable("c2", c2.clone(), CounterOptions::default())
        .unwrap();

    // Coupled theta / two-theta.
    let coupled = PseudoMotor::builder("q")
        .axis("tth", Formula::expression("tth", "2.0 * T").unwrap())
        .axis("th", Formula::expression("th", "T").unwrap())
        .forward(Formula::expression("q", "(tth / 2.0 + th) / 2.0").unwrap())
        .build(&registry)
        .unwrap();
    coupled.move_to(20.0).await.unwrap();
    coupled.wait().await.unwrap();
    assert!((coupled.value().await.unwrap() - 20.0).abs() < 1e-9);
    // Both axes violate at 50; tth is checked first.
    assert_eq!(coupled.check_target(50.0).unwrap_err().device.as_deref(), Some("tth"));

    let ratio = PseudoCounter::new(
        "ratio",
        &["c1", "c2"],
        Formula::expression("ratio", "c1 / c2").unwrap(),
        &registry,
    )
    .unwrap();
    for counter in [&c1, &c2] {
        counter.start_count().await.unwrap();
        counter.wait().await.unwrap();
    }
    assert_eq!(ratio.value().await.unwrap(), 2.5);
}
