//! End-to-end behavior of lockstep, mesh and time scans.

mod common;

use common::{quiet_settings, rig, rig_with, timed_counter, timed_motor};
use scan_core::{CounterOptions, DeviceHandle, DeviceRegistry, Formula, PseudoCounter, Scannable, POINTS_FIELD};
use scan_driver_mock::{NullMotor, SimCounter, SimMotor};
use scan_engine::{Phase, ScanContext, ScanParam, ScanPlan, ScanStatus};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn linear_scan_records_every_point() {
    let mut rig = rig();
    let report = rig.ctx.scan("m1", 0.0, 10.0, 5, 1.0).await.unwrap();

    assert_eq!(report.status, ScanStatus::Completed);
    assert_eq!(report.points, 6);
    assert_eq!(report.x_field, "m1");
    assert_eq!(report.y_field, "mon");

    let table = rig.ctx.table();
    let table = table.read();
    assert_eq!(table.points(), &[0, 1, 2, 3, 4, 5]);
    assert_eq!(table.column("m1").unwrap(), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
    assert_eq!(
        table.column("mon").unwrap(),
        vec![10.0, 20.0, 30.0, 10.0, 20.0, 30.0]
    );
    assert_eq!(table.timestamps().len(), 6);
    assert!(table.scan_start().is_some());
    assert!(table.scan_end() >= table.scan_start());
    assert!(table.error().is_none());
    assert_eq!(rig.mon.completed_counts(), 6);
    assert_eq!(rig.m1.value().await.unwrap(), 10.0);
}

#[tokio::test(start_paused = true)]
async fn scan_duration_is_settle_plus_count_time() {
    let mut rig = rig_with(timed_motor(10.0, 100), timed_counter(vec![1.0]));
    let report = rig.ctx.scan("m1", 0.0, 10.0, 5, 1.0).await.unwrap();

    // First point: no travel, 0.1 s settle. Then 2 units at 10/s plus settle,
    // five times. One second of counting per point.
    let expected = 0.1 + 5.0 * 0.3 + 6.0 * 1.0;
    let measured = report.duration.as_secs_f64();
    assert!((measured - expected).abs() < 0.05, "duration {measured}");

    let timestamps = rig.ctx.table().read().timestamps().to_vec();
    assert!(timestamps.windows(2).all(|w| w[1] > w[0]));
    assert!((timestamps[0] - 1.1).abs() < 0.01, "first row at {}", timestamps[0]);
}

#[tokio::test]
async fn lockstep_scan_moves_every_device() {
    let mut registry = DeviceRegistry::new();
    registry.add_scannable("m1", Arc::new(SimMotor::new())).unwrap();
    registry.add_scannable("m2", Arc::new(SimMotor::new())).unwrap();
    registry
        .add_countable("det", Arc::new(SimCounter::new()), CounterOptions::default())
        .unwrap();
    let mut ctx = ScanContext::new(registry).with_settings(quiet_settings());

    let report = ctx
        .scan_many(&[("m1", 0.0, 1.0), ("m2", 10.0, 0.0)], 2, 0.1)
        .await
        .unwrap();
    assert_eq!(report.points, 3);
    let table = ctx.table();
    let table = table.read();
    assert_eq!(table.column("m1").unwrap(), vec![0.0, 0.5, 1.0]);
    assert_eq!(table.column("m2").unwrap(), vec![10.0, 5.0, 0.0]);
}

#[tokio::test]
async fn explicit_point_lists_must_have_equal_length() {
    let mut registry = DeviceRegistry::new();
    registry.add_scannable("m1", Arc::new(SimMotor::new())).unwrap();
    registry.add_scannable("m2", Arc::new(SimMotor::new())).unwrap();
    let mut ctx = ScanContext::new(registry).with_settings(quiet_settings());

    let plan = ScanPlan::scan(vec![
        ScanParam::points("m1", vec![0.0, 1.0, 2.0]).unwrap(),
        ScanParam::points("m2", vec![0.0, 1.0]).unwrap(),
    ]);
    let err = ctx.run(plan).await.unwrap_err();
    assert!(err.is_configuration(), "{err}");
}

fn mesh_context() -> ScanContext {
    let mut registry = DeviceRegistry::new();
    registry.add_scannable("m1", Arc::new(SimMotor::new())).unwrap();
    registry.add_scannable("m2", Arc::new(NullMotor::new())).unwrap();
    registry
        .add_countable("det", Arc::new(SimCounter::new()), CounterOptions::default())
        .unwrap();
    ScanContext::new(registry).with_settings(quiet_settings())
}

#[tokio::test]
async fn mesh_is_outer_product_with_last_device_fastest() {
    let mut ctx = mesh_context();
    let report = ctx
        .mesh(&[("m1", 0.0, 1.0, 1), ("m2", 0.0, 2.0, 2)], 0.1)
        .await
        .unwrap();

    assert_eq!(report.points, 2 * 3);
    let table = ctx.table();
    let table = table.read();
    assert_eq!(table.column("m1").unwrap(), vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    assert_eq!(table.column("m2").unwrap(), vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
    assert_eq!(table.column("det").unwrap().len(), 6);
}

#[tokio::test]
async fn snake_mesh_reverses_alternate_rows() {
    let mut ctx = mesh_context();
    let plan = ScanPlan::mesh(vec![
        ScanParam::linear("m1", 0.0, 2.0, 2).unwrap(),
        ScanParam::linear("m2", 0.0, 1.0, 1).unwrap(),
    ])
    .with_snake(true)
    .with_count_time(0.1);
    ctx.run(plan).await.unwrap();

    let table = ctx.table();
    let table = table.read();
    assert_eq!(table.column("m1").unwrap(), vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
    assert_eq!(table.column("m2").unwrap(), vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
}

#[tokio::test(start_paused = true)]
async fn timescan_stops_at_repeat() {
    let mut rig = rig_with(SimMotor::new(), timed_counter(vec![5.0]));
    let report = rig.ctx.timescan(0.5, 0.0, Some(4), None).await.unwrap();

    assert_eq!(report.points, 4);
    assert_eq!(report.x_field, POINTS_FIELD);
    let table = rig.ctx.table();
    let table = table.read();
    assert!(table.column("m1").is_none(), "time scans move nothing");
    assert_eq!(table.column("mon").unwrap(), vec![5.0; 4]);
    assert!((report.duration.as_secs_f64() - 2.0).abs() < 0.01);
}

#[tokio::test(start_paused = true)]
async fn timescan_skips_point_when_delay_crosses_duration() {
    let mut rig = rig_with(SimMotor::new(), timed_counter(vec![5.0]));
    let report = rig
        .ctx
        .timescan(0.5, 1.0, None, Some(Duration::from_millis(1200)))
        .await
        .unwrap();

    // The delay after the first point ends at 1.5 s, past the limit.
    assert_eq!(report.points, 1);
    assert_eq!(rig.mon.completed_counts(), 1);
}

#[tokio::test(start_paused = true)]
async fn timescan_stops_at_duration_with_delay() {
    let mut rig = rig_with(SimMotor::new(), timed_counter(vec![5.0]));
    let report = rig
        .ctx
        .timescan(0.5, 0.25, None, Some(Duration::from_secs(2)))
        .await
        .unwrap();

    // Points start at 0, 0.75 and 1.5 s; the next would start at 2.25 s.
    assert_eq!(report.points, 3);
    let timestamps = rig.ctx.table().read().timestamps().to_vec();
    for (got, want) in timestamps.iter().zip([0.5, 1.25, 2.0]) {
        assert!((got - want).abs() < 0.01, "timestamps {timestamps:?}");
    }
}

#[tokio::test]
async fn per_point_count_time_is_applied() {
    let mut rig = rig();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let record = seen.clone();
    rig.ctx.set_callback_fn(Phase::PreOperation, move |scope| {
        record.lock().push(scope.count_time());
        Ok(())
    });
    let plan = ScanPlan::scan(vec![ScanParam::linear("m1", 0.0, 2.0, 2).unwrap()])
        .with_count_time(vec![0.1, 0.2, 0.3]);
    rig.ctx.run(plan).await.unwrap();

    assert_eq!(*seen.lock(), vec![0.1, 0.2, 0.3]);
    assert_eq!(rig.mon.count_time(), 0.3);
}

#[tokio::test]
async fn monitor_counting_waits_on_monitor_and_stops_others() {
    let mon = Arc::new(SimCounter::builder().can_monitor(true).sequence(vec![1000.0]).build());
    let det = Arc::new(SimCounter::builder().sequence(vec![7.0, 8.0]).build());
    let mut registry = DeviceRegistry::new();
    registry.add_scannable("m1", Arc::new(SimMotor::new())).unwrap();
    registry
        .add_countable("mon", mon.clone(), CounterOptions::default().as_monitor())
        .unwrap();
    registry
        .add_countable("det", det.clone(), CounterOptions::default())
        .unwrap();
    let mut ctx = ScanContext::new(registry).with_settings(quiet_settings());

    let report = ctx.scan("m1", 0.0, 1.0, 1, -2.0).await.unwrap();
    assert_eq!(report.points, 2);
    assert_eq!(mon.preset(), Some(2.0));
    assert_eq!(det.count_time(), scan_core::limits::UNBOUNDED_COUNT_TIME);
    assert_eq!(det.completed_counts(), 2);
    assert_eq!(ctx.table().read().column("det").unwrap(), vec![7.0, 8.0]);
}

#[tokio::test]
async fn counter_options_scale_and_exclude() {
    let mut registry = DeviceRegistry::new();
    registry.add_scannable("m1", Arc::new(SimMotor::new())).unwrap();
    registry
        .add_countable(
            "det",
            Arc::new(SimCounter::builder().sequence(vec![50.0]).build()),
            CounterOptions::default().with_factor(10.0),
        )
        .unwrap();
    registry
        .add_countable(
            "off",
            Arc::new(SimCounter::new()),
            CounterOptions::default().disabled(),
        )
        .unwrap();
    let mut ctx = ScanContext::new(registry).with_settings(quiet_settings());

    ctx.scan("m1", 0.0, 1.0, 1, 0.1).await.unwrap();
    let table = ctx.table();
    let table = table.read();
    assert_eq!(table.column("det").unwrap(), vec![5.0, 5.0]);
    assert!(!table.has_field("off"));
}

#[tokio::test]
async fn dual_capability_axis_keeps_one_column() {
    let stage = Arc::new(SimMotor::new());
    let stage_counter = Arc::new(SimCounter::builder().sequence(vec![99.0]).build());
    let mut registry = DeviceRegistry::new();
    registry
        .register(DeviceHandle::scannable("tc", stage).with_countable(stage_counter.clone()))
        .unwrap();
    registry
        .add_countable(
            "det",
            Arc::new(SimCounter::builder().sequence(vec![1.0]).build()),
            CounterOptions::default(),
        )
        .unwrap();
    let mut ctx = ScanContext::new(registry).with_settings(quiet_settings());

    let report = ctx.scan("tc", 0.0, 2.0, 2, 0.0).await.unwrap();
    assert_eq!(report.points, 3);
    assert_eq!(report.y_field, "det");
    assert_eq!(stage_counter.completed_counts(), 0);
    let table = ctx.table();
    let table = table.read();
    assert_eq!(table.column("tc").unwrap(), vec![0.0, 1.0, 2.0]);
    assert_eq!(table.column("det").unwrap(), vec![1.0, 1.0, 1.0]);
}

#[tokio::test]
async fn monitor_cannot_be_a_scan_axis() {
    let mut registry = DeviceRegistry::new();
    registry
        .register(
            DeviceHandle::scannable("tc", Arc::new(SimMotor::new()))
                .with_countable(Arc::new(SimCounter::builder().can_monitor(true).build()))
                .with_counter_options(CounterOptions::default().as_monitor()),
        )
        .unwrap();
    let mut ctx = ScanContext::new(registry).with_settings(quiet_settings());

    let err = ctx.scan("tc", 0.0, 1.0, 1, 0.1).await.unwrap_err();
    assert!(err.is_configuration(), "{err}");
}

#[tokio::test]
async fn pseudo_counter_is_recorded_like_a_real_one() {
    let c1 = Arc::new(SimCounter::builder().sequence(vec![1.0, 2.0]).build());
    let c2 = Arc::new(SimCounter::builder().sequence(vec![3.0, 4.0]).build());
    let mut registry = DeviceRegistry::new();
    registry.add_scannable("m1", Arc::new(SimMotor::new())).unwrap();
    registry.add_countable("c1", c1, CounterOptions::default()).unwrap();
    registry.add_countable("c2", c2, CounterOptions::default()).unwrap();
    let sum = PseudoCounter::new(
        "g",
        &["c1", "c2"],
        Formula::expression("g", "c1 + c2").unwrap(),
        &registry,
    )
    .unwrap();
    registry
        .add_countable("g", Arc::new(sum), CounterOptions::default())
        .unwrap();
    let mut ctx = ScanContext::new(registry).with_settings(quiet_settings());

    ctx.scan("m1", 0.0, 1.0, 1, 1.0).await.unwrap();
    assert_eq!(ctx.table().read().column("g").unwrap(), vec![4.0, 6.0]);
}

#[tokio::test]
async fn fit_locates_gaussian_peak() {
    let m1 = Arc::new(SimMotor::new());
    let det = SimCounter::builder()
        .profile(m1.clone(), |x| 5.0 + 100.0 * (-(x - 3.3).powi(2) / 2.0).exp())
        .build();
    let mut registry = DeviceRegistry::new();
    registry.add_scannable("m1", m1).unwrap();
    registry
        .add_countable("det", Arc::new(det), CounterOptions::default())
        .unwrap();
    let mut settings = quiet_settings();
    settings.fit = true;
    let mut ctx = ScanContext::new(registry).with_settings(settings);

    let report = ctx.scan("m1", -5.0, 10.0, 30, 1.0).await.unwrap();
    let fit = report.fit.expect("fit ran");
    assert!((fit.peak_at - 3.3).abs() <= 0.5, "peak_at {}", fit.peak_at);
    assert!(fit.fit_error.is_none(), "{:?}", fit.fit_error);
    assert!((fit.fwhm_at - 3.3).abs() < 0.1, "fwhm_at {}", fit.fwhm_at);
    assert_eq!(ctx.table().read().fit(), Some(&fit));
}

#[tokio::test]
async fn configured_fields_fall_back_when_absent() {
    let mut rig = rig();
    rig.ctx.settings_mut().x_field = Some("nope".into());
    rig.ctx.settings_mut().y_field = Some("m1".into());
    let report = rig.ctx.scan("m1", 0.0, 1.0, 1, 0.1).await.unwrap();
    assert_eq!(report.x_field, "m1");
    assert_eq!(report.y_field, "m1");
}

#[tokio::test]
async fn user_fields_get_one_value_per_row() {
    let mut rig = rig();
    rig.ctx.add_user_field("temp").unwrap();
    rig.ctx.set_callback_fn(Phase::PostOperation, |scope| {
        let point = scope.point().unwrap_or_default();
        if point != 1 {
            assert!(scope.set_user_value("temp", point as f64 * 10.0));
        }
        assert!(!scope.set_user_value("pressure", 1.0));
        Ok(())
    });
    rig.ctx.scan("m1", 0.0, 2.0, 2, 0.1).await.unwrap();

    let table = rig.ctx.table();
    let table = table.read();
    let temp = table.column("temp").unwrap();
    assert_eq!(temp.len(), 3);
    assert_eq!(temp[0], 0.0);
    assert!(temp[1].is_nan());
    assert_eq!(temp[2], 20.0);
    assert!(!table.has_field("pressure"));
}

#[tokio::test]
async fn table_is_reset_by_the_next_scan() {
    let mut rig = rig();
    rig.ctx.scan("m1", 0.0, 10.0, 5, 0.1).await.unwrap();
    assert_eq!(rig.ctx.table().read().len(), 6);
    rig.ctx.scan("m1", 0.0, 1.0, 1, 0.1).await.unwrap();
    let table = rig.ctx.table();
    let table = table.read();
    assert_eq!(table.len(), 2);
    assert_eq!(table.column("m1").unwrap(), vec![0.0, 1.0]);
}
