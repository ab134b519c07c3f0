//! File output, console output and plotter calls.

mod common;

use common::rig;
use parking_lot::Mutex;
use scan_core::ScanTable;
use scan_engine::{Phase, Plotter};
use std::sync::Arc;

fn data_lines(text: &str) -> Vec<&str> {
    text.lines().filter(|l| !l.starts_with('#')).collect()
}

#[tokio::test]
async fn file_is_written_at_post_scan_with_unique_names() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = rig();
    rig.ctx.settings_mut().output = Some(dir.path().join("align.dat"));
    rig.ctx.settings_mut().comment = "beam check".into();

    let first = rig.ctx.scan("m1", 0.0, 10.0, 5, 1.0).await.unwrap();
    let path = first.output.expect("file written");
    assert_eq!(path, dir.path().join("align_0001.dat"));

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("#E "), "{text}");
    assert!(text.contains("#C0 beam check\n"));
    assert!(text.contains("#S 6 scan m1 0 10 5 1\n"), "{text}");
    assert!(text.contains("#N 2\n#L m1  mon\n"));
    assert_eq!(
        data_lines(&text),
        vec!["0 10", "2 20", "4 30", "6 10", "8 20", "10 30"]
    );

    let second = rig.ctx.scan("m1", 0.0, 1.0, 1, 1.0).await.unwrap();
    assert_eq!(second.output, Some(dir.path().join("align_0002.dat")));
}

#[tokio::test]
async fn without_unique_names_scans_append_to_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("log.dat");
    let mut rig = rig();
    rig.ctx.settings_mut().output = Some(target.clone());
    rig.ctx.settings_mut().unique_file_names = false;

    rig.ctx.scan("m1", 0.0, 1.0, 1, 1.0).await.unwrap();
    rig.ctx.scan("m1", 0.0, 2.0, 2, 1.0).await.unwrap();

    let text = std::fs::read_to_string(&target).unwrap();
    assert_eq!(text.matches("#S ").count(), 2);
    assert_eq!(data_lines(&text).len(), 2 + 3);
}

#[tokio::test]
async fn partial_write_flushes_each_row() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("live.dat");
    let mut rig = rig();
    rig.ctx.settings_mut().output = Some(target.clone());
    rig.ctx.settings_mut().unique_file_names = false;
    rig.ctx.settings_mut().partial_write = true;

    let observed = Arc::new(Mutex::new(Vec::new()));
    let record = observed.clone();
    let path = target.clone();
    rig.ctx.set_callback_fn(Phase::PostPoint, move |_| {
        let text = std::fs::read_to_string(&path)?;
        record.lock().push(data_lines(&text).len());
        Ok(())
    });

    let report = rig.ctx.scan("m1", 0.0, 2.0, 2, 1.0).await.unwrap();
    assert_eq!(*observed.lock(), vec![1, 2, 3]);
    assert_eq!(report.output, Some(target.clone()));

    let text = std::fs::read_to_string(&target).unwrap();
    assert_eq!(text.matches("#S 3 scan m1 0 2 2 1").count(), 1);
    assert_eq!(data_lines(&text), vec!["0 10", "1 20", "2 30"]);
}

#[tokio::test]
async fn partial_file_keeps_rows_of_a_failed_scan() {
    use scan_driver_mock::{ErrorConfig, ErrorScenario, SimCounter, SimMotor};

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("fail.dat");
    let motor = SimMotor::builder()
        .error_config(ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "move",
            count: 2,
        }))
        .build();
    let mut rig = common::rig_with(motor, SimCounter::builder().sequence(vec![1.0]).build());
    rig.ctx.settings_mut().output = Some(target.clone());
    rig.ctx.settings_mut().unique_file_names = false;
    rig.ctx.settings_mut().partial_write = true;

    assert!(rig.ctx.scan("m1", 0.0, 4.0, 4, 1.0).await.is_err());
    let text = std::fs::read_to_string(&target).unwrap();
    assert_eq!(data_lines(&text), vec!["0 1", "1 1"]);
}

#[derive(Default)]
struct RecordingPlotter {
    calls: Mutex<Vec<(String, String, usize, usize)>>,
}

impl Plotter for RecordingPlotter {
    fn plot(&self, table: &ScanTable, x: &str, y: &str, axis: usize) -> anyhow::Result<()> {
        self.calls
            .lock()
            .push((x.to_string(), y.to_string(), axis, table.len()));
        Ok(())
    }
}

#[tokio::test]
async fn plotter_sees_every_row_and_the_final_table() {
    let plotter = Arc::new(RecordingPlotter::default());
    let mut rig = rig();
    rig.ctx.settings_mut().plot = true;
    rig.ctx.set_plotter(Some(plotter.clone()), 2);

    rig.ctx.scan("m1", 0.0, 2.0, 2, 1.0).await.unwrap();
    let calls = plotter.calls.lock().clone();
    let rows: Vec<usize> = calls.iter().map(|c| c.3).collect();
    assert_eq!(rows, vec![1, 2, 3, 3]);
    assert!(calls.iter().all(|c| c.0 == "m1" && c.1 == "mon" && c.2 == 2));

    rig.ctx.settings_mut().plot = false;
    rig.ctx.scan("m1", 0.0, 2.0, 2, 1.0).await.unwrap();
    assert_eq!(plotter.calls.lock().len(), 4);
}

#[tokio::test]
async fn console_shows_header_rows_and_summary() {
    let mut rig = rig();
    rig.ctx.settings_mut().print = true;
    rig.ctx.scan("m1", 0.0, 1.0, 1, 1.0).await.unwrap();

    let out = rig.ctx.console().contents().unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines[0].trim_start().starts_with("points"), "{out}");
    assert_eq!(
        lines[1].split_whitespace().collect::<Vec<_>>(),
        vec!["0", "0.0000", "10.0000"]
    );
    assert_eq!(
        lines[2].split_whitespace().collect::<Vec<_>>(),
        vec!["1", "1.0000", "20.0000"]
    );
    assert!(lines.last().unwrap().starts_with("Scan duration:"), "{out}");
}
