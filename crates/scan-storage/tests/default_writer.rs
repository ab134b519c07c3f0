//! End-to-end tests for the text writer.

use chrono::Local;
use scan_core::{Row, ScanTable, TableLayout};
use scan_storage::{unique_file_name, DefaultWriter, ScanHeader, ScanWriter};

fn table(rows: usize) -> ScanTable {
    let mut table = ScanTable::new(TableLayout {
        devices: vec!["m1".into()],
        counters: vec!["mon".into(), "det".into()],
        user: vec!["temp".into()],
    })
    .unwrap();
    table.mark_start(Local::now());
    for i in 0..rows {
        table
            .commit_row(Row {
                index: i,
                elapsed: i as f64,
                devices: vec![2.0 * i as f64],
                counters: vec![100.0 + i as f64, 0.25],
                user: vec![f64::NAN],
            })
            .unwrap();
    }
    table
}

fn data_lines(text: &str) -> Vec<&str> {
    text.lines().filter(|l| !l.starts_with('#')).collect()
}

#[test]
fn full_write_matches_table() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out").join("scan.txt");
    let table = table(3);
    let header = ScanHeader::for_table(&table, "scan m1 0 4 2 1").with_comment("aligned\n\nby hand");

    let path = DefaultWriter.write(&table, &target, &header).unwrap();
    assert_eq!(path, target);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("#S 3 scan m1 0 4 2 1\n"));
    assert!(text.contains("#C0 aligned\n#C1 by hand\n"));
    assert!(text.contains("#N 4\n#L m1  mon  det  temp\n"));
    assert_eq!(
        data_lines(&text),
        vec!["0 100 0.25 NaN", "2 101 0.25 NaN", "4 102 0.25 NaN"]
    );
}

#[test]
fn empty_table_writes_header_only() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("empty.txt");
    let table = table(0);
    let header = ScanHeader::for_table(&table, "timescan");
    DefaultWriter.write(&table, &target, &header).unwrap();

    let text = std::fs::read_to_string(&target).unwrap();
    assert!(text.contains("#S 0 timescan\n"));
    assert!(data_lines(&text).is_empty());
}

#[test]
fn unknown_column_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let table = table(1);
    let mut header = ScanHeader::for_table(&table, "scan");
    header.columns.push("ghost".into());
    let err = DefaultWriter
        .write(&table, &dir.path().join("x.txt"), &header)
        .unwrap_err();
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn partial_write_streams_rows_and_appends() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("live.txt");
    let table = table(2);
    let header = ScanHeader::for_table(&table, "scan m1 0 2 1 1").with_point_count(2);

    let mut sink = DefaultWriter.open_partial(&target, &header).unwrap();
    let text = std::fs::read_to_string(&target).unwrap();
    assert!(text.ends_with("#L m1  mon  det  temp\n"));
    for i in 0..table.len() {
        sink.append(&table.row(i).unwrap()).unwrap();
        let text = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(data_lines(&text).len(), i + 1);
    }
    sink.finish().unwrap();

    // A second scan into the same file appends a new block.
    DefaultWriter.write(&table, &target, &header).unwrap();
    let text = std::fs::read_to_string(&target).unwrap();
    assert_eq!(text.matches("#S 2 ").count(), 2);
    assert_eq!(data_lines(&text).len(), 4);
}

#[test]
fn unique_names_do_not_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let table = table(1);
    let header = ScanHeader::for_table(&table, "scan");
    let requested = dir.path().join("run.dat");

    let first = DefaultWriter
        .write(&table, &unique_file_name(&requested), &header)
        .unwrap();
    let second = DefaultWriter
        .write(&table, &unique_file_name(&requested), &header)
        .unwrap();
    assert_eq!(first, dir.path().join("run_0001.dat"));
    assert_eq!(second, dir.path().join("run_0002.dat"));
}
