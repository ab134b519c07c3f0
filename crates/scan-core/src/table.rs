//! Scan result table.
//!
//! Column-oriented record of one scan: the `points` index, one column per
//! participating device and counter, explicitly registered user columns,
//! timestamps, start/end/duration and the optional fit results.
//!
//! Rows are committed whole through [`ScanTable::commit_row`]: every
//! mandatory column always has the same length. Readers that hold a
//! [`SharedTable`] while a scan is running see rows `0..i` complete, never a
//! torn row, because a commit takes the write lock once for the whole row.

use crate::error::{ScanError, ScanResult};
use crate::fit::FitOutcome;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Name of the point index column.
pub const POINTS_FIELD: &str = "points";

/// Names that cannot be used for device, counter or user columns.
pub const RESERVED_FIELDS: &[&str] = &[
    POINTS_FIELD,
    "scan_start",
    "scan_end",
    "scan_duration",
    "timestamps",
];

/// Table shared between the engine and concurrent readers.
pub type SharedTable = Arc<RwLock<ScanTable>>;

/// Column layout of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableLayout {
    /// Scannable participants, in trajectory order.
    pub devices: Vec<String>,
    /// Counting participants, in registration order.
    pub counters: Vec<String>,
    /// Registered user fields.
    pub user: Vec<String>,
}

impl TableLayout {
    /// Every data column in file order: devices, counters, user fields.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.devices
            .iter()
            .chain(&self.counters)
            .chain(&self.user)
            .map(String::as_str)
    }

    fn validate(&self) -> ScanResult<()> {
        let mut seen: Vec<&str> = Vec::new();
        for name in self.columns() {
            if RESERVED_FIELDS.contains(&name) {
                return Err(ScanError::Configuration(format!(
                    "'{name}' is a reserved field name"
                )));
            }
            if seen.contains(&name) {
                return Err(ScanError::DuplicateMnemonic(name.to_string()));
            }
            seen.push(name);
        }
        Ok(())
    }
}

/// One complete row, staged before commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Point index.
    pub index: usize,
    /// Seconds since scan start.
    pub elapsed: f64,
    /// Device readbacks, in layout order.
    pub devices: Vec<f64>,
    /// Counter values, in layout order.
    pub counters: Vec<f64>,
    /// User values, in layout order.
    pub user: Vec<f64>,
}

/// Result table of one scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanTable {
    layout: TableLayout,
    points: Vec<usize>,
    timestamps: Vec<f64>,
    columns: HashMap<String, Vec<f64>>,
    scan_start: Option<DateTime<Local>>,
    scan_end: Option<DateTime<Local>>,
    scan_duration: Option<Duration>,
    fit: Option<FitOutcome>,
    error: Option<String>,
}

impl ScanTable {
    /// Empty table with the given layout.
    pub fn new(layout: TableLayout) -> ScanResult<Self> {
        layout.validate()?;
        let columns = layout
            .columns()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        Ok(Self {
            layout,
            columns,
            ..Default::default()
        })
    }

    /// Column layout.
    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Number of committed rows.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no row has been committed.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a complete row.
    ///
    /// The row is checked against the layout before anything is appended,
    /// so a rejected row leaves the table untouched.
    pub fn commit_row(&mut self, row: Row) -> ScanResult<()> {
        let expected = [
            (self.layout.devices.len(), row.devices.len(), "device"),
            (self.layout.counters.len(), row.counters.len(), "counter"),
            (self.layout.user.len(), row.user.len(), "user"),
        ];
        for (want, got, kind) in expected {
            if want != got {
                return Err(ScanError::Configuration(format!(
                    "row {} has {got} {kind} values, table expects {want}",
                    row.index
                )));
            }
        }

        let names = self
            .layout
            .devices
            .iter()
            .chain(&self.layout.counters)
            .chain(&self.layout.user);
        let values = row
            .devices
            .into_iter()
            .chain(row.counters)
            .chain(row.user);
        for (name, value) in names.zip(values) {
            self.columns.entry(name.clone()).or_default().push(value);
        }
        self.points.push(row.index);
        self.timestamps.push(row.elapsed);
        Ok(())
    }

    /// Point indices.
    pub fn points(&self) -> &[usize] {
        &self.points
    }

    /// Seconds since scan start at which each row was committed.
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Values of a data column, or of `points`.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        if name == POINTS_FIELD {
            return Some(self.points.iter().map(|&p| p as f64).collect());
        }
        self.columns.get(name).cloned()
    }

    /// Borrow a data column.
    pub fn values(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Whether `name` is `points` or a data column.
    pub fn has_field(&self, name: &str) -> bool {
        name == POINTS_FIELD || self.columns.contains_key(name)
    }

    /// Row `index` in file column order.
    pub fn row(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.len() {
            return None;
        }
        self.layout
            .columns()
            .map(|name| self.columns.get(name).and_then(|c| c.get(index)).copied())
            .collect()
    }

    /// Record the scan start and clear any previous run's data.
    pub fn mark_start(&mut self, at: DateTime<Local>) {
        self.points.clear();
        self.timestamps.clear();
        for column in self.columns.values_mut() {
            column.clear();
        }
        self.scan_start = Some(at);
        self.scan_end = None;
        self.scan_duration = None;
        self.fit = None;
        self.error = None;
    }

    /// Record the scan end.
    pub fn mark_end(&mut self, at: DateTime<Local>, duration: Duration) {
        self.scan_end = Some(at);
        self.scan_duration = Some(duration);
    }

    /// Scan start time.
    pub fn scan_start(&self) -> Option<DateTime<Local>> {
        self.scan_start
    }

    /// Scan end time.
    pub fn scan_end(&self) -> Option<DateTime<Local>> {
        self.scan_end
    }

    /// Wall-clock duration of the scan.
    pub fn scan_duration(&self) -> Option<Duration> {
        self.scan_duration
    }

    /// Fit results, when the post-processor ran.
    pub fn fit(&self) -> Option<&FitOutcome> {
        self.fit.as_ref()
    }

    /// Store fit results.
    pub fn set_fit(&mut self, outcome: FitOutcome) {
        self.fit = Some(outcome);
    }

    /// Error that ended the scan early, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Record the error that ended the scan.
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TableLayout {
        TableLayout {
            devices: vec!["m1".into()],
            counters: vec!["mon".into(), "det".into()],
            user: vec!["temp".into()],
        }
    }

    fn row(index: usize) -> Row {
        Row {
            index,
            elapsed: index as f64 * 0.5,
            devices: vec![index as f64],
            counters: vec![10.0, 20.0],
            user: vec![f64::NAN],
        }
    }

    #[test]
    fn commit_keeps_columns_aligned() {
        let mut table = ScanTable::new(layout()).unwrap();
        table.mark_start(Local::now());
        for i in 0..3 {
            table.commit_row(row(i)).unwrap();
        }
        assert_eq!(table.len(), 3);
        assert_eq!(table.points(), &[0, 1, 2]);
        assert_eq!(table.column("points").unwrap(), vec![0.0, 1.0, 2.0]);
        assert_eq!(table.values("m1").unwrap(), &[0.0, 1.0, 2.0]);
        assert_eq!(table.values("det").unwrap().len(), 3);
        assert_eq!(table.timestamps(), &[0.0, 0.5, 1.0]);
        assert_eq!(table.row(1).unwrap()[..3], [1.0, 10.0, 20.0]);
        assert!(table.row(3).is_none());
    }

    #[test]
    fn malformed_row_is_rejected_without_side_effects() {
        let mut table = ScanTable::new(layout()).unwrap();
        table.commit_row(row(0)).unwrap();
        let mut bad = row(1);
        bad.counters.pop();
        assert!(table.commit_row(bad).is_err());
        assert_eq!(table.len(), 1);
        for name in table.layout().columns() {
            assert_eq!(table.values(name).unwrap().len(), 1, "{name}");
        }
    }

    #[test]
    fn duplicate_and_reserved_names_are_rejected() {
        let dup = TableLayout {
            devices: vec!["m1".into()],
            counters: vec!["m1".into()],
            user: vec![],
        };
        assert!(matches!(
            ScanTable::new(dup),
            Err(ScanError::DuplicateMnemonic(ref m)) if m == "m1"
        ));
        let reserved = TableLayout {
            devices: vec![],
            counters: vec![],
            user: vec!["points".into()],
        };
        assert!(ScanTable::new(reserved).is_err());
    }

    #[test]
    fn mark_start_resets_previous_run() {
        let mut table = ScanTable::new(layout()).unwrap();
        table.commit_row(row(0)).unwrap();
        table.set_error("boom");
        table.mark_start(Local::now());
        assert!(table.is_empty());
        assert!(table.error().is_none());
        assert!(table.scan_end().is_none());
        assert!(table.values("mon").unwrap().is_empty());
    }
}
