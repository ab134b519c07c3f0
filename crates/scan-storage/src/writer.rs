//! Writer contract.

use crate::error::StorageError;
use chrono::{DateTime, Local};
use scan_core::ScanTable;
use std::path::{Path, PathBuf};

/// Everything a writer needs besides the rows themselves.
#[derive(Debug, Clone)]
pub struct ScanHeader {
    /// Invocation text, e.g. `scan m1 0 10 5 1`.
    pub command: String,
    /// Operator name.
    pub user: String,
    /// Free-text comment lines.
    pub comments: Vec<String>,
    /// Scan start.
    pub start: DateTime<Local>,
    /// Number of points the scan was planned with (0 when unbounded).
    pub point_count: usize,
    /// Column names in file order.
    pub columns: Vec<String>,
}

impl ScanHeader {
    /// Header for a table, taking the column order from its layout.
    pub fn for_table(table: &ScanTable, command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            user: current_user(),
            comments: Vec::new(),
            start: table.scan_start().unwrap_or_else(Local::now),
            point_count: table.len(),
            columns: table.layout().columns().map(str::to_string).collect(),
        }
    }

    /// Split `comment` into lines and append them.
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comments.extend(
            comment
                .lines()
                .map(str::trim_end)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
        self
    }

    /// Override the point count.
    pub fn with_point_count(mut self, point_count: usize) -> Self {
        self.point_count = point_count;
        self
    }
}

/// Login name from the environment, `unknown` when none is set.
pub fn current_user() -> String {
    ["USER", "LOGNAME", "USERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Destination for rows written one at a time.
pub trait RowSink: Send {
    /// Append one row in header column order.
    fn append(&mut self, row: &[f64]) -> Result<(), StorageError>;

    /// File being written.
    fn path(&self) -> &Path;

    /// Flush and close, returning the final path.
    fn finish(self: Box<Self>) -> Result<PathBuf, StorageError>;
}

/// Serializes scan tables.
///
/// Implementations must accept any table shape: zero rows, no counters, or
/// any subset of the optional fields.
pub trait ScanWriter: Send + Sync {
    /// Write the whole table to `target`, returning the path actually used.
    fn write(
        &self,
        table: &ScanTable,
        target: &Path,
        header: &ScanHeader,
    ) -> Result<PathBuf, StorageError>;

    /// Write the header now and return a sink for rows as they arrive.
    fn open_partial(
        &self,
        target: &Path,
        header: &ScanHeader,
    ) -> Result<Box<dyn RowSink>, StorageError>;
}
