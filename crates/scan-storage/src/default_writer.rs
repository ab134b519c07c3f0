//! Plain text scan files.
//!
//! ```text
//! #E 1760684400
//! #D Sat Oct 17 09:00:00 2026
//! #C rust_scan User = operator
//! #C0 alignment run
//! #S 6 scan m1 0 10 5 1
//! #D Sat Oct 17 09:00:00 2026
//! #N 2
//! #L m1  mon
//! 0 118
//! 2 131
//! ```
//!
//! Files are opened in append mode, so several scans can share one file
//! when unique naming is off.

use crate::error::StorageError;
use crate::writer::{RowSink, ScanHeader, ScanWriter};
use chrono::{DateTime, Local};
use scan_core::ScanTable;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const CTIME: &str = "%a %b %d %H:%M:%S %Y";

/// Writer for the `#E/#D/#C/#S/#N/#L` text format.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWriter;

impl DefaultWriter {
    /// New writer.
    pub fn new() -> Self {
        Self
    }

    /// Render the header block.
    pub fn header_text(header: &ScanHeader, now: DateTime<Local>) -> String {
        let mut out = String::new();
        out.push_str(&format!("#E {}\n", now.timestamp()));
        out.push_str(&format!("#D {}\n", now.format(CTIME)));
        out.push_str(&format!("#C rust_scan User = {}\n", header.user));
        for (i, comment) in header.comments.iter().enumerate() {
            out.push_str(&format!("#C{i} {comment}\n"));
        }
        out.push_str(&format!("#S {} {}\n", header.point_count, header.command));
        out.push_str(&format!("#D {}\n", header.start.format(CTIME)));
        out.push_str(&format!("#N {}\n", header.columns.len()));
        out.push_str(&format!("#L {}\n", header.columns.join("  ")));
        out
    }

    /// Render one data row.
    pub fn row_text(row: &[f64]) -> String {
        let mut line = row
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        line.push('\n');
        line
    }

    fn open(target: &Path) -> Result<BufWriter<File>, StorageError> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(target)
            .map_err(|e| StorageError::io(target, e))?;
        Ok(BufWriter::new(file))
    }
}

impl ScanWriter for DefaultWriter {
    fn write(
        &self,
        table: &ScanTable,
        target: &Path,
        header: &ScanHeader,
    ) -> Result<PathBuf, StorageError> {
        for name in &header.columns {
            if !table.has_field(name) {
                return Err(StorageError::MissingColumn(name.clone()));
            }
        }
        let columns: Vec<&[f64]> = header
            .columns
            .iter()
            .map(|name| table.values(name).unwrap_or(&[]))
            .collect();

        let mut out = Self::open(target)?;
        let io = |e| StorageError::io(target, e);
        out.write_all(Self::header_text(header, Local::now()).as_bytes())
            .map_err(io)?;
        let mut row = Vec::with_capacity(columns.len());
        for i in 0..table.len() {
            row.clear();
            row.extend(columns.iter().map(|c| c.get(i).copied().unwrap_or(f64::NAN)));
            out.write_all(Self::row_text(&row).as_bytes()).map_err(io)?;
        }
        out.flush().map_err(io)?;
        tracing::debug!(path = %target.display(), rows = table.len(), "Scan file written");
        Ok(target.to_path_buf())
    }

    fn open_partial(
        &self,
        target: &Path,
        header: &ScanHeader,
    ) -> Result<Box<dyn RowSink>, StorageError> {
        let mut out = Self::open(target)?;
        out.write_all(Self::header_text(header, Local::now()).as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| StorageError::io(target, e))?;
        Ok(Box::new(PartialFile {
            out,
            path: target.to_path_buf(),
            width: header.columns.len(),
            rows: 0,
        }))
    }
}

/// Row-at-a-time writer; every row is flushed as soon as it is appended.
struct PartialFile {
    out: BufWriter<File>,
    path: PathBuf,
    width: usize,
    rows: usize,
}

impl RowSink for PartialFile {
    fn append(&mut self, row: &[f64]) -> Result<(), StorageError> {
        if row.len() != self.width {
            return Err(StorageError::RowWidth {
                expected: self.width,
                got: row.len(),
            });
        }
        self.out
            .write_all(DefaultWriter::row_text(row).as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| StorageError::io(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, StorageError> {
        let PartialFile {
            mut out, path, rows, ..
        } = *self;
        out.flush().map_err(|e| StorageError::io(&path, e))?;
        tracing::debug!(path = %path.display(), rows, "Partial scan file closed");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn header() -> ScanHeader {
        ScanHeader {
            command: "scan m1 0 10 5 1".into(),
            user: "tester".into(),
            comments: vec!["first".into(), "second".into()],
            start: Local.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap(),
            point_count: 6,
            columns: vec!["m1".into(), "mon".into()],
        }
    }

    #[test]
    fn header_lines_in_order() {
        let now = Local.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap();
        let text = DefaultWriter::header_text(&header(), now);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], format!("#E {}", now.timestamp()));
        assert_eq!(lines[1], "#D Sat Oct 17 09:30:00 2026");
        assert_eq!(lines[2], "#C rust_scan User = tester");
        assert_eq!(lines[3], "#C0 first");
        assert_eq!(lines[4], "#C1 second");
        assert_eq!(lines[5], "#S 6 scan m1 0 10 5 1");
        assert_eq!(lines[6], "#D Sat Oct 17 09:00:00 2026");
        assert_eq!(lines[7], "#N 2");
        assert_eq!(lines[8], "#L m1  mon");
        assert_eq!(lines.len(), 9);
    }

    #[test]
    fn row_uses_shortest_representation() {
        assert_eq!(DefaultWriter::row_text(&[2.0, 0.5, f64::NAN]), "2 0.5 NaN\n");
    }

    #[test]
    fn partial_rejects_wrong_width() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DefaultWriter
            .open_partial(&dir.path().join("p.txt"), &header())
            .unwrap();
        assert!(matches!(
            sink.append(&[1.0]),
            Err(StorageError::RowWidth { expected: 2, got: 1 })
        ));
        sink.append(&[1.0, 2.0]).unwrap();
        let path = sink.finish().unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.ends_with("#L m1  mon\n1 2\n"));
    }
}
