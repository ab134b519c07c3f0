//! Console output: header, live rows and the end-of-scan summary.

use parking_lot::Mutex;
use scan_core::{FitOutcome, ScanTable, POINTS_FIELD};
use std::sync::Arc;
use std::time::Duration;

/// Minimum column width of printed rows.
const COLUMN_WIDTH: usize = 12;

/// Where console output goes.
#[derive(Debug, Clone, Default)]
pub enum Console {
    /// Standard output.
    #[default]
    Stdout,
    /// In-memory buffer, readable with [`Console::contents`].
    Buffer(Arc<Mutex<String>>),
    /// Discard.
    Silent,
}

impl Console {
    /// New in-memory console.
    pub fn buffer() -> Self {
        Console::Buffer(Arc::new(Mutex::new(String::new())))
    }

    /// Write one line.
    pub fn line(&self, text: &str) {
        match self {
            Console::Stdout => println!("{text}"),
            Console::Buffer(buf) => {
                let mut buf = buf.lock();
                buf.push_str(text);
                buf.push('\n');
            }
            Console::Silent => {}
        }
    }

    /// Everything written so far, for buffered consoles.
    pub fn contents(&self) -> Option<String> {
        match self {
            Console::Buffer(buf) => Some(buf.lock().clone()),
            _ => None,
        }
    }
}

/// Fixed notation, switching to scientific below `10^-precision`.
pub fn fmt_value(value: f64, precision: i32) -> String {
    let digits = precision.max(0) as usize;
    if value != 0.0 && value.is_finite() && value.abs().log10() < -f64::from(precision) {
        format!("{value:.digits$e}")
    } else {
        format!("{value:.digits$}")
    }
}

fn widths(table: &ScanTable) -> Vec<usize> {
    std::iter::once(POINTS_FIELD)
        .chain(table.layout().columns())
        .map(|name| name.len().max(COLUMN_WIDTH))
        .collect()
}

/// Column header: `points` followed by every data column.
pub fn header_line(table: &ScanTable) -> String {
    std::iter::once(POINTS_FIELD)
        .chain(table.layout().columns())
        .zip(widths(table))
        .map(|(name, w)| format!("{name:>w$}"))
        .collect::<Vec<_>>()
        .join("  ")
}

/// Row `index`, aligned under [`header_line`].
pub fn row_line(table: &ScanTable, index: usize, precision: i32) -> Option<String> {
    let point = *table.points().get(index)?;
    let values = table.row(index)?;
    let widths = widths(table);
    let cells = std::iter::once(point.to_string())
        .chain(values.iter().map(|v| fmt_value(*v, precision)))
        .zip(widths)
        .map(|(cell, w)| format!("{cell:>w$}"))
        .collect::<Vec<_>>();
    Some(cells.join("  "))
}

/// End-of-scan summary lines.
pub fn summary_lines(fit: Option<&FitOutcome>, duration: Option<Duration>) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(fit) = fit {
        lines.push(format!("Peak = {} at {}", fit.peak, fit.peak_at));
        lines.push(format!("Min = {} at {}", fit.min, fit.min_at));
        lines.push(format!("Fwhm = {} at {}", fit.fwhm, fit.fwhm_at));
        lines.push(format!("COM = {}", fit.com));
    }
    if let Some(duration) = duration {
        lines.push(format!("Scan duration: {:.3} s", duration.as_secs_f64()));
    }
    lines
}
