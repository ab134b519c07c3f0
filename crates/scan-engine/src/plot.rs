//! Plotter contract.
//!
//! Rendering is left to the caller; the engine only hands over the table and
//! the fields to draw. A failing plotter is logged and never aborts a scan.

use scan_core::ScanTable;

/// Renders X/Y columns of a scan table.
pub trait Plotter: Send + Sync {
    /// Draw `y` against `x` on `axis` (1-based).
    fn plot(&self, table: &ScanTable, x: &str, y: &str, axis: usize) -> anyhow::Result<()>;
}
