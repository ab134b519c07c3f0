//! The seven callback slots and their defaults.
//!
//! Every slot always holds a hook. `PrePoint`, `PreOperation`,
//! `PostOperation` and `PostPoint` default to a no-op; `PreScan` prints the
//! column header, `Operation` runs the counters and `PostScan` writes, plots
//! and prints the summary. Clearing a slot puts its default back.
//!
//! ```rust,ignore
//! ctx.set_callback_fn(Phase::PostOperation, |scope| {
//!     scope.set_user_value("temperature", read_temperature());
//!     Ok(())
//! });
//! ```

use crate::console::{header_line, summary_lines};
use crate::control::ScanControl;
use crate::engine::{guarded, CounterSlot, RunState};
use crate::settings::ScanSettings;
use crate::trajectory::ScanMode;
use async_trait::async_trait;
use scan_core::limits::UNBOUNDED_COUNT_TIME;
use scan_core::{Countable, Scannable, SharedTable};
use scan_storage::ScanHeader;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Callback slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Once, after the table is reset.
    PreScan,
    /// Before the moves of each point.
    PrePoint,
    /// After every device settled.
    PreOperation,
    /// Acquisition.
    Operation,
    /// After acquisition, before the row is read.
    PostOperation,
    /// After the row is committed.
    PostPoint,
    /// Once, after `scan_end` is recorded.
    PostScan,
}

impl Phase {
    /// Slots in execution order.
    pub const ALL: [Phase; 7] = [
        Phase::PreScan,
        Phase::PrePoint,
        Phase::PreOperation,
        Phase::Operation,
        Phase::PostOperation,
        Phase::PostPoint,
        Phase::PostScan,
    ];

    /// Slot name.
    pub fn name(self) -> &'static str {
        match self {
            Phase::PreScan => "PreScan",
            Phase::PrePoint => "PrePoint",
            Phase::PreOperation => "PreOperation",
            Phase::Operation => "Operation",
            Phase::PostOperation => "PostOperation",
            Phase::PostPoint => "PostPoint",
            Phase::PostScan => "PostScan",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a callback sees of the running scan.
pub struct HookScope<'a> {
    run: &'a RunState,
    phase: Phase,
    point: Option<usize>,
    targets: &'a [f64],
    staged: &'a mut HashMap<String, f64>,
}

impl<'a> HookScope<'a> {
    pub(crate) fn new(
        run: &'a RunState,
        phase: Phase,
        point: Option<usize>,
        targets: &'a [f64],
        staged: &'a mut HashMap<String, f64>,
    ) -> Self {
        Self {
            run,
            phase,
            point,
            targets,
            staged,
        }
    }

    /// Slot being run.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Point index; `None` in PreScan and PostScan.
    pub fn point(&self) -> Option<usize> {
        self.point
    }

    /// Targets of the current point, one per scannable. Empty in time scans.
    pub fn targets(&self) -> &[f64] {
        self.targets
    }

    /// Time since the scan started.
    pub fn elapsed(&self) -> Duration {
        self.run.started.elapsed()
    }

    /// Unique id of this run.
    pub fn scan_uid(&self) -> &str {
        &self.run.uid
    }

    /// Scan flavor.
    pub fn mode(&self) -> ScanMode {
        self.run.mode
    }

    /// Invocation text.
    pub fn command(&self) -> &str {
        &self.run.command
    }

    /// Settings snapshot taken at Initializing.
    pub fn settings(&self) -> &ScanSettings {
        &self.run.settings
    }

    /// Planned point count; `None` for an unbounded time scan.
    pub fn planned_points(&self) -> Option<usize> {
        self.run.planned_points
    }

    /// Result table of this run.
    pub fn table(&self) -> SharedTable {
        self.run.table.clone()
    }

    /// Field used as X.
    pub fn x_field(&self) -> &str {
        &self.run.x_field
    }

    /// Field used as Y.
    pub fn y_field(&self) -> &str {
        &self.run.y_field
    }

    /// Scannable participants in trajectory order.
    pub fn scannables(&self) -> impl Iterator<Item = (&str, &Arc<dyn Scannable>)> {
        self.run
            .scannables
            .iter()
            .map(|(mnemonic, device)| (mnemonic.as_str(), device))
    }

    /// Counting participants in table order.
    pub fn counters(&self) -> impl Iterator<Item = (&str, &Arc<dyn Countable>)> {
        self.run
            .counters
            .iter()
            .map(|slot| (slot.mnemonic.as_str(), &slot.device))
    }

    /// The monitor counter, if one is configured.
    pub fn monitor(&self) -> Option<(&str, &Arc<dyn Countable>)> {
        self.run
            .monitor
            .and_then(|i| self.run.counters.get(i))
            .map(|slot| (slot.mnemonic.as_str(), &slot.device))
    }

    /// Count time of the current point (of point 0 outside the loop).
    ///
    /// Negative values select monitor counting for `|t|`.
    pub fn count_time(&self) -> f64 {
        self.run
            .count_time
            .at(self.point.unwrap_or(0))
            .unwrap_or_default()
    }

    /// Stage a value for a registered user field of the current row.
    ///
    /// Returns `false`, and drops the value, when `name` is not registered.
    pub fn set_user_value(&mut self, name: &str, value: f64) -> bool {
        if !self.run.user_fields.iter().any(|f| f == name) {
            debug!(field = name, "Dropping value for unregistered user field");
            return false;
        }
        self.staged.insert(name.to_string(), value);
        true
    }

    /// Print a line if console output is enabled.
    pub fn println(&self, line: &str) {
        if self.run.settings.print {
            self.run.console.line(line);
        }
    }

    /// Abort/pause handle.
    pub fn control(&self) -> &ScanControl {
        &self.run.control
    }

    fn count_deadline(&self, seconds: f64) -> Duration {
        let window = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX);
        self.run.settings.count_timeout().saturating_add(window)
    }
}

/// One callback.
#[async_trait]
pub trait ScanHook: Send + Sync {
    /// Run the callback. Errors abort the scan and reach the caller.
    async fn run(&self, scope: &mut HookScope<'_>) -> anyhow::Result<()>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "user"
    }
}

/// Adapter for synchronous closures.
pub struct FnHook<F>(F);

#[async_trait]
impl<F> ScanHook for FnHook<F>
where
    F: Fn(&mut HookScope<'_>) -> anyhow::Result<()> + Send + Sync,
{
    async fn run(&self, scope: &mut HookScope<'_>) -> anyhow::Result<()> {
        (self.0)(scope)
    }
}

/// Wrap a closure as a hook.
pub fn hook_fn<F>(f: F) -> Arc<dyn ScanHook>
where
    F: Fn(&mut HookScope<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHook(f))
}

/// Does nothing.
#[derive(Debug, Default)]
pub struct NoopHook;

#[async_trait]
impl ScanHook for NoopHook {
    async fn run(&self, _scope: &mut HookScope<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Prints the column header.
#[derive(Debug, Default)]
pub struct DefaultPreScan;

#[async_trait]
impl ScanHook for DefaultPreScan {
    async fn run(&self, scope: &mut HookScope<'_>) -> anyhow::Result<()> {
        let header = header_line(&scope.run.table.read());
        scope.println(&header);
        Ok(())
    }

    fn name(&self) -> &str {
        "default_pre_scan"
    }
}

/// Applies the count time, starts every counter and waits for them.
///
/// With a negative count time the monitor counts to the preset `|t|`; the
/// other counters run unbounded and are stopped once the monitor finishes.
/// Counters that cannot be stopped count `|t|` seconds instead.
#[derive(Debug, Default)]
pub struct DefaultOperation;

impl DefaultOperation {
    async fn timed(scope: &HookScope<'_>, seconds: f64) -> anyhow::Result<()> {
        let deadline = scope.count_deadline(seconds);
        let counters = &scope.run.counters;
        for slot in counters {
            guarded(&slot.mnemonic, "set_count_time", deadline, slot.device.set_count_time(seconds)).await?;
        }
        for slot in counters {
            guarded(&slot.mnemonic, "start_count", deadline, slot.device.start_count()).await?;
        }
        for slot in counters {
            guarded(&slot.mnemonic, "wait", deadline, slot.device.wait()).await?;
        }
        Ok(())
    }

    async fn monitored(scope: &HookScope<'_>, preset: f64) -> anyhow::Result<()> {
        let Some(monitor) = scope.run.monitor else {
            anyhow::bail!("monitor counting requested but no monitor counter is configured");
        };
        let deadline = scope.count_deadline(preset);
        let counters: &[CounterSlot] = &scope.run.counters;

        for (i, slot) in counters.iter().enumerate() {
            let configure = if i == monitor {
                slot.device.set_preset(preset)
            } else if slot.device.can_stop_count() {
                slot.device.set_count_time(UNBOUNDED_COUNT_TIME)
            } else {
                slot.device.set_count_time(preset)
            };
            guarded(&slot.mnemonic, "configure", deadline, configure).await?;
        }
        for slot in counters {
            guarded(&slot.mnemonic, "start_count", deadline, slot.device.start_count()).await?;
        }

        let slot = &counters[monitor];
        guarded(&slot.mnemonic, "wait", deadline, slot.device.wait()).await?;

        for (i, slot) in counters.iter().enumerate() {
            if i == monitor {
                continue;
            }
            if slot.device.can_stop_count() {
                guarded(&slot.mnemonic, "stop_count", deadline, slot.device.stop_count()).await?;
            } else {
                guarded(&slot.mnemonic, "wait", deadline, slot.device.wait()).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ScanHook for DefaultOperation {
    async fn run(&self, scope: &mut HookScope<'_>) -> anyhow::Result<()> {
        let t = scope.count_time();
        if t < 0.0 {
            Self::monitored(scope, -t).await
        } else {
            Self::timed(scope, t).await
        }
    }

    fn name(&self) -> &str {
        "default_operation"
    }
}

/// Writes the file, plots and prints the summary.
///
/// Writer and plotter failures are logged; the acquired data is kept.
#[derive(Debug, Default)]
pub struct DefaultPostScan;

#[async_trait]
impl ScanHook for DefaultPostScan {
    async fn run(&self, scope: &mut HookScope<'_>) -> anyhow::Result<()> {
        let run = scope.run;
        let table = run.table.read();

        if let (Some(path), false) = (&run.output, run.settings.partial_write) {
            let header = ScanHeader::for_table(&table, run.command.as_str())
                .with_comment(&run.settings.comment);
            match run.writer.write(&table, path, &header) {
                Ok(written) => {
                    info!(path = %written.display(), rows = table.len(), "Scan data saved");
                    *run.written.lock() = Some(written);
                }
                Err(e) => warn!(error = %e, path = %path.display(), "Failed to write scan file"),
            }
        }

        if run.settings.plot {
            if let Some(plotter) = &run.plotter {
                if let Err(e) = plotter.plot(&table, &run.x_field, &run.y_field, run.plot_axis) {
                    warn!(error = %e, "Plotter failed");
                }
            }
        }

        for line in summary_lines(table.fit(), table.scan_duration()) {
            scope.println(&line);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "default_post_scan"
    }
}

/// Built-in hook for a slot.
pub fn default_hook(phase: Phase) -> Arc<dyn ScanHook> {
    match phase {
        Phase::PreScan => Arc::new(DefaultPreScan),
        Phase::Operation => Arc::new(DefaultOperation),
        Phase::PostScan => Arc::new(DefaultPostScan),
        Phase::PrePoint | Phase::PreOperation | Phase::PostOperation | Phase::PostPoint => {
            Arc::new(NoopHook)
        }
    }
}

/// The seven slots.
#[derive(Clone)]
pub struct Callbacks {
    slots: [Arc<dyn ScanHook>; 7],
    custom: [bool; 7],
}

impl Callbacks {
    /// Every slot at its default.
    pub fn new() -> Self {
        Self {
            slots: Phase::ALL.map(default_hook),
            custom: [false; 7],
        }
    }

    /// Install a hook, replacing whatever was there.
    pub fn set(&mut self, phase: Phase, hook: Arc<dyn ScanHook>) {
        self.slots[phase.slot()] = hook;
        self.custom[phase.slot()] = true;
    }

    /// Put the default back.
    pub fn clear(&mut self, phase: Phase) {
        self.slots[phase.slot()] = default_hook(phase);
        self.custom[phase.slot()] = false;
    }

    /// Hook currently installed.
    pub fn get(&self, phase: Phase) -> Arc<dyn ScanHook> {
        self.slots[phase.slot()].clone()
    }

    /// Whether the slot holds its default.
    pub fn is_default(&self, phase: Phase) -> bool {
        !self.custom[phase.slot()]
    }
}

impl Default for Callbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for phase in Phase::ALL {
            map.entry(&phase.name(), &self.slots[phase.slot()].name());
        }
        map.finish()
    }
}
