//! Scan engine: drives one scan from Initializing to Idle.
//!
//! # State Machine
//!
//! ```text
//! Idle → Initializing → (Moving → Settling → PreOperation → Counting → Collecting) × N
//!      → Fitting → Finalizing → Idle
//! ```
//!
//! Per point: PrePoint, fire every move then wait on each device in turn,
//! PreOperation, Operation, PostOperation, commit one row, PostPoint.
//!
//! # Failure policy
//!
//! - Configuration errors are raised at Initializing, before any device I/O.
//! - A device refusal or timeout ends the loop at the point boundary; rows
//!   already committed stay, the table is finalized (PostScan included) and
//!   the error is returned.
//! - A callback error ends the scan without PostScan and reaches the caller.
//! - An abort finishes the current point and returns `ScanStatus::Aborted`.
//! - Fit, writer and plotter failures are logged and never fail the scan.

use crate::callbacks::{Callbacks, HookScope, Phase};
use crate::console::{row_line, Console};
use crate::context::ScanContext;
use crate::control::{EnginePhase, ScanControl, ScanState};
use crate::plot::Plotter;
use crate::settings::ScanSettings;
use crate::trajectory::{MeshOptions, PerPoint, ScanMode, ScanParam, TimeLimits, Trajectory};
use chrono::Local;
use parking_lot::Mutex;
use scan_core::fit;
use scan_core::limits::PRINT_PRECISION;
use scan_core::{
    Countable, FitOutcome, Row, ScanError, ScanResult, ScanTable, Scannable, SharedTable,
    TableLayout, POINTS_FIELD,
};
use scan_storage::{unique_file_name, RowSink, ScanHeader, ScanWriter};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, instrument, warn};

/// What to run.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    mode: ScanMode,
    params: Vec<ScanParam>,
    count_time: PerPoint,
    delay: PerPoint,
    command: Option<String>,
}

impl ScanPlan {
    /// Lockstep scan over `params`.
    pub fn scan(params: Vec<ScanParam>) -> Self {
        Self::new(ScanMode::Scan, params)
    }

    /// Outer-product scan over `params`, last one fastest.
    pub fn mesh(params: Vec<ScanParam>) -> Self {
        Self::new(ScanMode::Mesh(MeshOptions::default()), params)
    }

    /// Counting without moves.
    pub fn time(limits: TimeLimits) -> Self {
        Self::new(ScanMode::Time(limits), Vec::new())
    }

    fn new(mode: ScanMode, params: Vec<ScanParam>) -> Self {
        Self {
            mode,
            params,
            count_time: PerPoint::Scalar(1.0),
            delay: PerPoint::Scalar(0.0),
            command: None,
        }
    }

    /// Count time in seconds, scalar or per point; negative selects monitor counting.
    pub fn with_count_time(mut self, count_time: impl Into<PerPoint>) -> Self {
        self.count_time = count_time.into();
        self
    }

    /// Delay before each point after the first, scalar or per point.
    pub fn with_delay(mut self, delay: impl Into<PerPoint>) -> Self {
        self.delay = delay.into();
        self
    }

    /// Reverse the inner device on alternate rows. Ignored outside meshes.
    pub fn with_snake(mut self, snake: bool) -> Self {
        if let ScanMode::Mesh(options) = &mut self.mode {
            options.snake = snake;
        }
        self
    }

    /// Text recorded on the `#S` line.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Scan flavor.
    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Recorded command, or one derived from the plan.
    pub fn command(&self) -> String {
        if let Some(command) = &self.command {
            return command.clone();
        }
        let mut parts = vec![self.mode.name().to_string()];
        parts.extend(self.params.iter().map(|p| p.mnemonic().to_string()));
        parts.join(" ")
    }
}

/// How a scan that returned `Ok` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanStatus {
    /// Every planned point was recorded, or a time limit was reached.
    Completed,
    /// Stopped by `ScanControl::abort`.
    Aborted,
}

/// Summary returned to the caller.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Unique id of the run.
    pub scan_uid: String,
    /// How it ended.
    pub status: ScanStatus,
    /// Committed rows.
    pub points: usize,
    /// Wall time from start to end.
    pub duration: Duration,
    /// File written, if any.
    pub output: Option<PathBuf>,
    /// X field used for fitting and plotting.
    pub x_field: String,
    /// Y field used for fitting and plotting.
    pub y_field: String,
    /// Fit results, when fitting ran.
    pub fit: Option<FitOutcome>,
}

pub(crate) struct CounterSlot {
    pub(crate) mnemonic: String,
    pub(crate) device: Arc<dyn Countable>,
    pub(crate) factor: f64,
}

/// Everything fixed at Initializing for one run.
pub(crate) struct RunState {
    pub(crate) uid: String,
    pub(crate) mode: ScanMode,
    pub(crate) command: String,
    pub(crate) settings: ScanSettings,
    pub(crate) started: Instant,
    pub(crate) planned_points: Option<usize>,
    pub(crate) scannables: Vec<(String, Arc<dyn Scannable>)>,
    pub(crate) counters: Vec<CounterSlot>,
    pub(crate) monitor: Option<usize>,
    pub(crate) count_time: PerPoint,
    pub(crate) user_fields: Vec<String>,
    pub(crate) x_field: String,
    pub(crate) y_field: String,
    pub(crate) table: SharedTable,
    pub(crate) console: Console,
    pub(crate) plotter: Option<Arc<dyn Plotter>>,
    pub(crate) plot_axis: usize,
    pub(crate) writer: Arc<dyn ScanWriter>,
    pub(crate) output: Option<PathBuf>,
    pub(crate) written: Mutex<Option<PathBuf>>,
    pub(crate) control: ScanControl,
}

/// Await a device call with a deadline, classifying the failure.
pub(crate) async fn guarded<T, F>(
    mnemonic: &str,
    operation: &'static str,
    deadline: Duration,
    fut: F,
) -> ScanResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ScanError::from_device(mnemonic, operation, deadline, e)),
        Err(_) => Err(ScanError::Timeout {
            mnemonic: mnemonic.to_string(),
            operation,
            after: deadline,
        }),
    }
}

enum LoopEnd {
    Completed,
    Aborted,
}

/// Runs scans against a [`ScanContext`].
///
/// Taking the context mutably keeps one scan per context at a time; clone
/// [`ScanContext::control`] or [`ScanContext::table`] beforehand to steer or
/// watch the run from another task.
pub struct ScanEngine<'c> {
    ctx: &'c mut ScanContext,
}

impl<'c> ScanEngine<'c> {
    /// Engine bound to `ctx`.
    pub fn new(ctx: &'c mut ScanContext) -> Self {
        Self { ctx }
    }

    /// Run `plan` to completion.
    #[instrument(skip_all, fields(scan_uid = tracing::field::Empty, mode = plan.mode().name()))]
    pub async fn run(self, plan: ScanPlan) -> ScanResult<ScanReport> {
        let control = self.ctx.control();
        control.begin();

        let (run, trajectory, delay) = match self.prepare(&plan) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, "Scan rejected");
                control.finish(ScanState::Error);
                return Err(e);
            }
        };
        tracing::Span::current().record("scan_uid", run.uid.as_str());
        info!(
            command = %run.command,
            points = ?run.planned_points,
            devices = run.scannables.len(),
            counters = run.counters.len(),
            "Scan started"
        );

        let callbacks = self.ctx.callbacks().clone();
        let mut sink = open_partial(&run);
        let mut staged = HashMap::new();

        let outcome = match fire(&run, &callbacks, Phase::PreScan, None, &[], &mut staged).await {
            Ok(()) => acquire(&run, &callbacks, &trajectory, &delay, &mut sink).await,
            Err(e) => Err(e),
        };

        let points = run.table.read().len();
        let result = match outcome {
            Ok(end) => {
                if matches!(end, LoopEnd::Completed) && run.settings.fit {
                    fit_table(&run);
                }
                finalize(&run, sink);
                let post = fire(&run, &callbacks, Phase::PostScan, None, &[], &mut staged).await;
                post.map(|()| match end {
                    LoopEnd::Completed => ScanStatus::Completed,
                    LoopEnd::Aborted => ScanStatus::Aborted,
                })
            }
            Err(e @ ScanError::Hook { .. }) => {
                error!(error = %e, points, "Callback failed; scan stopped");
                run.table.write().set_error(e.to_string());
                finalize(&run, sink);
                Err(e)
            }
            Err(e) => {
                error!(error = %e, points, "Scan failed; keeping recorded points");
                run.table.write().set_error(e.to_string());
                finalize(&run, sink);
                if let Err(post) = fire(&run, &callbacks, Phase::PostScan, None, &[], &mut staged).await {
                    warn!(error = %post, "PostScan failed after scan error");
                }
                Err(e)
            }
        };

        match result {
            Ok(status) => {
                control.finish(match status {
                    ScanStatus::Completed => ScanState::Idle,
                    ScanStatus::Aborted => ScanState::Interrupted,
                });
                let table = run.table.read();
                info!(?status, points, "Scan finished");
                Ok(ScanReport {
                    scan_uid: run.uid.clone(),
                    status,
                    points,
                    duration: table.scan_duration().unwrap_or_default(),
                    output: run.written.lock().clone(),
                    x_field: run.x_field.clone(),
                    y_field: run.y_field.clone(),
                    fit: table.fit().cloned(),
                })
            }
            Err(e) => {
                control.finish(ScanState::Error);
                Err(e)
            }
        }
    }

    /// Initializing: validate everything, then reset the table.
    fn prepare(&self, plan: &ScanPlan) -> ScanResult<(RunState, Trajectory, PerPoint)> {
        let ctx = &*self.ctx;
        let control = ctx.control();
        control.set_phase(EnginePhase::Initializing);

        let settings = ctx.settings().clone();
        settings.validate()?;
        let trajectory = Trajectory::new(plan.mode, plan.params.clone())?;
        let planned_points = trajectory.len();

        let registry = ctx.registry();
        let mut seen = HashSet::new();
        let mut scannables = Vec::with_capacity(trajectory.params().len());
        for param in trajectory.params() {
            let mnemonic = param.mnemonic();
            if !seen.insert(mnemonic) {
                return Err(ScanError::DuplicateMnemonic(mnemonic.to_string()));
            }
            let device = registry.scannable(mnemonic)?;
            for &target in param.targets() {
                device
                    .check_target(target)
                    .map_err(|v| v.into_scan_error(mnemonic))?;
            }
            scannables.push((mnemonic.to_string(), device));
        }

        let monitor_name = registry.monitor()?.map(|h| h.mnemonic().to_string());
        let mut counters = Vec::new();
        let mut monitor = None;
        for handle in registry.active_counters() {
            let Some(device) = handle.as_countable() else {
                continue;
            };
            // A device that is also a scan axis keeps a single column: its readback.
            if seen.contains(handle.mnemonic()) {
                if monitor_name.as_deref() == Some(handle.mnemonic()) {
                    return Err(ScanError::Configuration(format!(
                        "monitor '{}' cannot also be a scan axis",
                        handle.mnemonic()
                    )));
                }
                debug!(mnemonic = handle.mnemonic(), "Counter is a scan axis; not counted");
                continue;
            }
            if monitor_name.as_deref() == Some(handle.mnemonic()) {
                monitor = Some(counters.len());
            }
            counters.push(CounterSlot {
                mnemonic: handle.mnemonic().to_string(),
                device: device.clone(),
                factor: handle.counter_options().factor,
            });
        }

        plan.count_time.validate("count time", planned_points)?;
        plan.delay.validate("delay", planned_points)?;
        if plan.delay.any_negative() {
            return Err(ScanError::Configuration("delay must not be negative".into()));
        }
        if plan.count_time.any_negative() && monitor.is_none() {
            return Err(ScanError::Configuration(
                "monitor counting requested but no monitor counter is configured".into(),
            ));
        }

        let layout = TableLayout {
            devices: scannables.iter().map(|(m, _)| m.clone()).collect(),
            counters: counters.iter().map(|c| c.mnemonic.clone()).collect(),
            user: ctx.user_fields().to_vec(),
        };
        let mut table = ScanTable::new(layout)?;

        let default_x = match plan.mode {
            ScanMode::Time(_) => POINTS_FIELD.to_string(),
            _ => scannables
                .first()
                .map(|(m, _)| m.clone())
                .unwrap_or_else(|| POINTS_FIELD.to_string()),
        };
        let x_field = pick_field(&table, "X", settings.x_field.as_deref(), default_x);
        let default_y = counters
            .first()
            .map(|c| c.mnemonic.clone())
            .unwrap_or_else(|| x_field.clone());
        let y_field = pick_field(&table, "Y", settings.y_field.as_deref(), default_y);

        let output = settings.output.as_ref().map(|path| {
            if settings.unique_file_names {
                unique_file_name(path)
            } else {
                path.clone()
            }
        });

        let shared = ctx.table();
        table.mark_start(Local::now());
        *shared.write() = table;

        let run = RunState {
            uid: uuid::Uuid::new_v4().to_string(),
            mode: plan.mode,
            command: plan.command(),
            started: Instant::now(),
            planned_points,
            scannables,
            counters,
            monitor,
            count_time: plan.count_time.clone(),
            user_fields: ctx.user_fields().to_vec(),
            x_field,
            y_field,
            table: shared,
            console: ctx.console().clone(),
            plotter: ctx.plotter(),
            plot_axis: ctx.plot_axis(),
            writer: ctx.writer(),
            output,
            written: Mutex::new(None),
            control,
            settings,
        };
        Ok((run, trajectory, plan.delay.clone()))
    }
}

fn pick_field(table: &ScanTable, axis: &str, configured: Option<&str>, fallback: String) -> String {
    match configured {
        Some(name) if table.has_field(name) => name.to_string(),
        Some(name) => {
            warn!(field = name, fallback = %fallback, "{axis} field is not part of this scan");
            fallback
        }
        None => fallback,
    }
}

fn open_partial(run: &RunState) -> Option<Box<dyn RowSink>> {
    if !run.settings.partial_write {
        return None;
    }
    let path = run.output.as_ref()?;
    let header = {
        let table = run.table.read();
        ScanHeader::for_table(&table, run.command.as_str())
            .with_comment(&run.settings.comment)
            .with_point_count(run.planned_points.unwrap_or(0))
    };
    match run.writer.open_partial(path, &header) {
        Ok(sink) => {
            info!(path = %sink.path().display(), "Streaming rows to file");
            Some(sink)
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to open scan file; continuing without it");
            None
        }
    }
}

async fn fire(
    run: &RunState,
    callbacks: &Callbacks,
    phase: Phase,
    point: Option<usize>,
    targets: &[f64],
    staged: &mut HashMap<String, f64>,
) -> ScanResult<()> {
    let hook = callbacks.get(phase);
    let mut scope = HookScope::new(run, phase, point, targets, staged);
    hook.run(&mut scope)
        .await
        .map_err(|e| match e.downcast::<ScanError>() {
            Ok(scan_err) => scan_err,
            Err(source) => ScanError::Hook {
                phase: phase.name(),
                source,
            },
        })
}

/// Between points: honor pause, then report whether to go on.
async fn checkpoint(run: &RunState, index: usize) -> bool {
    let control = &run.control;
    if control.pause_requested() && !control.abort_requested() {
        control.set_state(ScanState::Paused);
        info!(point = index, "Pausing scan");
        while control.pause_requested() && !control.abort_requested() {
            sleep(run.settings.poll_interval()).await;
        }
        if !control.abort_requested() {
            control.set_state(ScanState::Running);
            info!(point = index, "Resuming scan");
        }
    }
    if control.abort_requested() {
        info!(point = index, "Scan aborted");
        return false;
    }
    true
}

/// Sleep in poll-interval chunks; `false` when an abort cut it short.
async fn interruptible_delay(run: &RunState, seconds: f64) -> bool {
    let total = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX);
    let chunk = run.settings.poll_interval();
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        if run.control.abort_requested() {
            info!(
                elapsed_ms = elapsed.as_millis() as u64,
                total_ms = total.as_millis() as u64,
                "Delay interrupted by abort request"
            );
            return false;
        }
        let step = chunk.min(total - elapsed);
        sleep(step).await;
        elapsed += step;
    }
    true
}

/// Whether a time scan has run past its duration limit.
fn time_limit_reached(run: &RunState, index: usize) -> bool {
    let ScanMode::Time(TimeLimits {
        duration: Some(limit),
        ..
    }) = run.mode
    else {
        return false;
    };
    let reached = run.started.elapsed() >= limit;
    if reached {
        debug!(point = index, "Time limit reached");
    }
    reached
}

async fn acquire(
    run: &RunState,
    callbacks: &Callbacks,
    trajectory: &Trajectory,
    delay: &PerPoint,
    sink: &mut Option<Box<dyn RowSink>>,
) -> ScanResult<LoopEnd> {
    let mut staged = HashMap::new();
    let mut index = 0usize;
    loop {
        if trajectory.len().is_some_and(|n| index >= n) {
            return Ok(LoopEnd::Completed);
        }
        if time_limit_reached(run, index) {
            return Ok(LoopEnd::Completed);
        }
        if !checkpoint(run, index).await {
            return Ok(LoopEnd::Aborted);
        }
        if index > 0 {
            let seconds = delay.at(index).unwrap_or_default();
            if seconds > 0.0 {
                if !interruptible_delay(run, seconds).await {
                    return Ok(LoopEnd::Aborted);
                }
                if time_limit_reached(run, index) {
                    return Ok(LoopEnd::Completed);
                }
            }
        }

        let targets = trajectory.targets(index).unwrap_or_default();
        staged.clear();

        fire(run, callbacks, Phase::PrePoint, Some(index), &targets, &mut staged).await?;
        if !targets.is_empty() {
            move_all(run, &targets).await?;
        }
        run.control.set_phase(EnginePhase::PreOperation);
        fire(run, callbacks, Phase::PreOperation, Some(index), &targets, &mut staged).await?;
        run.control.set_phase(EnginePhase::Counting);
        fire(run, callbacks, Phase::Operation, Some(index), &targets, &mut staged).await?;
        fire(run, callbacks, Phase::PostOperation, Some(index), &targets, &mut staged).await?;

        run.control.set_phase(EnginePhase::Collecting);
        let row = collect(run, index, &mut staged).await?;
        run.table.write().commit_row(row)?;
        publish_row(run, index, sink);

        fire(run, callbacks, Phase::PostPoint, Some(index), &targets, &mut staged).await?;
        index += 1;
    }
}

/// Fire every move, then wait on each device in turn.
async fn move_all(run: &RunState, targets: &[f64]) -> ScanResult<()> {
    let deadline = run.settings.settle_timeout();
    run.control.set_phase(EnginePhase::Moving);
    for ((mnemonic, device), &target) in run.scannables.iter().zip(targets) {
        guarded(mnemonic, "move", deadline, device.move_to(target)).await?;
    }
    run.control.set_phase(EnginePhase::Settling);
    for (mnemonic, device) in &run.scannables {
        let started = Instant::now();
        guarded(mnemonic, "wait", deadline, device.wait()).await?;
        debug!(
            device = %mnemonic,
            waited_ms = started.elapsed().as_millis() as u64,
            "Device settled"
        );
    }
    Ok(())
}

/// Read every participant. Nothing is committed if a read fails.
async fn collect(run: &RunState, index: usize, staged: &mut HashMap<String, f64>) -> ScanResult<Row> {
    let deadline = run.settings.settle_timeout();
    let mut devices = Vec::with_capacity(run.scannables.len());
    for (mnemonic, device) in &run.scannables {
        devices.push(guarded(mnemonic, "read", deadline, device.value()).await?);
    }
    let mut counters = Vec::with_capacity(run.counters.len());
    for slot in &run.counters {
        let raw = guarded(&slot.mnemonic, "read", deadline, slot.device.value()).await?;
        counters.push(raw / slot.factor);
    }
    let user = run
        .user_fields
        .iter()
        .map(|name| staged.remove(name).unwrap_or(f64::NAN))
        .collect();
    Ok(Row {
        index,
        elapsed: run.started.elapsed().as_secs_f64(),
        devices,
        counters,
        user,
    })
}

/// Stream, print and plot a committed row.
fn publish_row(run: &RunState, index: usize, sink: &mut Option<Box<dyn RowSink>>) {
    let table = run.table.read();
    let mut sink_failed = false;
    if let (Some(out), Some(row)) = (sink.as_mut(), table.row(index)) {
        if let Err(e) = out.append(&row) {
            warn!(error = %e, "Failed to append row; partial file abandoned");
            sink_failed = true;
        }
    }
    if sink_failed {
        *sink = None;
    }
    if run.settings.print {
        if let Some(line) = row_line(&table, index, PRINT_PRECISION) {
            run.console.line(&line);
        }
    }
    if run.settings.plot {
        if let Some(plotter) = &run.plotter {
            if let Err(e) = plotter.plot(&table, &run.x_field, &run.y_field, run.plot_axis) {
                warn!(error = %e, "Plotter failed");
            }
        }
    }
}

/// Fitting: characterize Y over X; failures are logged only.
fn fit_table(run: &RunState) {
    run.control.set_phase(EnginePhase::Fitting);
    let (x, y) = {
        let table = run.table.read();
        (table.column(&run.x_field), table.column(&run.y_field))
    };
    let (Some(x), Some(y)) = (x, y) else {
        debug!(x = %run.x_field, y = %run.y_field, "Fit fields unavailable");
        return;
    };
    if x.is_empty() {
        debug!("No points to fit");
        return;
    }
    match fit::fit(&x, &y) {
        Ok(outcome) => {
            if let Some(reason) = &outcome.fit_error {
                warn!(reason = %reason, "Gaussian fit failed; reporting data statistics only");
            }
            debug!(peak = outcome.peak, peak_at = outcome.peak_at, fwhm = outcome.fwhm, "Fit complete");
            run.table.write().set_fit(outcome);
        }
        Err(e) => warn!(error = %e, "Fit failed; scan data kept"),
    }
}

/// Finalizing: close the partial file and record the end time.
fn finalize(run: &RunState, sink: Option<Box<dyn RowSink>>) {
    run.control.set_phase(EnginePhase::Finalizing);
    if let Some(sink) = sink {
        match sink.finish() {
            Ok(path) => *run.written.lock() = Some(path),
            Err(e) => warn!(error = %e, "Failed to close partial scan file"),
        }
    }
    let duration = run.started.elapsed();
    let mut table = run.table.write();
    let start = table.scan_start().unwrap_or_else(Local::now);
    let end = chrono::Duration::from_std(duration)
        .map(|d| start + d)
        .unwrap_or_else(|_| Local::now());
    table.mark_end(end, duration);
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{CounterOptions, DeviceRegistry, DriverError, DriverErrorKind};
    use scan_driver_mock::{SimCounter, SimMotor};
    use tracing_test::traced_test;

    fn context() -> ScanContext {
        let mut registry = DeviceRegistry::new();
        registry.add_scannable("m1", Arc::new(SimMotor::new())).unwrap();
        registry
            .add_countable(
                "det",
                Arc::new(SimCounter::builder().sequence(vec![3.0, 9.0, 4.0]).build()),
                CounterOptions::default(),
            )
            .unwrap();
        ScanContext::new(registry)
            .with_settings(ScanSettings::default().quiet())
            .with_console(Console::Silent)
    }

    struct BrokenPlotter;

    impl Plotter for BrokenPlotter {
        fn plot(&self, _: &ScanTable, _: &str, _: &str, _: usize) -> anyhow::Result<()> {
            anyhow::bail!("display unavailable")
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn writer_failure_only_warns() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut ctx = context();
        ctx.settings_mut().output = Some(blocker.join("scan.dat"));
        let report = ctx.scan("m1", 0.0, 2.0, 2, 0.1).await.unwrap();

        assert_eq!(report.status, ScanStatus::Completed);
        assert_eq!(report.points, 3);
        assert!(report.output.is_none());
        assert!(logs_contain("Failed to write scan file"));
    }

    #[tokio::test]
    #[traced_test]
    async fn plotter_failure_only_warns() {
        let mut ctx = context().with_plotter(Arc::new(BrokenPlotter));
        ctx.settings_mut().plot = true;
        let report = ctx.scan("m1", 0.0, 2.0, 2, 0.1).await.unwrap();

        assert_eq!(report.points, 3);
        assert!(logs_contain("Plotter failed"));
        assert!(logs_contain("display unavailable"));
    }

    #[tokio::test]
    #[traced_test]
    async fn fit_failure_keeps_data() {
        let mut ctx = context();
        ctx.add_user_field("temp").unwrap();
        ctx.settings_mut().fit = true;
        ctx.settings_mut().y_field = Some("temp".into());
        let report = ctx.scan("m1", 0.0, 2.0, 2, 0.1).await.unwrap();

        assert_eq!(report.status, ScanStatus::Completed);
        assert!(report.fit.is_none());
        assert_eq!(ctx.table().read().column("det").unwrap(), vec![3.0, 9.0, 4.0]);
        assert!(logs_contain("Fit failed; scan data kept"));
    }

    #[tokio::test]
    #[traced_test]
    async fn rejected_scan_is_logged_as_error() {
        let mut registry = DeviceRegistry::new();
        registry
            .add_scannable(
                "m1",
                Arc::new(SimMotor::builder().limits(-1.0, 1.0).build()),
            )
            .unwrap();
        let mut ctx = ScanContext::new(registry).with_settings(ScanSettings::default().quiet());
        let err = ctx.scan("m1", 0.0, 5.0, 1, 0.1).await.unwrap_err();
        assert!(matches!(err, ScanError::OutOfRange { .. }));
        assert!(logs_contain("Scan rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn guarded_classifies_failures() {
        let deadline = Duration::from_millis(200);

        let ok = guarded("m1", "read", deadline, async { Ok(1.5) }).await;
        assert_eq!(ok.unwrap(), 1.5);

        let stalled = guarded::<(), _>("m1", "wait", deadline, std::future::pending()).await;
        assert!(matches!(stalled, Err(ScanError::Timeout { after, .. }) if after == deadline));

        let driver_timeout = guarded::<(), _>("m1", "wait", deadline, async {
            Err(DriverError::new("sim", DriverErrorKind::Timeout, "no reply").into())
        })
        .await;
        assert!(matches!(driver_timeout, Err(ScanError::Timeout { operation: "wait", .. })));

        let refused = guarded::<(), _>("m1", "move", deadline, async {
            Err(anyhow::anyhow!("interlock"))
        })
        .await;
        assert!(matches!(refused, Err(ScanError::Device { ref mnemonic, .. }) if mnemonic == "m1"));
    }

    #[test]
    fn plan_command_defaults_to_mode_and_devices() {
        let plan = ScanPlan::mesh(vec![
            ScanParam::linear("m1", 0.0, 1.0, 1).unwrap(),
            ScanParam::linear("m2", 0.0, 1.0, 1).unwrap(),
        ]);
        assert_eq!(plan.command(), "mesh m1 m2");
        assert_eq!(plan.with_command("custom").command(), "custom");
    }
}
