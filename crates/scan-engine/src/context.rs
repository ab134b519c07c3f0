//! Explicit scan context.
//!
//! A [`ScanContext`] owns everything a scan reads or writes: the device
//! registry, settings, callback slots, output collaborators and the shared
//! result table. Nothing is ambient; two contexts never interfere.

use crate::callbacks::{hook_fn, Callbacks, HookScope, Phase, ScanHook};
use crate::console::Console;
use crate::control::ScanControl;
use crate::engine::{ScanEngine, ScanPlan, ScanReport};
use crate::plot::Plotter;
use crate::settings::ScanSettings;
use scan_core::table::RESERVED_FIELDS;
use parking_lot::RwLock;
use scan_core::{DeviceRegistry, ScanError, ScanResult, ScanTable, SharedTable};
use scan_storage::{DefaultWriter, ScanWriter};
use std::sync::Arc;
use tracing::debug;

/// Registry, settings, callbacks and result table for a series of scans.
///
/// ```rust,ignore
/// let mut ctx = ScanContext::new(registry).with_settings(settings);
/// let report = ctx.scan("m1", 0.0, 10.0, 5, 1.0).await?;
/// let positions = ctx.table().read().column("m1");
/// ```
pub struct ScanContext {
    registry: DeviceRegistry,
    settings: ScanSettings,
    callbacks: Callbacks,
    writer: Arc<dyn ScanWriter>,
    plotter: Option<Arc<dyn Plotter>>,
    plot_axis: usize,
    console: Console,
    user_fields: Vec<String>,
    table: SharedTable,
    control: ScanControl,
}

impl ScanContext {
    /// Context with default settings and callbacks.
    pub fn new(registry: DeviceRegistry) -> Self {
        Self {
            registry,
            settings: ScanSettings::default(),
            callbacks: Callbacks::new(),
            writer: Arc::new(DefaultWriter),
            plotter: None,
            plot_axis: 1,
            console: Console::default(),
            user_fields: Vec::new(),
            table: Arc::new(RwLock::new(ScanTable::default())),
            control: ScanControl::default(),
        }
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: ScanSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Redirect console output.
    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Use another writer.
    pub fn with_writer(mut self, writer: Arc<dyn ScanWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// Install a plotter on axis 1.
    pub fn with_plotter(mut self, plotter: Arc<dyn Plotter>) -> Self {
        self.set_plotter(Some(plotter), 1);
        self
    }

    /// Device registry.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Device registry, for registration between scans.
    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    /// Current settings.
    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Settings, for changes between scans.
    pub fn settings_mut(&mut self) -> &mut ScanSettings {
        &mut self.settings
    }

    /// Install `hook` in the `phase` slot.
    pub fn set_callback(&mut self, phase: Phase, hook: Arc<dyn ScanHook>) {
        debug!(phase = %phase, hook = hook.name(), "Callback installed");
        self.callbacks.set(phase, hook);
    }

    /// Install a synchronous closure in the `phase` slot.
    pub fn set_callback_fn<F>(&mut self, phase: Phase, f: F)
    where
        F: Fn(&mut HookScope<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.set_callback(phase, hook_fn(f));
    }

    /// Restore the default hook of `phase`.
    pub fn clear_callback(&mut self, phase: Phase) {
        self.callbacks.clear(phase);
    }

    /// Installed callbacks.
    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    /// Install or remove the plotter; `axis` is passed through to it.
    pub fn set_plotter(&mut self, plotter: Option<Arc<dyn Plotter>>, axis: usize) {
        self.plotter = plotter;
        self.plot_axis = axis;
    }

    pub(crate) fn plotter(&self) -> Option<Arc<dyn Plotter>> {
        self.plotter.clone()
    }

    pub(crate) fn plot_axis(&self) -> usize {
        self.plot_axis
    }

    pub(crate) fn writer(&self) -> Arc<dyn ScanWriter> {
        self.writer.clone()
    }

    /// Register a user column filled by callbacks.
    pub fn add_user_field(&mut self, name: impl Into<String>) -> ScanResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ScanError::Configuration("user field name must not be empty".into()));
        }
        if RESERVED_FIELDS.contains(&name.as_str()) {
            return Err(ScanError::Configuration(format!(
                "'{name}' is a reserved field name"
            )));
        }
        if self.user_fields.contains(&name) || self.registry.get(&name).is_some() {
            return Err(ScanError::DuplicateMnemonic(name));
        }
        self.user_fields.push(name);
        Ok(())
    }

    /// Unregister a user column. Returns whether it existed.
    pub fn remove_user_field(&mut self, name: &str) -> bool {
        let before = self.user_fields.len();
        self.user_fields.retain(|f| f != name);
        before != self.user_fields.len()
    }

    /// Registered user columns, in order.
    pub fn user_fields(&self) -> &[String] {
        &self.user_fields
    }

    /// Shared result table. The last scan stays readable until the next starts.
    pub fn table(&self) -> SharedTable {
        self.table.clone()
    }

    /// Pause/abort handle, valid across scans.
    pub fn control(&self) -> ScanControl {
        self.control.clone()
    }

    /// Console sink.
    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Run `plan` against this context.
    pub async fn run(&mut self, plan: ScanPlan) -> ScanResult<ScanReport> {
        ScanEngine::new(self).run(plan).await
    }
}

impl std::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext")
            .field("devices", &self.registry.len())
            .field("settings", &self.settings)
            .field("callbacks", &self.callbacks)
            .field("user_fields", &self.user_fields)
            .field("state", &self.control.state())
            .finish()
    }
}
