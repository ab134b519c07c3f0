//! Mnemonic-keyed device registry.
//!
//! Devices are registered once, before any scan starts, under a unique
//! mnemonic. A handle may carry the `Scannable` capability, the `Countable`
//! capability, or both. Counters additionally carry [`CounterOptions`]
//! (scaling factor, monitor flag, enabled flag) that decide how the default
//! counting operation treats them.

use crate::capabilities::{Countable, Scannable};
use crate::error::{ScanError, ScanResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Capability tag of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Corresponds to [`Scannable`].
    Scannable,
    /// Corresponds to [`Countable`].
    Countable,
}

impl Capability {
    /// Trait name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Capability::Scannable => "Scannable",
            Capability::Countable => "Countable",
        }
    }
}

/// Options applied to a counter when it takes part in a scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CounterOptions {
    /// Recorded value is `raw / factor`.
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Counter drives the count window in monitor mode.
    #[serde(default)]
    pub monitor: bool,
    /// Disabled counters are skipped entirely.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_factor() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl Default for CounterOptions {
    fn default() -> Self {
        Self {
            factor: 1.0,
            monitor: false,
            enabled: true,
        }
    }
}

impl CounterOptions {
    /// Set the scaling factor.
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Mark as the monitor.
    pub fn as_monitor(mut self) -> Self {
        self.monitor = true;
        self
    }

    /// Register disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// One registered participant.
#[derive(Clone)]
pub struct DeviceHandle {
    mnemonic: String,
    scannable: Option<Arc<dyn Scannable>>,
    countable: Option<Arc<dyn Countable>>,
    counter: CounterOptions,
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("mnemonic", &self.mnemonic)
            .field("capabilities", &self.capabilities())
            .field("counter", &self.counter)
            .finish()
    }
}

impl DeviceHandle {
    /// Handle for a scannable device.
    pub fn scannable(mnemonic: impl Into<String>, device: Arc<dyn Scannable>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            scannable: Some(device),
            countable: None,
            counter: CounterOptions::default(),
        }
    }

    /// Handle for a countable device.
    pub fn countable(mnemonic: impl Into<String>, device: Arc<dyn Countable>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            scannable: None,
            countable: Some(device),
            counter: CounterOptions::default(),
        }
    }

    /// Add the countable capability to a handle.
    pub fn with_countable(mut self, device: Arc<dyn Countable>) -> Self {
        self.countable = Some(device);
        self
    }

    /// Add the scannable capability to a handle.
    pub fn with_scannable(mut self, device: Arc<dyn Scannable>) -> Self {
        self.scannable = Some(device);
        self
    }

    /// Set counter options.
    pub fn with_counter_options(mut self, options: CounterOptions) -> Self {
        self.counter = options;
        self
    }

    /// Device mnemonic.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// Capabilities carried by this handle.
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::with_capacity(2);
        if self.scannable.is_some() {
            caps.push(Capability::Scannable);
        }
        if self.countable.is_some() {
            caps.push(Capability::Countable);
        }
        caps
    }

    /// Whether the handle carries `capability`.
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Scannable => self.scannable.is_some(),
            Capability::Countable => self.countable.is_some(),
        }
    }

    /// Scannable view, if any.
    pub fn as_scannable(&self) -> Option<&Arc<dyn Scannable>> {
        self.scannable.as_ref()
    }

    /// Countable view, if any.
    pub fn as_countable(&self) -> Option<&Arc<dyn Countable>> {
        self.countable.as_ref()
    }

    /// Counter options.
    pub fn counter_options(&self) -> &CounterOptions {
        &self.counter
    }
}

/// Registry of devices available to scans, in registration order.
#[derive(Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<DeviceHandle>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.devices.iter()).finish()
    }
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device handle.
    pub fn register(&mut self, handle: DeviceHandle) -> ScanResult<()> {
        if handle.mnemonic.trim().is_empty() {
            return Err(ScanError::Configuration(
                "device mnemonic must not be empty".into(),
            ));
        }
        if self.index.contains_key(&handle.mnemonic) {
            return Err(ScanError::DuplicateMnemonic(handle.mnemonic));
        }
        if handle.scannable.is_none() && handle.countable.is_none() {
            return Err(ScanError::Configuration(format!(
                "device '{}' carries no capability",
                handle.mnemonic
            )));
        }
        if handle.countable.is_some() && !(handle.counter.factor.is_finite() && handle.counter.factor != 0.0) {
            return Err(ScanError::Configuration(format!(
                "counter '{}' has invalid factor {}",
                handle.mnemonic, handle.counter.factor
            )));
        }
        tracing::debug!(mnemonic = %handle.mnemonic, capabilities = ?handle.capabilities(), "Registered device");
        self.index.insert(handle.mnemonic.clone(), self.devices.len());
        self.devices.push(handle);
        Ok(())
    }

    /// Register a scannable device.
    pub fn add_scannable(
        &mut self,
        mnemonic: impl Into<String>,
        device: Arc<dyn Scannable>,
    ) -> ScanResult<()> {
        self.register(DeviceHandle::scannable(mnemonic, device))
    }

    /// Register a countable device.
    pub fn add_countable(
        &mut self,
        mnemonic: impl Into<String>,
        device: Arc<dyn Countable>,
        options: CounterOptions,
    ) -> ScanResult<()> {
        self.register(DeviceHandle::countable(mnemonic, device).with_counter_options(options))
    }

    /// Remove a device.
    pub fn unregister(&mut self, mnemonic: &str) -> Option<DeviceHandle> {
        let position = self.index.remove(mnemonic)?;
        let handle = self.devices.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(handle)
    }

    /// Look up a handle.
    pub fn get(&self, mnemonic: &str) -> Option<&DeviceHandle> {
        self.index.get(mnemonic).map(|&i| &self.devices[i])
    }

    fn get_mut(&mut self, mnemonic: &str) -> ScanResult<&mut DeviceHandle> {
        match self.index.get(mnemonic) {
            Some(&i) => Ok(&mut self.devices[i]),
            None => Err(ScanError::UnknownDevice(mnemonic.to_string())),
        }
    }

    /// Resolve a mnemonic that must be scannable.
    pub fn scannable(&self, mnemonic: &str) -> ScanResult<Arc<dyn Scannable>> {
        let handle = self
            .get(mnemonic)
            .ok_or_else(|| ScanError::UnknownDevice(mnemonic.to_string()))?;
        handle
            .scannable
            .clone()
            .ok_or_else(|| ScanError::MissingCapability {
                mnemonic: mnemonic.to_string(),
                capability: Capability::Scannable.name(),
            })
    }

    /// Resolve a mnemonic that must be countable.
    pub fn countable(&self, mnemonic: &str) -> ScanResult<Arc<dyn Countable>> {
        let handle = self
            .get(mnemonic)
            .ok_or_else(|| ScanError::UnknownDevice(mnemonic.to_string()))?;
        handle
            .countable
            .clone()
            .ok_or_else(|| ScanError::MissingCapability {
                mnemonic: mnemonic.to_string(),
                capability: Capability::Countable.name(),
            })
    }

    /// Enable or disable a counter.
    pub fn set_counter_enabled(&mut self, mnemonic: &str, enabled: bool) -> ScanResult<()> {
        let handle = self.get_mut(mnemonic)?;
        if handle.countable.is_none() {
            return Err(ScanError::MissingCapability {
                mnemonic: mnemonic.to_string(),
                capability: Capability::Countable.name(),
            });
        }
        handle.counter.enabled = enabled;
        Ok(())
    }

    /// Make `mnemonic` the only monitor, or clear the monitor with `None`.
    pub fn set_monitor(&mut self, mnemonic: Option<&str>) -> ScanResult<()> {
        if let Some(name) = mnemonic {
            let handle = self
                .get(name)
                .ok_or_else(|| ScanError::UnknownDevice(name.to_string()))?;
            match &handle.countable {
                Some(device) if device.can_monitor() => {}
                Some(_) => {
                    return Err(ScanError::Configuration(format!(
                        "counter '{name}' cannot act as monitor"
                    )))
                }
                None => {
                    return Err(ScanError::MissingCapability {
                        mnemonic: name.to_string(),
                        capability: Capability::Countable.name(),
                    })
                }
            }
        }
        for handle in &mut self.devices {
            handle.counter.monitor = Some(handle.mnemonic.as_str()) == mnemonic;
        }
        Ok(())
    }

    /// Enabled counters, in registration order.
    pub fn active_counters(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices
            .iter()
            .filter(|h| h.countable.is_some() && h.counter.enabled)
    }

    /// The enabled monitor counter, validated.
    ///
    /// At most one enabled counter may be flagged as monitor, and it must
    /// report `can_monitor()`.
    pub fn monitor(&self) -> ScanResult<Option<&DeviceHandle>> {
        let mut monitors = self.active_counters().filter(|h| h.counter.monitor);
        let first = monitors.next();
        if let Some(second) = monitors.next() {
            return Err(ScanError::Configuration(format!(
                "more than one monitor counter configured ('{}', '{}')",
                first.map(|h| h.mnemonic.as_str()).unwrap_or_default(),
                second.mnemonic
            )));
        }
        if let Some(handle) = first {
            let can_monitor = handle.countable.as_ref().is_some_and(|c| c.can_monitor());
            if !can_monitor {
                return Err(ScanError::Configuration(format!(
                    "counter '{}' cannot act as monitor",
                    handle.mnemonic
                )));
            }
        }
        Ok(first)
    }

    /// Registered mnemonics, in registration order.
    pub fn mnemonics(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|h| h.mnemonic.as_str())
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct Fixed(f64, bool);

    #[async_trait]
    impl Countable for Fixed {
        async fn start_count(&self) -> Result<()> {
            Ok(())
        }
        async fn wait(&self) -> Result<()> {
            Ok(())
        }
        async fn value(&self) -> Result<f64> {
            Ok(self.0)
        }
        fn can_monitor(&self) -> bool {
            self.1
        }
    }

    #[async_trait]
    impl Scannable for Fixed {
        async fn move_to(&self, _target: f64) -> Result<()> {
            Ok(())
        }
        async fn wait(&self) -> Result<()> {
            Ok(())
        }
        async fn value(&self) -> Result<f64> {
            Ok(self.0)
        }
    }

    #[test]
    fn duplicate_mnemonic_is_rejected() {
        let mut registry = DeviceRegistry::new();
        registry
            .add_scannable("m1", Arc::new(Fixed(0.0, false)))
            .unwrap();
        let err = registry
            .add_countable("m1", Arc::new(Fixed(0.0, false)), CounterOptions::default())
            .unwrap_err();
        assert!(matches!(err, ScanError::DuplicateMnemonic(ref m) if m == "m1"));
    }

    #[test]
    fn capability_lookup() {
        let mut registry = DeviceRegistry::new();
        registry
            .add_scannable("m1", Arc::new(Fixed(0.0, false)))
            .unwrap();
        let both = Arc::new(Fixed(1.0, false));
        registry
            .register(DeviceHandle::scannable("dual", both.clone()).with_countable(both))
            .unwrap();

        assert!(registry.scannable("m1").is_ok());
        assert!(matches!(
            registry.countable("m1"),
            Err(ScanError::MissingCapability { capability: "Countable", .. })
        ));
        assert!(matches!(registry.scannable("nope"), Err(ScanError::UnknownDevice(_))));
        assert_eq!(
            registry.get("dual").unwrap().capabilities(),
            vec![Capability::Scannable, Capability::Countable]
        );
    }

    #[test]
    fn unregister_keeps_order() {
        let mut registry = DeviceRegistry::new();
        for name in ["a", "b", "c"] {
            registry
                .add_countable(name, Arc::new(Fixed(0.0, false)), CounterOptions::default())
                .unwrap();
        }
        assert!(registry.unregister("a").is_some());
        assert!(registry.unregister("a").is_none());
        let names: Vec<&str> = registry.mnemonics().collect();
        assert_eq!(names, vec!["b", "c"]);
        assert!(registry.countable("c").is_ok());
    }

    #[test]
    fn monitor_validation() {
        let mut registry = DeviceRegistry::new();
        registry
            .add_countable("mon", Arc::new(Fixed(0.0, true)), CounterOptions::default())
            .unwrap();
        registry
            .add_countable("det", Arc::new(Fixed(0.0, false)), CounterOptions::default())
            .unwrap();

        assert!(registry.monitor().unwrap().is_none());
        registry.set_monitor(Some("mon")).unwrap();
        assert_eq!(registry.monitor().unwrap().unwrap().mnemonic(), "mon");
        assert!(registry.set_monitor(Some("det")).is_err());

        registry.set_counter_enabled("mon", false).unwrap();
        assert!(registry.monitor().unwrap().is_none());
        assert_eq!(registry.active_counters().count(), 1);
    }

    #[test]
    fn zero_factor_is_rejected() {
        let mut registry = DeviceRegistry::new();
        let err = registry
            .add_countable(
                "c1",
                Arc::new(Fixed(0.0, false)),
                CounterOptions::default().with_factor(0.0),
            )
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
