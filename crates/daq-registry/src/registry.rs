//! Device registry
//!
//! The registry keeps a list of live device handles and resolves queries
//! against it. Devices become known in three ways:
//!
//! 1. explicitly, through [`Registry::register`];
//! 2. by class, after [`Registry::register_class`]: every later instance of
//!    that class (or a subclass) is captured when it is constructed;
//! 3. implicitly, while `auto_register` is on: every device announced on the
//!    registry's [`InstantiationBus`] is captured.
//!
//! Paths 2 and 3 go through a single bus subscription held for the lifetime
//! of the registry.
//!
//! # Locking
//!
//! Entry storage sits behind one `RwLock`. Device methods that can run
//! arbitrary code (`component`, `children`, `parent`, `wait_for_connection`)
//! and mirror calls are only invoked on snapshots taken with the lock
//! released, because a lazy component lookup may construct a device, which
//! re-enters the registry through the bus.

use crate::config::RegistryConfig;
use crate::entry::{Entry, LiveEntry};
use crate::error::{RegistryError, RegistryResult};
use crate::mirror::DeviceMirror;
use crate::query::{resolve_key, KeyMode, Query, PATH_SEPARATOR};
use daq_device::{
    device_id, same_device, Device, DeviceClass, DeviceRef, InstantiationBus, SubscriptionId,
};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Upper bound on parent-chain walks, guarding against cyclic hierarchies.
const MAX_HIERARCHY_DEPTH: usize = 64;

/// Key for single-entry removal: a name or the device itself.
#[derive(Clone)]
pub enum DeviceKey {
    /// Registered name
    Name(String),
    /// Device handle, matched by identity
    Device(DeviceRef),
}

impl From<&str> for DeviceKey {
    fn from(name: &str) -> Self {
        DeviceKey::Name(name.to_string())
    }
}

impl From<String> for DeviceKey {
    fn from(name: String) -> Self {
        DeviceKey::Name(name)
    }
}

impl From<DeviceRef> for DeviceKey {
    fn from(device: DeviceRef) -> Self {
        DeviceKey::Device(device)
    }
}

impl From<&DeviceRef> for DeviceKey {
    fn from(device: &DeviceRef) -> Self {
        DeviceKey::Device(device.clone())
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKey::Name(name) => write!(f, "{name:?}"),
            DeviceKey::Device(device) => write!(f, "<{}>", device.name()),
        }
    }
}

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceKey({self})")
    }
}

/// Lookup registry for live devices.
///
/// Always handled through an `Arc`: the bus subscription refers back to the
/// registry weakly and is removed when the last handle is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::builder().bus(&bus).build()?;
/// let m1 = MockMotor::builder("m1").labels(["motors"]).bus(&bus).build();
///
/// let found = registry.find("m1")?;
/// let readback = registry.find("m1.user_readback")?;
/// let motors = registry.findall(Query::new().label("motors"))?;
/// ```
pub struct Registry {
    entries: RwLock<Vec<Entry>>,
    classes: RwLock<Vec<&'static DeviceClass>>,
    auto_register: AtomicBool,
    config: RegistryConfig,
    mirror: Option<Arc<dyn DeviceMirror>>,
    bus: InstantiationBus,
    subscription: SubscriptionId,
}

impl Registry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry on the global bus without a mirror.
    pub fn new(config: RegistryConfig) -> RegistryResult<Arc<Self>> {
        Self::builder().config(config).build()
    }

    fn with_parts(
        config: RegistryConfig,
        bus: InstantiationBus,
        mirror: Option<Arc<dyn DeviceMirror>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Registry>| {
            let hook = weak.clone();
            let subscription = bus.subscribe(move |device| {
                if let Some(registry) = hook.upgrade() {
                    registry.on_instantiated(device);
                }
            });

            Registry {
                entries: RwLock::new(Vec::new()),
                classes: RwLock::new(Vec::new()),
                auto_register: AtomicBool::new(config.auto_register),
                config,
                mirror,
                bus,
                subscription,
            }
        })
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// True if entries are strong holds.
    pub fn keeps_references(&self) -> bool {
        self.config.keep_references
    }

    /// Default timeout for [`Registry::pop_disconnected`].
    pub fn connection_timeout(&self) -> Duration {
        self.config.connection_timeout
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Whether every announced device is captured.
    pub fn auto_register(&self) -> bool {
        self.auto_register.load(Ordering::SeqCst)
    }

    /// Turn implicit capture on or off. Class registrations are unaffected.
    pub fn set_auto_register(&self, enabled: bool) {
        self.auto_register.store(enabled, Ordering::SeqCst);
        tracing::debug!(enabled, "Auto-registration toggled");
    }

    /// Register a device and its already-instantiated sub-components.
    ///
    /// Returns the device unchanged. A device whose name is already
    /// registered replaces the existing entry in place.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidDevice`] if the name is empty or contains
    /// whitespace or the path separator.
    pub fn register(&self, device: DeviceRef) -> RegistryResult<DeviceRef> {
        self.register_with_labels(device, std::iter::empty::<String>())
    }

    /// [`Registry::register`] for a concretely typed handle.
    pub fn register_device<D: Device>(&self, device: Arc<D>) -> RegistryResult<Arc<D>> {
        let handle: DeviceRef = device.clone();
        self.register(handle)?;
        Ok(device)
    }

    /// Register a device with extra labels kept by the registry.
    ///
    /// Extra labels are matched like the device's own labels but are not
    /// written to the device. They apply to this entry only, not to its
    /// sub-components.
    pub fn register_with_labels<I, S>(
        &self,
        device: DeviceRef,
        labels: I,
    ) -> RegistryResult<DeviceRef>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        validate_name(device.name())?;
        let extra: BTreeSet<String> = labels.into_iter().map(Into::into).collect();

        let mut tree = Vec::new();
        collect_tree(&device, &mut tree, &mut HashSet::new());

        let mut batch = Vec::with_capacity(tree.len());
        for (i, member) in tree.iter().enumerate() {
            if i > 0 && validate_name(member.name()).is_err() {
                tracing::trace!(component = %member.name(), "Skipping unnamed sub-component");
                continue;
            }
            if i > 0 && shadows_ancestor(member, &tree[..i]) {
                tracing::trace!(
                    component = %member.name(),
                    "Skipping sub-component named like its parent"
                );
                continue;
            }
            let labels = if i == 0 { extra.clone() } else { BTreeSet::new() };
            batch.push(Entry::new(member, self.config.keep_references, labels));
        }

        let added = self.insert(batch);
        self.mirror_register(&added);
        Ok(device)
    }

    /// Capture every future instance of `class` (or a subclass), regardless
    /// of `auto_register`. Returns the class unchanged.
    pub fn register_class(&self, class: &'static DeviceClass) -> &'static DeviceClass {
        let mut classes = self.classes.write();
        if !classes.iter().any(|c| *c == class) {
            classes.push(class);
            tracing::debug!(class = %class, "Device class registered");
        }
        class
    }

    /// Classes registered with [`Registry::register_class`].
    pub fn registered_classes(&self) -> Vec<&'static DeviceClass> {
        self.classes.read().clone()
    }

    fn on_instantiated(&self, device: &DeviceRef) {
        let classes = self.registered_classes();
        let class_match =
            |dev: &DeviceRef| classes.iter().any(|c| dev.class().is_subclass_of(c));

        if self.auto_register() || class_match(device) {
            self.capture(device);
            return;
        }

        // Sub-components built together with their parent are never announced
        // on their own, so registered classes are matched against them here.
        let mut tree = Vec::new();
        if !classes.is_empty() {
            collect_tree(device, &mut tree, &mut HashSet::new());
        }
        let matching: Vec<DeviceRef> = tree.into_iter().skip(1).filter(|dev| class_match(dev)).collect();
        if matching.is_empty() {
            tracing::trace!(device = %device.name(), "Instantiated device not captured");
            return;
        }
        for member in &matching {
            self.capture(member);
        }
    }

    fn capture(&self, device: &DeviceRef) {
        match self.register(device.clone()) {
            Ok(_) => tracing::trace!(device = %device.name(), "Instantiated device captured"),
            Err(_) => tracing::trace!(device = %device.name(), "Instantiated device has no usable name"),
        }
    }

    /// Insert or replace entries; returns the devices that are new to the
    /// registry (for mirroring).
    fn insert(&self, batch: Vec<Entry>) -> Vec<DeviceRef> {
        let mut added = Vec::new();
        let mut entries = self.entries.write();
        purge(&mut entries);

        for entry in batch {
            let device = match entry.hold.upgrade() {
                Some(device) => device,
                None => continue,
            };
            match entries.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) if existing.hold.id() == entry.hold.id() => {
                    existing.extra_labels.extend(entry.extra_labels);
                    tracing::trace!(device = %entry.name, "Device already registered");
                }
                Some(existing) => {
                    tracing::debug!(device = %entry.name, "Replacing registered device with the same name");
                    *existing = entry;
                    added.push(device);
                }
                None => {
                    tracing::debug!(
                        device = %entry.name,
                        hold = if self.config.keep_references { "strong" } else { "weak" },
                        "Device registered"
                    );
                    entries.push(entry);
                    added.push(device);
                }
            }
        }
        added
    }

    fn mirror_register(&self, devices: &[DeviceRef]) {
        if let Some(mirror) = &self.mirror {
            for device in devices {
                mirror.register(device);
            }
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Live entries, in insertion order. Expired weak holds are purged.
    pub(crate) fn snapshot(&self) -> Vec<LiveEntry> {
        let (live, expired) = {
            let entries = self.entries.read();
            let mut live = Vec::with_capacity(entries.len());
            for entry in entries.iter() {
                if let Some(device) = entry.hold.upgrade() {
                    live.push(LiveEntry {
                        entry: entry.clone(),
                        device,
                    });
                }
            }
            let expired = live.len() != entries.len();
            (live, expired)
        };
        if expired {
            purge(&mut self.entries.write());
        }
        live
    }

    /// Every device matching `query`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ComponentNotFound`] when nothing matches and the
    ///   query does not allow an empty result, or when a dotted path names a
    ///   missing sub-component.
    /// - [`RegistryError::InvalidComponentLabel`] for a label with an empty
    ///   path segment.
    pub fn findall(&self, query: impl Into<Query>) -> RegistryResult<Vec<DeviceRef>> {
        query.into().resolve(&self.snapshot())
    }

    /// Exactly one device matching `query`.
    ///
    /// `allow_none` on the query is ignored; use [`Registry::find_opt`].
    pub fn find(&self, query: impl Into<Query>) -> RegistryResult<DeviceRef> {
        let query = query.into();
        let results = query.clone().allow_none().resolve(&self.snapshot())?;
        single(results, &query)?.ok_or_else(|| RegistryError::not_found(query.to_string()))
    }

    /// At most one device matching `query`.
    pub fn find_opt(&self, query: impl Into<Query>) -> RegistryResult<Option<DeviceRef>> {
        let query = query.into();
        let results = query.clone().allow_none().resolve(&self.snapshot())?;
        single(results, &query)
    }

    /// Dict-style lookup: name first, label if no name matches, dotted
    /// paths allowed. Exactly one result is required.
    pub fn get(&self, key: &str) -> RegistryResult<DeviceRef> {
        let results = resolve_key(&self.snapshot(), key, KeyMode::NameThenLabel)?;
        let query = format!("{key:?}");
        single(results, &query)?.ok_or_else(|| RegistryError::not_found(query))
    }

    /// True if a live entry has this name.
    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().iter().any(|e| e.name() == name)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// True if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All live devices, in insertion order.
    pub fn devices(&self) -> Vec<DeviceRef> {
        self.snapshot().into_iter().map(|e| e.device).collect()
    }

    /// Live devices without a parent. Recomputed on every call.
    pub fn root_devices(&self) -> Vec<DeviceRef> {
        self.devices()
            .into_iter()
            .filter(|d| d.parent().is_none())
            .collect()
    }

    /// Names of every live entry.
    pub fn component_names(&self) -> BTreeSet<String> {
        self.snapshot().into_iter().map(|e| e.entry.name).collect()
    }

    /// Names of the root devices.
    pub fn device_names(&self) -> BTreeSet<String> {
        self.snapshot()
            .into_iter()
            .filter(|e| e.device.parent().is_none())
            .map(|e| e.entry.name)
            .collect()
    }

    /// Effective labels of the entry called `name` (device labels plus
    /// registry-side labels).
    pub fn labels(&self, name: &str) -> RegistryResult<BTreeSet<String>> {
        self.snapshot()
            .into_iter()
            .find(|e| e.name() == name)
            .map(|e| e.entry.labels(&e.device))
            .ok_or_else(|| RegistryError::not_found(format!("{name:?}")))
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove an entry (and its registered descendants).
    pub fn remove(&self, key: impl Into<DeviceKey>) -> RegistryResult<()> {
        self.pop(key).map(|_| ())
    }

    /// Remove an entry (and its registered descendants) and return it.
    ///
    /// # Errors
    ///
    /// [`RegistryError::ComponentNotFound`] if no live entry matches `key`.
    pub fn pop(&self, key: impl Into<DeviceKey>) -> RegistryResult<DeviceRef> {
        let key = key.into();
        let snapshot = self.snapshot();
        let target = snapshot
            .iter()
            .find(|e| match &key {
                DeviceKey::Name(name) => e.name() == name,
                DeviceKey::Device(device) => e.entry.hold.id() == device_id(device),
            })
            .map(|e| e.device.clone())
            .ok_or_else(|| RegistryError::not_found(key.to_string()))?;

        let removed = self.remove_tree(&snapshot, &target);
        tracing::debug!(device = %target.name(), removed, "Device removed");
        Ok(target)
    }

    /// Like [`Registry::pop`], returning `default` when nothing matches.
    pub fn pop_or(&self, key: impl Into<DeviceKey>, default: DeviceRef) -> DeviceRef {
        self.pop(key).unwrap_or(default)
    }

    /// Remove every entry. Bus subscriptions stay active.
    pub fn clear(&self) {
        let count = {
            let mut entries = self.entries.write();
            let count = entries.len();
            entries.clear();
            count
        };
        if let Some(mirror) = &self.mirror {
            mirror.clear();
        }
        tracing::debug!(count, "Registry cleared");
    }

    /// Drop `root` and every entry whose parent chain reaches it; returns
    /// the number of entries removed.
    pub(crate) fn remove_tree(&self, snapshot: &[LiveEntry], root: &DeviceRef) -> usize {
        let root_id = device_id(root);
        let doomed: HashSet<usize> = snapshot
            .iter()
            .filter(|e| descends_from(&e.device, root_id))
            .map(|e| e.entry.hold.id())
            .collect();

        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| !doomed.contains(&e.hold.id()));
        purge(&mut entries);
        before - entries.len()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription);
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.read().len())
            .field("auto_register", &self.auto_register())
            .field("keep_references", &self.config.keep_references)
            .field("mirror", &self.mirror.is_some())
            .finish()
    }
}

/// Builder for [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    bus: Option<InstantiationBus>,
    mirror: Option<Arc<dyn DeviceMirror>>,
}

impl RegistryBuilder {
    /// Registry options (default: [`RegistryConfig::default`])
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Bus to subscribe to (default: the global bus)
    pub fn bus(mut self, bus: &InstantiationBus) -> Self {
        self.bus = Some(bus.clone());
        self
    }

    /// External mirror, used when `use_external_mirror` is set
    pub fn mirror(mut self, mirror: Arc<dyn DeviceMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Validate the configuration and create the registry.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Configuration`] if the configuration is invalid or
    /// `use_external_mirror` is set without a mirror.
    pub fn build(self) -> RegistryResult<Arc<Registry>> {
        self.config.validate()?;
        let mirror = if self.config.use_external_mirror {
            match self.mirror {
                Some(mirror) => Some(mirror),
                None => {
                    return Err(RegistryError::Configuration(
                        "use_external_mirror is set but no mirror was supplied".to_string(),
                    ))
                }
            }
        } else {
            None
        };

        let bus = self.bus.unwrap_or_else(InstantiationBus::global);
        Ok(Registry::with_parts(self.config, bus, mirror))
    }
}

fn validate_name(name: &str) -> RegistryResult<()> {
    if name.is_empty() {
        return Err(RegistryError::InvalidDevice("device name is empty".to_string()));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(RegistryError::InvalidDevice(format!(
            "device name {name:?} contains whitespace"
        )));
    }
    if name.contains(PATH_SEPARATOR) {
        return Err(RegistryError::InvalidDevice(format!(
            "device name {name:?} contains '{PATH_SEPARATOR}'"
        )));
    }
    Ok(())
}

/// Depth-first collection of `device` and its instantiated sub-components.
fn collect_tree(device: &DeviceRef, out: &mut Vec<DeviceRef>, seen: &mut HashSet<usize>) {
    if !seen.insert(device_id(device)) {
        return;
    }
    out.push(device.clone());
    for child in device.children() {
        collect_tree(&child, out, seen);
    }
}

/// True if an ancestor of `member` found in `batch` carries the same name,
/// as readback signals of a motor sometimes do.
fn shadows_ancestor(member: &DeviceRef, batch: &[DeviceRef]) -> bool {
    let mut current = member.parent();
    for _ in 0..MAX_HIERARCHY_DEPTH {
        match current {
            Some(dev) => {
                if dev.name() == member.name() && batch.iter().any(|b| same_device(b, &dev)) {
                    return true;
                }
                current = dev.parent();
            }
            None => return false,
        }
    }
    false
}

/// True if `device` is the device with `ancestor_id` or one of its descendants.
fn descends_from(device: &DeviceRef, ancestor_id: usize) -> bool {
    let mut current = Some(device.clone());
    for _ in 0..MAX_HIERARCHY_DEPTH {
        match current {
            Some(dev) if device_id(&dev) == ancestor_id => return true,
            Some(dev) => current = dev.parent(),
            None => return false,
        }
    }
    false
}

fn purge(entries: &mut Vec<Entry>) {
    let before = entries.len();
    entries.retain(|e| e.hold.is_alive());
    let expired = before - entries.len();
    if expired > 0 {
        tracing::trace!(expired, "Purged expired weak entries");
    }
}

fn single(results: Vec<DeviceRef>, query: &dyn fmt::Display) -> RegistryResult<Option<DeviceRef>> {
    if results.len() > 1 {
        return Err(RegistryError::MultipleComponentsFound {
            query: query.to_string(),
            count: results.len(),
            names: results.iter().map(|d| d.name().to_string()).collect(),
        });
    }
    Ok(results.into_iter().next())
}
