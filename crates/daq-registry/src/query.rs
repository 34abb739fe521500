//! Query model and resolution.
//!
//! A [`Query`] combines optional criteria:
//!
//! | Criterion    | Matches                                                |
//! |--------------|--------------------------------------------------------|
//! | `any_of`     | union of name matches and label matches                |
//! | `name`       | entries with exactly this name                         |
//! | `label`      | entries whose label set contains this label            |
//! | `class`      | devices whose class is (a subclass of) this class      |
//! | `capability` | devices advertising this capability                    |
//!
//! Distinct criteria are intersected by device identity. Key criteria
//! (`any_of`, `name`, `label`) accept dotted paths: the first segment selects
//! registry entries and each remaining segment is resolved with
//! [`Device::component`](daq_device::Device::component), which may
//! instantiate lazy sub-components.

use crate::entry::LiveEntry;
use crate::error::{RegistryError, RegistryResult};
use daq_device::{device_id, Capability, DeviceClass, DeviceRef};
use std::collections::HashSet;
use std::fmt;

/// Path separator for sub-component lookups.
pub const PATH_SEPARATOR: char = '.';

/// What a key criterion is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyMode {
    /// Exact name match.
    Name,
    /// Label membership.
    Label,
    /// Name or label match.
    AnyOf,
    /// Name matches, or label matches if no name matched.
    NameThenLabel,
}

/// A key, a device handle, or a list of either.
#[derive(Clone)]
pub enum DeviceQuery {
    /// Name, label or dotted path.
    Key(String),
    /// An already resolved device, returned as-is.
    Device(DeviceRef),
    /// Union of the results of each element.
    Many(Vec<DeviceQuery>),
}

impl From<&str> for DeviceQuery {
    fn from(key: &str) -> Self {
        DeviceQuery::Key(key.to_string())
    }
}

impl From<String> for DeviceQuery {
    fn from(key: String) -> Self {
        DeviceQuery::Key(key)
    }
}

impl From<DeviceRef> for DeviceQuery {
    fn from(device: DeviceRef) -> Self {
        DeviceQuery::Device(device)
    }
}

impl From<&DeviceRef> for DeviceQuery {
    fn from(device: &DeviceRef) -> Self {
        DeviceQuery::Device(device.clone())
    }
}

impl<T: Into<DeviceQuery>> From<Vec<T>> for DeviceQuery {
    fn from(items: Vec<T>) -> Self {
        DeviceQuery::Many(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for DeviceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceQuery::Key(key) => write!(f, "{key:?}"),
            DeviceQuery::Device(device) => write!(f, "<{}>", device.name()),
            DeviceQuery::Many(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Debug for DeviceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceQuery({self})")
    }
}

/// Search criteria for [`Registry::findall`](crate::Registry::findall) and
/// friends.
///
/// ```rust,ignore
/// let chambers = registry.findall(Query::new().label("ion_chambers"))?;
/// let gain = registry.find("sim_det.cam.gain")?;
/// let movable = registry.findall(Query::new().capability(Capability::Movable).allow_none())?;
/// ```
#[derive(Clone, Default)]
pub struct Query {
    any_of: Option<DeviceQuery>,
    name: Option<String>,
    label: Option<String>,
    class: Option<&'static DeviceClass>,
    capability: Option<Capability>,
    allow_none: bool,
}

impl Query {
    /// Empty query: matches every registered device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match by name or label (or the given devices).
    pub fn any_of(mut self, query: impl Into<DeviceQuery>) -> Self {
        self.any_of = Some(query.into());
        self
    }

    /// Match by exact name (dotted paths allowed).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Match by label (dotted paths allowed).
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Keep only devices of this class or a subclass.
    pub fn class(mut self, class: &'static DeviceClass) -> Self {
        self.class = Some(class);
        self
    }

    /// Keep only devices advertising this capability.
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Return an empty result instead of `ComponentNotFound`.
    pub fn allow_none(mut self) -> Self {
        self.allow_none = true;
        self
    }

    /// Resolve against a snapshot of live entries.
    ///
    /// Must be called without the registry lock held: path segments call
    /// into devices, which may announce new sub-components.
    pub(crate) fn resolve(&self, entries: &[LiveEntry]) -> RegistryResult<Vec<DeviceRef>> {
        let mut sets: Vec<Vec<DeviceRef>> = Vec::new();
        if let Some(any_of) = &self.any_of {
            sets.push(resolve_device_query(entries, any_of)?);
        }
        if let Some(name) = &self.name {
            sets.push(resolve_key(entries, name, KeyMode::Name)?);
        }
        if let Some(label) = &self.label {
            sets.push(resolve_key(entries, label, KeyMode::Label)?);
        }

        let mut candidates = if sets.is_empty() {
            entries.iter().map(|e| e.device.clone()).collect()
        } else {
            intersect(sets)
        };

        if let Some(class) = self.class {
            candidates.retain(|d| d.class().is_subclass_of(class));
        }
        if let Some(capability) = self.capability {
            candidates.retain(|d| d.capabilities().contains(&capability));
        }

        let results = dedup(candidates);
        if results.is_empty() && !self.allow_none {
            return Err(RegistryError::not_found(self.to_string()));
        }
        Ok(results)
    }
}

impl From<&str> for Query {
    fn from(key: &str) -> Self {
        Query::new().any_of(key)
    }
}

impl From<String> for Query {
    fn from(key: String) -> Self {
        Query::new().any_of(key)
    }
}

impl From<DeviceQuery> for Query {
    fn from(query: DeviceQuery) -> Self {
        Query::new().any_of(query)
    }
}

impl From<DeviceRef> for Query {
    fn from(device: DeviceRef) -> Self {
        Query::new().any_of(device)
    }
}

impl From<&DeviceRef> for Query {
    fn from(device: &DeviceRef) -> Self {
        Query::new().any_of(device)
    }
}

impl<T: Into<DeviceQuery>> From<Vec<T>> for Query {
    fn from(items: Vec<T>) -> Self {
        Query::new().any_of(items)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(any_of) = &self.any_of {
            parts.push(format!("any_of={any_of}"));
        }
        if let Some(name) = &self.name {
            parts.push(format!("name={name:?}"));
        }
        if let Some(label) = &self.label {
            parts.push(format!("label={label:?}"));
        }
        if let Some(class) = self.class {
            parts.push(format!("class={class}"));
        }
        if let Some(capability) = self.capability {
            parts.push(format!("capability={}", capability.name()));
        }
        if parts.is_empty() {
            write!(f, "<all>")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query({self}, allow_none={})", self.allow_none)
    }
}

pub(crate) fn resolve_device_query(
    entries: &[LiveEntry],
    query: &DeviceQuery,
) -> RegistryResult<Vec<DeviceRef>> {
    match query {
        DeviceQuery::Key(key) => resolve_key(entries, key, KeyMode::AnyOf),
        DeviceQuery::Device(device) => Ok(vec![device.clone()]),
        DeviceQuery::Many(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(resolve_device_query(entries, item)?);
            }
            Ok(dedup(out))
        }
    }
}

/// Resolve a single (possibly dotted) key.
///
/// Zero matches of the first segment is an empty result; a missing
/// attribute further along the path is `ComponentNotFound` for the whole key.
pub(crate) fn resolve_key(
    entries: &[LiveEntry],
    key: &str,
    mode: KeyMode,
) -> RegistryResult<Vec<DeviceRef>> {
    let segments: Vec<&str> = key.split(PATH_SEPARATOR).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return match mode {
            KeyMode::Label => Err(RegistryError::InvalidComponentLabel(key.to_string())),
            _ => Ok(Vec::new()),
        };
    }
    let (head, attrs) = match segments.split_first() {
        Some(split) => split,
        None => return Ok(Vec::new()),
    };

    let by_name = || -> Vec<DeviceRef> {
        entries
            .iter()
            .filter(|e| e.name() == *head)
            .map(|e| e.device.clone())
            .collect()
    };
    let by_label = || -> Vec<DeviceRef> {
        entries
            .iter()
            .filter(|e| e.has_label(head))
            .map(|e| e.device.clone())
            .collect()
    };

    let roots = match mode {
        KeyMode::Name => by_name(),
        KeyMode::Label => by_label(),
        KeyMode::AnyOf => entries
            .iter()
            .filter(|e| e.name() == *head || e.has_label(head))
            .map(|e| e.device.clone())
            .collect(),
        KeyMode::NameThenLabel => {
            let named = by_name();
            if named.is_empty() {
                by_label()
            } else {
                named
            }
        }
    };

    let mut out = Vec::with_capacity(roots.len());
    for root in roots {
        out.push(walk(root, attrs, key)?);
    }
    Ok(dedup(out))
}

fn walk(root: DeviceRef, attrs: &[&str], full_path: &str) -> RegistryResult<DeviceRef> {
    let mut current = root;
    for attr in attrs {
        current = current
            .component(attr)
            .ok_or_else(|| RegistryError::not_found(format!("{full_path:?}")))?;
    }
    Ok(current)
}

/// Devices present in every set, in the order of the first set.
fn intersect(mut sets: Vec<Vec<DeviceRef>>) -> Vec<DeviceRef> {
    let first = sets.remove(0);
    let others: Vec<HashSet<usize>> = sets
        .iter()
        .map(|set| set.iter().map(device_id).collect())
        .collect();
    first
        .into_iter()
        .filter(|d| others.iter().all(|ids| ids.contains(&device_id(d))))
        .collect()
}

/// Drop repeated devices, keeping the first occurrence.
pub(crate) fn dedup(devices: Vec<DeviceRef>) -> Vec<DeviceRef> {
    let mut seen = HashSet::with_capacity(devices.len());
    devices
        .into_iter()
        .filter(|d| seen.insert(device_id(d)))
        .collect()
}
