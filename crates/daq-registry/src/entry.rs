//! Registry entries and their hold strength.

use daq_device::{device_id, DeviceRef, WeakDeviceRef};
use std::collections::BTreeSet;
use std::sync::Arc;

/// How an entry keeps its device.
#[derive(Clone)]
pub(crate) enum Hold {
    /// The registry is an owner; the device lives at least as long as the entry.
    Strong(DeviceRef),
    /// The registry only observes; the entry expires with the last outside owner.
    Weak(WeakDeviceRef),
}

impl Hold {
    pub(crate) fn new(device: &DeviceRef, keep_references: bool) -> Self {
        if keep_references {
            Hold::Strong(device.clone())
        } else {
            Hold::Weak(Arc::downgrade(device))
        }
    }

    /// The live device, or `None` once a weak hold has expired.
    pub(crate) fn upgrade(&self) -> Option<DeviceRef> {
        match self {
            Hold::Strong(device) => Some(device.clone()),
            Hold::Weak(weak) => weak.upgrade(),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        match self {
            Hold::Strong(_) => true,
            Hold::Weak(weak) => weak.strong_count() > 0,
        }
    }

    /// Identity of the held device; stable even after a weak hold expires.
    pub(crate) fn id(&self) -> usize {
        match self {
            Hold::Strong(device) => device_id(device),
            Hold::Weak(weak) => weak.as_ptr() as *const () as usize,
        }
    }
}

/// One registered device.
///
/// The name is captured at registration time and used as the map key; labels
/// are read through to the live device on every query, with `extra_labels`
/// added on top.
#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) name: String,
    pub(crate) hold: Hold,
    pub(crate) extra_labels: BTreeSet<String>,
}

impl Entry {
    pub(crate) fn new(
        device: &DeviceRef,
        keep_references: bool,
        extra_labels: BTreeSet<String>,
    ) -> Self {
        Self {
            name: device.name().to_string(),
            hold: Hold::new(device, keep_references),
            extra_labels,
        }
    }

    /// Device labels plus registry-side labels.
    pub(crate) fn labels(&self, device: &DeviceRef) -> BTreeSet<String> {
        let mut labels = device.labels();
        labels.extend(self.extra_labels.iter().cloned());
        labels
    }

    pub(crate) fn has_label(&self, device: &DeviceRef, label: &str) -> bool {
        self.extra_labels.contains(label) || device.has_label(label)
    }
}

/// A live snapshot of an entry, taken under the registry lock and used after
/// it is released.
#[derive(Clone)]
pub(crate) struct LiveEntry {
    pub(crate) entry: Entry,
    pub(crate) device: DeviceRef,
}

impl LiveEntry {
    pub(crate) fn name(&self) -> &str {
        &self.entry.name
    }

    pub(crate) fn has_label(&self, label: &str) -> bool {
        self.entry.has_label(&self.device, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_device::{Device, DeviceClass, DEVICE};

    struct Bare;

    impl Device for Bare {
        fn name(&self) -> &str {
            "bare"
        }

        fn labels(&self) -> BTreeSet<String> {
            BTreeSet::from(["motors".to_string()])
        }

        fn parent(&self) -> Option<DeviceRef> {
            None
        }

        fn class(&self) -> &'static DeviceClass {
            &DEVICE
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_weak_hold_expires() {
        let device: DeviceRef = Arc::new(Bare);
        let id = device_id(&device);
        let hold = Hold::new(&device, false);

        assert!(hold.is_alive());
        assert_eq!(hold.id(), id);

        drop(device);
        assert!(!hold.is_alive());
        assert!(hold.upgrade().is_none());
        assert_eq!(hold.id(), id);
    }

    #[test]
    fn test_strong_hold_keeps_device() {
        let device: DeviceRef = Arc::new(Bare);
        let hold = Hold::new(&device, true);
        drop(device);
        assert_eq!(hold.upgrade().map(|d| d.name().to_string()), Some("bare".into()));
    }

    #[test]
    fn test_extra_labels_union() {
        let device: DeviceRef = Arc::new(Bare);
        let entry = Entry::new(&device, true, BTreeSet::from(["stages".to_string()]));

        assert!(entry.has_label(&device, "motors"));
        assert!(entry.has_label(&device, "stages"));
        assert_eq!(entry.labels(&device).len(), 2);
    }
}
