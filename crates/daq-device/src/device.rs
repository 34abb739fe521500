//! The `Device` trait: what the registry needs from a hardware-control object.

use crate::class::{Capability, DeviceClass};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Shared handle to a live device.
pub type DeviceRef = Arc<dyn Device>;

/// Non-owning handle to a device.
pub type WeakDeviceRef = Weak<dyn Device>;

/// Interval used by the default [`Device::wait_for_connection`] poll loop.
const CONNECTION_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A hardware-control object tracked by the registry.
///
/// Implementations are expected to be cheap to query: the registry reads
/// `name`, `labels` and `parent` on every lookup instead of caching them, so
/// out-of-band label or hierarchy changes are always visible.
///
/// # Thread Safety
///
/// Devices are shared as `Arc<dyn Device>` across tasks and must be
/// `Send + Sync`.
#[async_trait]
pub trait Device: Send + Sync + 'static {
    /// Unique name, used as the primary lookup key.
    fn name(&self) -> &str;

    /// Current label set.
    fn labels(&self) -> BTreeSet<String>;

    /// Owning device, or `None` for a root device.
    fn parent(&self) -> Option<DeviceRef>;

    /// Sub-components that already exist.
    ///
    /// Lazy components that have not been instantiated yet are not listed.
    fn children(&self) -> Vec<DeviceRef> {
        Vec::new()
    }

    /// Attribute-style access to a sub-component.
    ///
    /// **May instantiate**: a lazy component is built on first access, which
    /// also announces it on the device's instantiation bus.
    fn component(&self, _attr: &str) -> Option<DeviceRef> {
        None
    }

    /// Device class, used for type filters and class-level registration.
    fn class(&self) -> &'static DeviceClass;

    /// Capabilities this device supports.
    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    /// Non-blocking connectivity check.
    fn is_connected(&self) -> bool;

    /// Resolve once the device reports connected.
    ///
    /// Never resolves for a device that stays offline; callers bound it with a
    /// timeout. The default implementation polls [`Device::is_connected`].
    async fn wait_for_connection(&self) {
        while !self.is_connected() {
            tokio::time::sleep(CONNECTION_POLL_INTERVAL).await;
        }
    }

    /// True if `label` is in the current label set.
    fn has_label(&self, label: &str) -> bool {
        self.labels().contains(label)
    }
}

impl fmt::Debug for dyn Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device({})", self.name())
    }
}

/// Address of the device behind a handle, usable as an identity key.
pub fn device_id(device: &DeviceRef) -> usize {
    Arc::as_ptr(device) as *const () as usize
}

/// Identity comparison for device handles.
///
/// Compares data pointers only, so two handles to the same object are equal
/// even if their vtable pointers differ.
pub fn same_device(a: &DeviceRef, b: &DeviceRef) -> bool {
    device_id(a) == device_id(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::DEVICE;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Probe {
        connected: AtomicBool,
    }

    impl Device for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn labels(&self) -> BTreeSet<String> {
            BTreeSet::from(["detectors".to_string()])
        }

        fn parent(&self) -> Option<DeviceRef> {
            None
        }

        fn class(&self) -> &'static DeviceClass {
            &DEVICE
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_identity() {
        let a: DeviceRef = Arc::new(Probe {
            connected: AtomicBool::new(true),
        });
        let b = a.clone();
        let c: DeviceRef = Arc::new(Probe {
            connected: AtomicBool::new(true),
        });

        assert!(same_device(&a, &b));
        assert!(!same_device(&a, &c));
    }

    #[test]
    fn test_default_methods() {
        let probe = Probe {
            connected: AtomicBool::new(false),
        };
        assert!(probe.has_label("detectors"));
        assert!(!probe.has_label("motors"));
        assert!(probe.children().is_empty());
        assert!(probe.component("cam").is_none());
        assert!(probe.capabilities().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_wait_for_connection_polls() {
        let probe = Arc::new(Probe {
            connected: AtomicBool::new(false),
        });

        let flipper = probe.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flipper.connected.store(true, Ordering::SeqCst);
        });

        let waited =
            tokio::time::timeout(Duration::from_millis(200), probe.wait_for_connection()).await;
        assert!(waited.is_ok());
    }
}
