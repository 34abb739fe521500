//! Construction hook for devices.
//!
//! Every concrete device constructor finishes by calling [`instantiate`], which
//! announces the new device on an [`InstantiationBus`]. Registries subscribe to
//! the bus to implement implicit capture and class-level registration, so the
//! device crates never depend on the registry.
//!
//! ```text
//!  MockMotor::build() ──┐
//!  MockSignal::build() ─┼──▶ InstantiationBus::publish ──▶ subscriber callbacks
//!  lazy `cam` access ───┘                                   (Registry, loggers, ...)
//! ```
//!
//! A process-wide bus is available through [`InstantiationBus::global`].
//! Isolated buses ([`InstantiationBus::new`]) keep independent registries (and
//! parallel tests) from observing each other's devices.

use crate::device::{Device, DeviceRef};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked for every published device.
pub type InstantiationCallback = Arc<dyn Fn(&DeviceRef) + Send + Sync>;

static GLOBAL_BUS: Lazy<InstantiationBus> = Lazy::new(InstantiationBus::new);

/// Handle returned by [`InstantiationBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, InstantiationCallback)>>,
}

/// Publish/subscribe dispatcher for device construction.
///
/// Cloning is cheap; clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct InstantiationBus {
    inner: Arc<BusInner>,
}

impl InstantiationBus {
    /// Create an isolated bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide bus.
    pub fn global() -> InstantiationBus {
        GLOBAL_BUS.clone()
    }

    /// Register a callback for every device published from now on.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceRef) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .subscribers
            .write()
            .push((id, Arc::new(callback)));
        tracing::trace!(subscription = id.0, "Instantiation subscriber added");
        id
    }

    /// Remove a callback; returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        before != subscribers.len()
    }

    /// Notify every subscriber that `device` was constructed.
    ///
    /// Callbacks run on the caller's thread, outside the bus lock, so they may
    /// build further devices or (un)subscribe.
    pub fn publish(&self, device: &DeviceRef) {
        let callbacks: Vec<InstantiationCallback> = self
            .inner
            .subscribers
            .read()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        tracing::trace!(
            device = %device.name(),
            subscribers = callbacks.len(),
            "Device instantiated"
        );

        for callback in callbacks {
            callback(device);
        }
    }

    /// Number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// True if both handles refer to the same bus.
    pub fn same_bus(&self, other: &InstantiationBus) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for InstantiationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstantiationBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Announce a freshly constructed device on `bus` and hand it back.
pub fn instantiate<D: Device>(bus: &InstantiationBus, device: Arc<D>) -> Arc<D> {
    let handle: DeviceRef = device.clone();
    bus.publish(&handle);
    device
}
