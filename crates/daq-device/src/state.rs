//! Shared device bookkeeping.
//!
//! Concrete devices embed a [`DeviceCore`] and delegate the registry-facing
//! parts of [`Device`](crate::Device) to it:
//!
//! ```rust,ignore
//! impl Device for PowerMeter {
//!     fn name(&self) -> &str { self.core.name() }
//!     fn labels(&self) -> BTreeSet<String> { self.core.labels() }
//!     fn parent(&self) -> Option<DeviceRef> { self.core.parent() }
//!     fn is_connected(&self) -> bool { self.core.connection().is_connected() }
//!     // ...
//! }
//! ```

use crate::device::{DeviceRef, WeakDeviceRef};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use tokio::sync::watch;

/// Connection flag that async waiters can suspend on.
///
/// Backed by a `watch` channel, so [`ConnectionState::wait_connected`] wakes
/// exactly when the flag flips instead of polling.
#[derive(Debug)]
pub struct ConnectionState {
    tx: watch::Sender<bool>,
}

impl ConnectionState {
    /// Create a connection flag with an initial value.
    pub fn new(connected: bool) -> Self {
        let (tx, _rx) = watch::channel(connected);
        Self { tx }
    }

    /// Current value
    pub fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the flag and wake any waiters.
    pub fn set_connected(&self, connected: bool) {
        self.tx.send_replace(connected);
    }

    /// Resolve once the flag is `true`.
    pub async fn wait_connected(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|connected| *connected).await;
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Name, labels, parent link and connection state of a device.
#[derive(Debug)]
pub struct DeviceCore {
    name: String,
    labels: RwLock<BTreeSet<String>>,
    parent: Option<WeakDeviceRef>,
    connection: ConnectionState,
}

impl DeviceCore {
    /// Root device core, initially connected.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: RwLock::new(BTreeSet::new()),
            parent: None,
            connection: ConnectionState::default(),
        }
    }

    /// Attach initial labels.
    pub fn with_labels<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.labels.write() = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Link to an owning device.
    pub fn with_parent(mut self, parent: WeakDeviceRef) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the initial connection state.
    pub fn with_connected(mut self, connected: bool) -> Self {
        self.connection = ConnectionState::new(connected);
        self
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the label set
    pub fn labels(&self) -> BTreeSet<String> {
        self.labels.read().clone()
    }

    /// Add a label; returns false if it was already present.
    pub fn add_label(&self, label: impl Into<String>) -> bool {
        self.labels.write().insert(label.into())
    }

    /// Remove a label; returns false if it was absent.
    pub fn remove_label(&self, label: &str) -> bool {
        self.labels.write().remove(label)
    }

    /// Owning device, if it is still alive.
    pub fn parent(&self) -> Option<DeviceRef> {
        self.parent.as_ref().and_then(|p| p.upgrade())
    }

    /// Connection flag
    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_labels_are_mutable_through_shared_ref() {
        let core = DeviceCore::new("I0").with_labels(["ion_chambers"]);
        assert!(core.labels().contains("ion_chambers"));

        assert!(core.add_label("detectors"));
        assert!(!core.add_label("detectors"));
        assert!(core.remove_label("ion_chambers"));
        assert_eq!(
            core.labels().into_iter().collect::<Vec<_>>(),
            vec!["detectors".to_string()]
        );
    }

    #[test]
    fn test_root_core_has_no_parent() {
        let core = DeviceCore::new("m1");
        assert!(core.parent().is_none());
        assert_eq!(core.name(), "m1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_connected_wakes_on_flip() {
        let state = Arc::new(ConnectionState::new(false));
        assert!(!state.is_connected());

        let setter = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            setter.set_connected(true);
        });

        let result =
            tokio::time::timeout(Duration::from_millis(300), state.wait_connected()).await;
        assert!(result.is_ok());
        assert!(state.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_connected_times_out_when_offline() {
        let state = ConnectionState::new(false);
        let result =
            tokio::time::timeout(Duration::from_millis(100), state.wait_connected()).await;
        assert!(result.is_err());
    }
}
