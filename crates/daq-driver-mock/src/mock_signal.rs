//! Mock scalar signal.

use async_trait::async_trait;
use daq_device::{
    instantiate, Capability, Device, DeviceClass, DeviceCore, DeviceRef, InstantiationBus,
    WeakDeviceRef, SIGNAL,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Class of [`MockSignal`]
pub static MOCK_SIGNAL: DeviceClass = DeviceClass::derived("MockSignal", &SIGNAL);

static MOCK_SIGNAL_CAPABILITIES: &[Capability] = &[Capability::Readable, Capability::Settable];

/// Simulated scalar read/write point (ion chamber, readback, gain, ...).
#[derive(Debug)]
pub struct MockSignal {
    core: DeviceCore,
    value: Mutex<f64>,
}

impl MockSignal {
    /// Start building a signal called `name`.
    pub fn builder(name: impl Into<String>) -> MockSignalBuilder {
        MockSignalBuilder {
            name: name.into(),
            labels: Vec::new(),
            value: 0.0,
            connected: true,
            bus: None,
        }
    }

    /// Current value
    pub fn get(&self) -> f64 {
        *self.value.lock()
    }

    /// Store a new value
    pub fn set(&self, value: f64) {
        *self.value.lock() = value;
    }

    /// Flip the simulated connection state.
    pub fn set_connected(&self, connected: bool) {
        self.core.connection().set_connected(connected);
    }

    /// Shared device state (labels can be edited through it)
    pub fn core(&self) -> &DeviceCore {
        &self.core
    }

    /// Build a signal owned by another device; not announced on any bus.
    pub(crate) fn child(name: String, parent: WeakDeviceRef, value: f64) -> Arc<Self> {
        Arc::new(Self {
            core: DeviceCore::new(name).with_parent(parent),
            value: Mutex::new(value),
        })
    }
}

#[async_trait]
impl Device for MockSignal {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn labels(&self) -> BTreeSet<String> {
        self.core.labels()
    }

    fn parent(&self) -> Option<DeviceRef> {
        self.core.parent()
    }

    fn class(&self) -> &'static DeviceClass {
        &MOCK_SIGNAL
    }

    fn capabilities(&self) -> &[Capability] {
        MOCK_SIGNAL_CAPABILITIES
    }

    fn is_connected(&self) -> bool {
        self.core.connection().is_connected()
    }

    async fn wait_for_connection(&self) {
        self.core.connection().wait_connected().await;
    }
}

/// Builder for [`MockSignal`]
#[derive(Debug)]
pub struct MockSignalBuilder {
    name: String,
    labels: Vec<String>,
    value: f64,
    connected: bool,
    bus: Option<InstantiationBus>,
}

impl MockSignalBuilder {
    /// Initial labels
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Initial value (default: 0.0)
    pub fn value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    /// Initial connection state (default: connected)
    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    /// Bus to announce the signal on (default: the global bus)
    pub fn bus(mut self, bus: &InstantiationBus) -> Self {
        self.bus = Some(bus.clone());
        self
    }

    /// Construct the signal and announce it.
    pub fn build(self) -> Arc<MockSignal> {
        let bus = self.bus.unwrap_or_else(InstantiationBus::global);
        let signal = Arc::new(MockSignal {
            core: DeviceCore::new(self.name)
                .with_labels(self.labels)
                .with_connected(self.connected),
            value: Mutex::new(self.value),
        });
        instantiate(&bus, signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_builder_defaults() {
        let bus = InstantiationBus::new();
        let sig = MockSignal::builder("I0")
            .labels(["ion_chambers"])
            .value(1.5)
            .bus(&bus)
            .build();

        assert_eq!(sig.name(), "I0");
        assert!(sig.has_label("ion_chambers"));
        assert_eq!(sig.get(), 1.5);
        assert!(sig.is_connected());
        assert!(sig.parent().is_none());
        assert!(sig.class().is_subclass_of(&SIGNAL));
    }

    #[test]
    fn test_build_announces_on_bus() {
        let bus = InstantiationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(move |dev| sink.lock().push(dev.name().to_string()));

        MockSignal::builder("It").bus(&bus).build();
        assert_eq!(*seen.lock(), vec!["It".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_connection() {
        let bus = InstantiationBus::new();
        let sig = MockSignal::builder("late").connected(false).bus(&bus).build();

        let flipper = sig.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            flipper.set_connected(true);
        });

        let waited =
            tokio::time::timeout(Duration::from_millis(300), sig.wait_for_connection()).await;
        assert!(waited.is_ok());
    }
}
