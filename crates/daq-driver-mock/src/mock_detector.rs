//! Mock area detector with a lazily instantiated `cam` plugin.
//!
//! The `cam` sub-device (and its `gain` / `acquire_time` signals) does not
//! exist until something asks for it through [`Device::component`]. Dotted
//! registry lookups such as `"sim_det.cam.gain"` therefore build it as a side
//! effect, which [`MockAreaDetector::is_cam_instantiated`] lets tests observe.

use crate::mock_signal::MockSignal;
use async_trait::async_trait;
use daq_device::{
    instantiate, Capability, Device, DeviceClass, DeviceCore, DeviceRef, InstantiationBus,
    WeakDeviceRef, DEVICE,
};
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

/// Any area detector
pub static AREA_DETECTOR: DeviceClass = DeviceClass::derived("AreaDetector", &DEVICE);

/// Class of [`MockAreaDetector`]
pub static MOCK_AREA_DETECTOR: DeviceClass =
    DeviceClass::derived("MockAreaDetector", &AREA_DETECTOR);

/// Class of [`MockCam`]
pub static CAM_PLUGIN: DeviceClass = DeviceClass::derived("CamPlugin", &DEVICE);

static DETECTOR_CAPABILITIES: &[Capability] = &[
    Capability::Triggerable,
    Capability::Stageable,
    Capability::FrameProducer,
];

/// Simulated area detector.
#[derive(Debug)]
pub struct MockAreaDetector {
    core: DeviceCore,
    this: Weak<MockAreaDetector>,
    bus: InstantiationBus,
    cam: OnceCell<Arc<MockCam>>,
}

impl MockAreaDetector {
    /// Start building a detector called `name`.
    pub fn builder(name: impl Into<String>) -> MockAreaDetectorBuilder {
        MockAreaDetectorBuilder {
            name: name.into(),
            labels: Vec::new(),
            connected: true,
            bus: None,
        }
    }

    /// True once `cam` has been built.
    pub fn is_cam_instantiated(&self) -> bool {
        self.cam.get().is_some()
    }

    /// The `cam` plugin, building it on first access.
    pub fn cam(&self) -> Arc<MockCam> {
        let mut created = false;
        let cam = self
            .cam
            .get_or_init(|| {
                created = true;
                let parent: WeakDeviceRef = self.this.clone();
                MockCam::new(format!("{}_cam", self.core.name()), parent)
            })
            .clone();

        if created {
            tracing::debug!(detector = %self.core.name(), "Lazy cam plugin instantiated");
            instantiate(&self.bus, cam.clone());
        }
        cam
    }

    /// Flip the simulated connection state.
    pub fn set_connected(&self, connected: bool) {
        self.core.connection().set_connected(connected);
    }

    /// Shared device state
    pub fn core(&self) -> &DeviceCore {
        &self.core
    }
}

#[async_trait]
impl Device for MockAreaDetector {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn labels(&self) -> BTreeSet<String> {
        self.core.labels()
    }

    fn parent(&self) -> Option<DeviceRef> {
        self.core.parent()
    }

    fn children(&self) -> Vec<DeviceRef> {
        self.cam
            .get()
            .map(|cam| vec![cam.clone() as DeviceRef])
            .unwrap_or_default()
    }

    fn component(&self, attr: &str) -> Option<DeviceRef> {
        match attr {
            "cam" => Some(self.cam() as DeviceRef),
            _ => None,
        }
    }

    fn class(&self) -> &'static DeviceClass {
        &MOCK_AREA_DETECTOR
    }

    fn capabilities(&self) -> &[Capability] {
        DETECTOR_CAPABILITIES
    }

    fn is_connected(&self) -> bool {
        self.core.connection().is_connected()
    }

    async fn wait_for_connection(&self) {
        self.core.connection().wait_connected().await;
    }
}

/// Builder for [`MockAreaDetector`]
#[derive(Debug)]
pub struct MockAreaDetectorBuilder {
    name: String,
    labels: Vec<String>,
    connected: bool,
    bus: Option<InstantiationBus>,
}

impl MockAreaDetectorBuilder {
    /// Initial labels
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Initial connection state (default: connected)
    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    /// Bus to announce the detector (and its lazy plugins) on
    pub fn bus(mut self, bus: &InstantiationBus) -> Self {
        self.bus = Some(bus.clone());
        self
    }

    /// Construct the detector and announce it. `cam` is not built yet.
    pub fn build(self) -> Arc<MockAreaDetector> {
        let bus = self.bus.unwrap_or_else(InstantiationBus::global);
        let detector = Arc::new_cyclic(|weak| MockAreaDetector {
            core: DeviceCore::new(self.name)
                .with_labels(self.labels)
                .with_connected(self.connected),
            this: weak.clone(),
            bus: bus.clone(),
            cam: OnceCell::new(),
        });
        instantiate(&bus, detector)
    }
}

/// Camera plugin of a [`MockAreaDetector`].
#[derive(Debug)]
pub struct MockCam {
    core: DeviceCore,
    gain: Arc<MockSignal>,
    acquire_time: Arc<MockSignal>,
}

impl MockCam {
    fn new(name: String, parent: WeakDeviceRef) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<MockCam>| {
            let this: WeakDeviceRef = weak.clone();
            MockCam {
                gain: MockSignal::child(format!("{name}_gain"), this.clone(), 1.0),
                acquire_time: MockSignal::child(format!("{name}_acquire_time"), this, 0.1),
                core: DeviceCore::new(name.clone()).with_parent(parent),
            }
        })
    }

    /// Gain signal
    pub fn gain(&self) -> &Arc<MockSignal> {
        &self.gain
    }

    /// Exposure time signal, in seconds
    pub fn acquire_time(&self) -> &Arc<MockSignal> {
        &self.acquire_time
    }
}

#[async_trait]
impl Device for MockCam {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn labels(&self) -> BTreeSet<String> {
        self.core.labels()
    }

    fn parent(&self) -> Option<DeviceRef> {
        self.core.parent()
    }

    fn children(&self) -> Vec<DeviceRef> {
        vec![
            self.gain.clone() as DeviceRef,
            self.acquire_time.clone() as DeviceRef,
        ]
    }

    fn component(&self, attr: &str) -> Option<DeviceRef> {
        match attr {
            "gain" => Some(self.gain.clone() as DeviceRef),
            "acquire_time" => Some(self.acquire_time.clone() as DeviceRef),
            _ => None,
        }
    }

    fn class(&self) -> &'static DeviceClass {
        &CAM_PLUGIN
    }

    fn is_connected(&self) -> bool {
        self.parent().map(|p| p.is_connected()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_cam_is_lazy() {
        let bus = InstantiationBus::new();
        let det = MockAreaDetector::builder("sim_det").bus(&bus).build();

        assert!(!det.is_cam_instantiated());
        assert!(det.children().is_empty());

        let gain = det
            .component("cam")
            .and_then(|cam| cam.component("gain"))
            .unwrap();
        assert_eq!(gain.name(), "sim_det_cam_gain");
        assert!(det.is_cam_instantiated());
        assert_eq!(det.children().len(), 1);
    }

    #[test]
    fn test_cam_announced_once() {
        let bus = InstantiationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(move |dev| sink.lock().push(dev.name().to_string()));

        let det = MockAreaDetector::builder("sim_det").bus(&bus).build();
        det.cam();
        det.cam();

        assert_eq!(
            *seen.lock(),
            vec!["sim_det".to_string(), "sim_det_cam".to_string()]
        );
    }

    #[test]
    fn test_cam_connection_follows_detector() {
        let bus = InstantiationBus::new();
        let det = MockAreaDetector::builder("sim_det").bus(&bus).build();
        let cam = det.cam();
        assert!(cam.is_connected());

        det.set_connected(false);
        assert!(!cam.is_connected());
    }
}
