//! Shared fixtures for registry integration tests.
//!
//! - `Beamline`: an isolated bus, a registry on it, and a handful of mock
//!   devices that the tests keep alive
//! - `RecordingMirror`: a `DeviceMirror` that records every call

#![allow(dead_code)] // Not every test file uses every fixture

use daq_device::{DeviceRef, InstantiationBus};
use daq_driver_mock::{MockAreaDetector, MockMotor, MockSignal};
use daq_registry::{DeviceMirror, Registry, RegistryConfig};
use parking_lot::Mutex;
use std::sync::Arc;

/// Calls seen by a [`RecordingMirror`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    Register(String),
    Clear,
}

#[derive(Debug, Default)]
pub struct RecordingMirror {
    events: Mutex<Vec<MirrorEvent>>,
}

impl RecordingMirror {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<MirrorEvent> {
        self.events.lock().clone()
    }

    pub fn registered(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MirrorEvent::Register(name) => Some(name),
                MirrorEvent::Clear => None,
            })
            .collect()
    }
}

impl DeviceMirror for RecordingMirror {
    fn register(&self, device: &DeviceRef) {
        self.events
            .lock()
            .push(MirrorEvent::Register(device.name().to_string()));
    }

    fn clear(&self) {
        self.events.lock().push(MirrorEvent::Clear);
    }
}

/// Registry on a private bus, so tests running in parallel stay independent.
pub fn registry_on(bus: &InstantiationBus, config: RegistryConfig) -> Arc<Registry> {
    Registry::builder()
        .config(config)
        .bus(bus)
        .build()
        .expect("registry config is valid")
}

/// Simulated beamline: two motors, two ion chambers and an area detector.
pub struct Beamline {
    pub bus: InstantiationBus,
    pub registry: Arc<Registry>,
    pub m1: Arc<MockMotor>,
    pub m2: Arc<MockMotor>,
    pub i0: Arc<MockSignal>,
    pub it: Arc<MockSignal>,
    pub sim_det: Arc<MockAreaDetector>,
}

impl Beamline {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let bus = InstantiationBus::new();
        let registry = registry_on(&bus, config);
        Self {
            m1: MockMotor::builder("m1").labels(["motors"]).bus(&bus).build(),
            m2: MockMotor::builder("m2").labels(["motors"]).bus(&bus).build(),
            i0: MockSignal::builder("I0")
                .labels(["ion_chambers"])
                .bus(&bus)
                .build(),
            it: MockSignal::builder("It")
                .labels(["ion_chambers"])
                .bus(&bus)
                .build(),
            sim_det: MockAreaDetector::builder("sim_det")
                .labels(["detectors"])
                .bus(&bus)
                .build(),
            registry,
            bus,
        }
    }

    pub fn ion_chamber(&self, name: &str) -> Arc<MockSignal> {
        MockSignal::builder(name)
            .labels(["ion_chambers"])
            .bus(&self.bus)
            .build()
    }
}

pub fn names(devices: &[DeviceRef]) -> Vec<String> {
    devices.iter().map(|d| d.name().to_string()).collect()
}

pub fn dev_ref<D: daq_device::Device>(device: &Arc<D>) -> DeviceRef {
    device.clone()
}
