//! Integration tests for the mock device set
//!
//! Checks the hierarchy and announcement behaviour the registry relies on,
//! across all three mock device kinds.

use daq_device::{same_device, Device, DeviceRef, InstantiationBus, DEVICE, SIGNAL};
use daq_driver_mock::*;
use parking_lot::Mutex;
use std::sync::Arc;

fn recording_bus() -> (InstantiationBus, Arc<Mutex<Vec<String>>>) {
    let bus = InstantiationBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(move |dev| sink.lock().push(dev.name().to_string()));
    (bus, seen)
}

/// Every builder announces exactly the device it built
#[test]
fn test_all_devices_announce_themselves() {
    let (bus, seen) = recording_bus();

    let _signal = MockSignal::builder("I0").bus(&bus).build();
    let _motor = MockMotor::builder("m1").bus(&bus).build();
    let _det = MockAreaDetector::builder("sim_det").bus(&bus).build();

    assert_eq!(*seen.lock(), ["I0", "m1", "sim_det"]);
}

/// Lazy components are announced on first access only
#[test]
fn test_dotted_walk_announces_lazy_cam() {
    let (bus, seen) = recording_bus();
    let det: DeviceRef = MockAreaDetector::builder("sim_det").bus(&bus).build();

    let gain = det
        .component("cam")
        .and_then(|cam| cam.component("gain"))
        .unwrap();
    let again = det
        .component("cam")
        .and_then(|cam| cam.component("gain"))
        .unwrap();

    assert!(same_device(&gain, &again));
    assert_eq!(*seen.lock(), ["sim_det", "sim_det_cam"]);
}

/// Parent links walk back up to the root
#[test]
fn test_hierarchy_is_consistent() {
    let bus = InstantiationBus::new();
    let det = MockAreaDetector::builder("sim_det").bus(&bus).build();
    let root: DeviceRef = det.clone();

    let cam = det.cam();
    let gain: DeviceRef = cam.gain().clone();
    let cam_ref = gain.parent().unwrap();
    assert_eq!(cam_ref.name(), "sim_det_cam");
    assert!(same_device(&cam_ref.parent().unwrap(), &root));
    assert!(root.parent().is_none());
}

/// Classes line up with the built-in hierarchy
#[test]
fn test_classes() {
    let bus = InstantiationBus::new();
    let signal = MockSignal::builder("I0").bus(&bus).build();
    let motor = MockMotor::builder("m1").bus(&bus).build();
    let det = MockAreaDetector::builder("sim_det").bus(&bus).build();

    assert!(signal.class().is_subclass_of(&SIGNAL));
    assert!(motor.class().is_subclass_of(&MOTOR));
    assert!(!motor.class().is_subclass_of(&SIGNAL));
    assert!(det.class().is_subclass_of(&AREA_DETECTOR));
    assert!(det.cam().class().is_subclass_of(&DEVICE));
    assert_eq!(det.cam().class(), &CAM_PLUGIN);
}
