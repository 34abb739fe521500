//! External mirror side effects.

mod common;

use common::{dev_ref, MirrorEvent, RecordingMirror};
use daq_device::InstantiationBus;
use daq_driver_mock::{MockMotor, MockSignal};
use daq_registry::{Registry, RegistryConfig};

fn mirrored(bus: &InstantiationBus, mirror: &std::sync::Arc<RecordingMirror>) -> std::sync::Arc<Registry> {
    Registry::builder()
        .config(RegistryConfig::default().with_external_mirror(true))
        .bus(bus)
        .mirror(mirror.clone())
        .build()
        .unwrap()
}

#[test]
fn registrations_and_clear_are_mirrored() {
    let bus = InstantiationBus::new();
    let mirror = RecordingMirror::new();
    let registry = mirrored(&bus, &mirror);

    let _i0 = MockSignal::builder("I0").bus(&bus).build();
    let _m1 = MockMotor::builder("m1").bus(&bus).build();
    registry.clear();

    assert_eq!(
        mirror.events(),
        vec![
            MirrorEvent::Register("I0".into()),
            MirrorEvent::Register("m1".into()),
            MirrorEvent::Register("m1_user_readback".into()),
            MirrorEvent::Register("m1_user_setpoint".into()),
            MirrorEvent::Register("m1_acceleration".into()),
            MirrorEvent::Clear,
        ]
    );
}

#[test]
fn reregistering_the_same_device_is_not_mirrored_twice() {
    let bus = InstantiationBus::new();
    let mirror = RecordingMirror::new();
    let registry = mirrored(&bus, &mirror);

    let i0 = MockSignal::builder("I0").bus(&bus).build();
    registry.register(dev_ref(&i0)).unwrap();

    assert_eq!(mirror.registered(), ["I0"]);
}

#[test]
fn mirror_unused_when_flag_is_off() {
    let bus = InstantiationBus::new();
    let mirror = RecordingMirror::new();
    let registry = Registry::builder()
        .bus(&bus)
        .mirror(mirror.clone())
        .build()
        .unwrap();

    let _i0 = MockSignal::builder("I0").bus(&bus).build();
    registry.clear();

    assert!(registry.is_empty());
    assert!(mirror.events().is_empty());
}
