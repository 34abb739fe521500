//! Mock motor with eager child signals.
//!
//! Mirrors the shape of an EPICS motor record: the motor itself plus
//! `user_readback`, `user_setpoint` and `acceleration` sub-components named
//! `<motor>_user_readback` and so on.

use crate::mock_signal::MockSignal;
use async_trait::async_trait;
use daq_device::{
    instantiate, Capability, Device, DeviceClass, DeviceCore, DeviceRef, InstantiationBus,
    WeakDeviceRef, DEVICE,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

/// Any positioner
pub static MOTOR: DeviceClass = DeviceClass::derived("Motor", &DEVICE);

/// Class of [`MockMotor`]
pub static MOCK_MOTOR: DeviceClass = DeviceClass::derived("MockMotor", &MOTOR);

static MOCK_MOTOR_CAPABILITIES: &[Capability] = &[Capability::Movable, Capability::Readable];

/// Default acceleration time in seconds
const DEFAULT_ACCELERATION: f64 = 0.5;

/// Simulated motor.
#[derive(Debug)]
pub struct MockMotor {
    core: DeviceCore,
    user_readback: Arc<MockSignal>,
    user_setpoint: Arc<MockSignal>,
    acceleration: Arc<MockSignal>,
}

impl MockMotor {
    /// Start building a motor called `name`.
    pub fn builder(name: impl Into<String>) -> MockMotorBuilder {
        MockMotorBuilder {
            name: name.into(),
            labels: Vec::new(),
            position: 0.0,
            connected: true,
            bus: None,
        }
    }

    /// Readback signal
    pub fn user_readback(&self) -> &Arc<MockSignal> {
        &self.user_readback
    }

    /// Setpoint signal
    pub fn user_setpoint(&self) -> &Arc<MockSignal> {
        &self.user_setpoint
    }

    /// Acceleration signal
    pub fn acceleration(&self) -> &Arc<MockSignal> {
        &self.acceleration
    }

    /// Current readback position
    pub fn position(&self) -> f64 {
        self.user_readback.get()
    }

    /// Jump to `target` (setpoint and readback update together).
    pub fn set_position(&self, target: f64) {
        self.user_setpoint.set(target);
        self.user_readback.set(target);
    }

    /// Flip the simulated connection state of the motor and its signals.
    pub fn set_connected(&self, connected: bool) {
        self.core.connection().set_connected(connected);
        for signal in self.signals() {
            signal.set_connected(connected);
        }
    }

    /// Shared device state
    pub fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn signals(&self) -> [&Arc<MockSignal>; 3] {
        [&self.user_readback, &self.user_setpoint, &self.acceleration]
    }
}

#[async_trait]
impl Device for MockMotor {
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
        self.signals()
            .into_iter()
            .map(|s| s.clone() as DeviceRef)
            .collect()
    }

    fn component(&self, attr: &str) -> Option<DeviceRef> {
        let signal = match attr {
            "user_readback" => &self.user_readback,
            "user_setpoint" => &self.user_setpoint,
            "acceleration" => &self.acceleration,
            _ => return None,
        };
        Some(signal.clone() as DeviceRef)
    }

    fn class(&self) -> &'static DeviceClass {
        &MOCK_MOTOR
    }

    fn capabilities(&self) -> &[Capability] {
        MOCK_MOTOR_CAPABILITIES
    }

    fn is_connected(&self) -> bool {
        self.core.connection().is_connected()
    }

    async fn wait_for_connection(&self) {
        self.core.connection().wait_connected().await;
    }
}

/// Builder for [`MockMotor`]
#[derive(Debug)]
pub struct MockMotorBuilder {
    name: String,
    labels: Vec<String>,
    position: f64,
    connected: bool,
    bus: Option<InstantiationBus>,
}

impl MockMotorBuilder {
    /// Initial labels
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Initial position (default: 0.0)
    pub fn position(mut self, position: f64) -> Self {
        self.position = position;
        self
    }

    /// Initial connection state (default: connected)
    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    /// Bus to announce the motor on (default: the global bus)
    pub fn bus(mut self, bus: &InstantiationBus) -> Self {
        self.bus = Some(bus.clone());
        self
    }

    /// Construct the motor with its signals and announce it.
    pub fn build(self) -> Arc<MockMotor> {
        let bus = self.bus.unwrap_or_else(InstantiationBus::global);
        let name = self.name;
        let position = self.position;

        let motor = Arc::new_cyclic(|weak: &Weak<MockMotor>| {
            let parent: WeakDeviceRef = weak.clone();
            MockMotor {
                user_readback: MockSignal::child(
                    format!("{name}_user_readback"),
                    parent.clone(),
                    position,
                ),
                user_setpoint: MockSignal::child(
                    format!("{name}_user_setpoint"),
                    parent.clone(),
                    position,
                ),
                acceleration: MockSignal::child(
                    format!("{name}_acceleration"),
                    parent,
                    DEFAULT_ACCELERATION,
                ),
                core: DeviceCore::new(name.clone())
                    .with_labels(self.labels)
                    .with_connected(self.connected),
            }
        });
        if !self.connected {
            motor.set_connected(false);
        }

        tracing::trace!(motor = %motor.name(), "Mock motor built");
        instantiate(&bus, motor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_device::same_device;

    #[test]
    fn test_children_point_back_to_motor() {
        let bus = InstantiationBus::new();
        let motor = MockMotor::builder("m1").bus(&bus).build();
        let motor_ref: DeviceRef = motor.clone();

        let children = motor.children();
        assert_eq!(children.len(), 3);
        for child in &children {
            let parent = child.parent().unwrap();
            assert!(same_device(&parent, &motor_ref));
        }
        assert_eq!(motor.user_readback().name(), "m1_user_readback");
    }

    #[test]
    fn test_component_lookup() {
        let bus = InstantiationBus::new();
        let motor = MockMotor::builder("m1").position(2.0).bus(&bus).build();

        let readback = motor.component("user_readback").unwrap();
        assert_eq!(readback.name(), "m1_user_readback");
        assert!(motor.component("velocity").is_none());
        assert_eq!(motor.position(), 2.0);

        motor.set_position(4.5);
        assert_eq!(motor.position(), 4.5);
        assert_eq!(motor.user_setpoint().get(), 4.5);
    }

    #[test]
    fn test_disconnected_motor_disconnects_signals() {
        let bus = InstantiationBus::new();
        let motor = MockMotor::builder("bad").connected(false).bus(&bus).build();
        assert!(!motor.is_connected());
        assert!(!motor.user_readback().is_connected());

        motor.set_connected(true);
        assert!(motor.acceleration().is_connected());
    }

    #[test]
    fn test_children_die_with_motor() {
        let bus = InstantiationBus::new();
        let motor = MockMotor::builder("m1").bus(&bus).build();
        let readback = Arc::downgrade(motor.user_readback());
        drop(motor);
        assert!(readback.upgrade().is_none());
    }

    #[test]
    fn test_motor_class() {
        let bus = InstantiationBus::new();
        let motor = MockMotor::builder("m1").bus(&bus).build();
        assert!(motor.class().is_subclass_of(&MOTOR));
        assert!(motor.capabilities().contains(&Capability::Movable));
    }
}
