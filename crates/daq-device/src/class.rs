//! Device classes and runtime capability flags.
//!
//! A [`DeviceClass`] is a static descriptor with an optional base class. The
//! registry uses it two ways: as a query filter ("every motor") and as the
//! opt-in key for class-level registration ("capture every future motor").
//!
//! ```rust,ignore
//! pub static MOTOR: DeviceClass = DeviceClass::derived("Motor", &DEVICE);
//! pub static EPICS_MOTOR: DeviceClass = DeviceClass::derived("EpicsMotor", &MOTOR);
//!
//! assert!(EPICS_MOTOR.is_subclass_of(&MOTOR));
//! assert!(!MOTOR.is_subclass_of(&EPICS_MOTOR));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Base class every device derives from.
pub static DEVICE: DeviceClass = DeviceClass::root("Device");

/// Scalar read/write points (readbacks, setpoints, gains).
pub static SIGNAL: DeviceClass = DeviceClass::derived("Signal", &DEVICE);

/// Static type descriptor for a family of devices.
///
/// Classes are compared by name, so two descriptors with the same name are the
/// same class. Names are expected to be unique within a process.
#[derive(Debug)]
pub struct DeviceClass {
    name: &'static str,
    base: Option<&'static DeviceClass>,
}

impl DeviceClass {
    /// A class with no base.
    pub const fn root(name: &'static str) -> Self {
        Self { name, base: None }
    }

    /// A class deriving from `base`.
    pub const fn derived(name: &'static str, base: &'static DeviceClass) -> Self {
        Self {
            name,
            base: Some(base),
        }
    }

    /// Class name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Direct base class, if any
    pub fn base(&self) -> Option<&'static DeviceClass> {
        self.base
    }

    /// True if `self` is `other` or derives from it (directly or transitively).
    pub fn is_subclass_of(&self, other: &DeviceClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name == other.name {
                return true;
            }
            current = class.base;
        }
        false
    }

    /// Names from `self` up to the root class.
    pub fn lineage(&self) -> Vec<&'static str> {
        let mut names = vec![self.name];
        let mut current = self.base;
        while let Some(class) = current {
            names.push(class.name);
            current = class.base;
        }
        names
    }
}

impl PartialEq for DeviceClass {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DeviceClass {}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Runtime capability flags for device introspection.
///
/// Devices report what they can do so queries can filter on it without
/// knowing concrete types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Can move to positions (stages, rotation mounts, motors)
    Movable,
    /// Can read scalar values (power meters, ion chambers, readbacks)
    Readable,
    /// Accepts new values (setpoints, gains)
    Settable,
    /// Can be armed and triggered (detectors, pulse generators)
    Triggerable,
    /// Can be staged/unstaged around an acquisition (Bluesky pattern)
    Stageable,
    /// Produces image frames (area detectors)
    FrameProducer,
}

impl Capability {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Movable => "Movable",
            Self::Readable => "Readable",
            Self::Settable => "Settable",
            Self::Triggerable => "Triggerable",
            Self::Stageable => "Stageable",
            Self::FrameProducer => "Frame Producer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static MOTOR: DeviceClass = DeviceClass::derived("Motor", &DEVICE);
    static EPICS_MOTOR: DeviceClass = DeviceClass::derived("EpicsMotor", &MOTOR);

    #[test]
    fn test_subclass_chain() {
        assert!(EPICS_MOTOR.is_subclass_of(&EPICS_MOTOR));
        assert!(EPICS_MOTOR.is_subclass_of(&MOTOR));
        assert!(EPICS_MOTOR.is_subclass_of(&DEVICE));
        assert!(!MOTOR.is_subclass_of(&EPICS_MOTOR));
        assert!(!SIGNAL.is_subclass_of(&MOTOR));
    }

    #[test]
    fn test_lineage() {
        assert_eq!(EPICS_MOTOR.lineage(), vec!["EpicsMotor", "Motor", "Device"]);
        assert_eq!(DEVICE.lineage(), vec!["Device"]);
    }

    #[test]
    fn test_capability_names() {
        assert_eq!(Capability::Movable.name(), "Movable");
        assert_eq!(Capability::FrameProducer.name(), "Frame Producer");
    }
}
