//! Mock Devices for the rust-daq device registry
//!
//! Simulated hardware-control objects for testing registry behaviour without
//! physical hardware. None of them talk to anything; they only carry the
//! name/label/hierarchy/connection state the registry reads.
//!
//! # Available Mock Devices
//!
//! - [`MockSignal`] - Scalar read/write point (ion chamber, gain, readback)
//! - [`MockMotor`] - Motor with eager `user_readback`, `user_setpoint` and
//!   `acceleration` child signals
//! - [`MockAreaDetector`] - Detector whose `cam` plugin is built lazily on first
//!   component access
//!
//! # Construction Hook
//!
//! Every builder finishes with [`daq_device::instantiate`], so constructing a
//! mock announces it on an [`InstantiationBus`](daq_device::InstantiationBus)
//! (the global one unless `.bus(..)` is given):
//!
//! ```rust,ignore
//! use daq_driver_mock::MockMotor;
//! use daq_device::InstantiationBus;
//!
//! let bus = InstantiationBus::new();
//! let motor = MockMotor::builder("m1").labels(["motors"]).bus(&bus).build();
//! ```
//!
//! Sub-components built together with their parent are announced through the
//! parent; lazily built ones (`cam`) are announced when they come into being.

mod mock_detector;
mod mock_motor;
mod mock_signal;

pub use mock_detector::{
    MockAreaDetector, MockAreaDetectorBuilder, MockCam, AREA_DETECTOR, CAM_PLUGIN,
    MOCK_AREA_DETECTOR,
};
pub use mock_motor::{MockMotor, MockMotorBuilder, MOCK_MOTOR, MOTOR};
pub use mock_signal::{MockSignal, MockSignalBuilder, MOCK_SIGNAL};
