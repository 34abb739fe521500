//! Simulated beamline the CLI operates on.

use daq_device::{DeviceRef, InstantiationBus};
use daq_driver_mock::{MockAreaDetector, MockMotor, MockSignal};
use daq_registry::{DeviceMirror, Registry, RegistryConfig, RegistryResult};
use std::sync::Arc;

/// Mirror that reports forwarded registrations through `tracing`.
#[derive(Debug, Default)]
pub struct LogMirror;

impl DeviceMirror for LogMirror {
    fn register(&self, device: &DeviceRef) {
        tracing::info!(device = %device.name(), "Mirrored device registration");
    }

    fn clear(&self) {
        tracing::info!("Mirror cleared");
    }
}

/// Devices and the registry that captured them.
///
/// The devices are owned here so that weak-hold registries keep seeing them.
pub struct Beamline {
    pub registry: Arc<Registry>,
    pub detector: Arc<MockAreaDetector>,
    owned: Vec<DeviceRef>,
}

impl Beamline {
    /// Build the registry from `config`, then construct the devices on a
    /// private bus so the registry captures them as they come up.
    ///
    /// `bad_motor` never connects.
    pub fn build(config: RegistryConfig) -> RegistryResult<Self> {
        let bus = InstantiationBus::new();
        let registry = Registry::builder()
            .config(config)
            .bus(&bus)
            .mirror(Arc::new(LogMirror))
            .build()?;

        let motors = vec![
            MockMotor::builder("m1")
                .labels(["motors"])
                .position(1.25)
                .bus(&bus)
                .build(),
            MockMotor::builder("m2").labels(["motors"]).bus(&bus).build(),
            MockMotor::builder("bad_motor")
                .labels(["motors"])
                .connected(false)
                .bus(&bus)
                .build(),
        ];
        let ion_chambers: Vec<Arc<MockSignal>> = ["I0", "It"]
            .into_iter()
            .map(|name| {
                MockSignal::builder(name)
                    .labels(["ion_chambers"])
                    .bus(&bus)
                    .build()
            })
            .collect();
        let detector = MockAreaDetector::builder("sim_det")
            .labels(["detectors"])
            .bus(&bus)
            .build();

        if !registry.auto_register() {
            for motor in &motors {
                registry.register_device(motor.clone())?;
            }
        }

        let mut owned: Vec<DeviceRef> = Vec::new();
        owned.extend(motors.into_iter().map(|m| m as DeviceRef));
        owned.extend(ion_chambers.into_iter().map(|s| s as DeviceRef));

        tracing::debug!(devices = registry.len(), "Simulated beamline ready");
        Ok(Self {
            registry,
            detector,
            owned,
        })
    }

    /// Number of root devices built, whether or not the registry holds them.
    pub fn device_count(&self) -> usize {
        self.owned.len() + 1
    }
}
