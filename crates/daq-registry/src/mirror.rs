//! External device-discovery mirror.
//!
//! Some deployments keep a second, display-oriented registry (device browsers,
//! GUI panels). When `use_external_mirror` is enabled, every registration and
//! every `clear()` is forwarded to a [`DeviceMirror`].

use daq_device::DeviceRef;

/// Side-effect target for registrations.
///
/// Methods are invoked outside the registry lock, on the caller's thread.
pub trait DeviceMirror: Send + Sync {
    /// A device was added to the registry.
    fn register(&self, device: &DeviceRef);

    /// The registry was cleared.
    fn clear(&self);
}
