//! `daq-device`
//!
//! The contract between hardware-control objects and the device registry.
//!
//! The registry never talks to hardware. Everything it needs from a device is
//! captured here:
//!
//! - [`Device`]: name, labels, parent/child hierarchy, attribute-style component
//!   traversal and an async connection probe
//! - [`DeviceClass`] / [`Capability`]: type and capability information used for
//!   class-level registration and query filters
//! - [`DeviceCore`]: shared state a concrete device embeds instead of
//!   re-implementing the bookkeeping
//! - [`InstantiationBus`]: construction hook that lets registries observe every
//!   newly built device without a hard dependency on them
//!
//! ## Example
//!
//! ```rust,ignore
//! use daq_device::{instantiate, Device, DeviceCore, InstantiationBus};
//!
//! let bus = InstantiationBus::new();
//! let id = bus.subscribe(|dev| println!("built {}", dev.name()));
//! let meter = instantiate(&bus, Arc::new(PowerMeter::new("pm1")));
//! bus.unsubscribe(id);
//! ```

pub mod class;
pub mod state;
pub mod device;
pub mod instantiation;

pub use class::{Capability, DeviceClass, DEVICE, SIGNAL};
pub use state::{ConnectionState, DeviceCore};
pub use device::{device_id, same_device, Device, DeviceRef, WeakDeviceRef};
pub use instantiation::{instantiate, InstantiationBus, SubscriptionId};
