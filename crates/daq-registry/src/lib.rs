//! Device lookup registry for rust-daq
//!
//! Tracks live hardware-control objects and resolves them later by name, by
//! label, by class or capability, or by dotted sub-component path
//! (`"sim_det.cam.gain"`). The registry only does bookkeeping: it never talks
//! to hardware.
//!
//! # Registration
//!
//! - [`Registry::register`]: explicit, returns the device unchanged
//! - [`Registry::register_class`]: capture every future instance of a class
//! - implicit capture of every device announced on the
//!   [`InstantiationBus`](daq_device::InstantiationBus) while
//!   [`Registry::auto_register`] is on
//!
//! # Retirement
//!
//! Entries leave the registry through [`Registry::pop`] / [`Registry::remove`],
//! [`Registry::clear`], [`Registry::pop_disconnected`], or (with
//! `keep_references = false`) silently once the last outside owner drops the
//! device.
//!
//! # Example
//!
//! ```rust,ignore
//! use daq_registry::{Query, Registry, RegistryConfig};
//!
//! let registry = Registry::new(RegistryConfig::load()?)?;
//! let motors = registry.findall(Query::new().label("motors"))?;
//! let gone = registry.pop_disconnected(std::time::Duration::from_secs(1)).await;
//! ```

pub mod config;
mod entry;
pub mod error;
pub mod mirror;
mod prune;
pub mod query;
pub mod registry;

pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult};
pub use mirror::DeviceMirror;
pub use query::{DeviceQuery, Query};
pub use registry::{DeviceKey, Registry, RegistryBuilder};
