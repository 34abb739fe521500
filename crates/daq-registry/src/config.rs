//! Registry configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/registry.toml` (base configuration, optional)
//! 2. Environment variables prefixed with `DAQ_REGISTRY_`
//!
//! Fields missing from both fall back to [`RegistryConfig::default`].
//!
//! # Example
//! ```no_run
//! use daq_registry::RegistryConfig;
//!
//! let config = RegistryConfig::load()?;
//! config.validate()?;
//! println!("keep references: {}", config.keep_references);
//! # Ok::<(), daq_registry::RegistryError>(())
//! ```

use crate::error::{RegistryError, RegistryResult};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/registry.toml";

/// Prefix for environment overrides, e.g. `DAQ_REGISTRY_AUTO_REGISTER=false`
pub const ENV_PREFIX: &str = "DAQ_REGISTRY_";

/// Construction options for a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Capture every device announced on the instantiation bus.
    pub auto_register: bool,
    /// Hold entries strongly (`true`) or weakly (`false`).
    ///
    /// Fixed for the lifetime of the registry.
    pub keep_references: bool,
    /// Mirror registrations and clears into an external [`DeviceMirror`](crate::DeviceMirror).
    pub use_external_mirror: bool,
    /// Default timeout for [`Registry::pop_disconnected`](crate::Registry::pop_disconnected)
    /// callers that do not pick their own, e.g. `"250ms"`.
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(1)
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auto_register: true,
            keep_references: true,
            use_external_mirror: false,
            connection_timeout: default_connection_timeout(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from `config/registry.toml` and the environment.
    pub fn load() -> RegistryResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; environment variables still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> RegistryResult<()> {
        if self.connection_timeout.is_zero() {
            return Err(RegistryError::Configuration(
                "connection_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builder-style override of `auto_register`
    pub fn with_auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }

    /// Builder-style override of `keep_references`
    pub fn with_keep_references(mut self, keep: bool) -> Self {
        self.keep_references = keep;
        self
    }

    /// Builder-style override of `use_external_mirror`
    pub fn with_external_mirror(mut self, enabled: bool) -> Self {
        self.use_external_mirror = enabled;
        self
    }
}
