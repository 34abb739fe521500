//! Error types for the device registry.
//!
//! Every failure is returned to the immediate caller. The registry never
//! retries and never logs an error on its own; the only silent paths are the
//! documented escape hatches (`allow_none` on queries, `pop_or` defaults).

use thiserror::Error;

/// Convenience alias for registry results.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Errors raised by [`Registry`](crate::Registry) operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A query matched nothing although at least one result was required.
    ///
    /// For dotted paths, `query` is the full original path even when the
    /// failure happened at an inner segment.
    #[error("Could not find components matching: {query}")]
    ComponentNotFound {
        /// Human-readable rendering of the query
        query: String,
    },

    /// A single-result query matched more than one entry.
    #[error(
        "Found {count} components matching query [{query}]. \
         Consider using findall(). {names:?}"
    )]
    MultipleComponentsFound {
        /// Human-readable rendering of the query
        query: String,
        /// Number of matches
        count: usize,
        /// Names of the matches, in result order
        names: Vec<String>,
    },

    /// An object without a usable name was passed to `register`.
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    /// A label query could not be interpreted (e.g. an empty path segment).
    #[error("Invalid component label: {0:?}")]
    InvalidComponentLabel(String),

    /// Registry configuration is semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Registry configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),
}

impl RegistryError {
    pub(crate) fn not_found(query: impl Into<String>) -> Self {
        Self::ComponentNotFound {
            query: query.into(),
        }
    }

    /// True for [`RegistryError::ComponentNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ComponentNotFound { .. })
    }
}

impl From<figment::Error> for RegistryError {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}
