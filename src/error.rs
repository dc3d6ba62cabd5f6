//! Error types for the admission engine.
//!
//! Policy violations are not errors: they are collected as
//! [`Violation`](crate::webhooks::policies::Violation) values and never
//! short-circuit evaluation. The variants here all end a decision early.

use thiserror::Error;

use crate::namespace::LookupError;

/// Error type for admission decisions and startup
#[derive(Error, Debug)]
pub enum Error {
    /// The submitted object does not parse as its declared kind
    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// The namespace store could not answer (fail-closed)
    #[error("namespace lookup failed for {namespace:?}: {source}")]
    NamespaceLookup {
        namespace: String,
        #[source]
        source: LookupError,
    },

    /// Synthesized patch does not apply to its own source document.
    /// Unreachable with correct rule ordering; indicates an engine bug.
    #[error("patch conflict: {0}")]
    PatchConflict(String),

    /// Invalid process configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Errors caused by the submitted document rather than the engine or its collaborators
    pub fn is_user_error(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }

    /// Errors that indicate a defect in the engine itself
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::PatchConflict(_) | Error::Serialization(_))
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;
