//! Error types for the version store and ranking engine.
//!
//! Only the write path (`store_version`) and point lookups surface these to
//! callers. Search degrades to an empty list at the caller-facing adapters,
//! and feedback never fails.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the core.
#[derive(Debug, Error)]
pub enum Error {
    /// The embedding index was unreachable or rejected the operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// A persisted record could not be decoded into a typed version.
    #[error("malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    /// An index query exceeded the configured timeout.
    #[error("index query timed out after {0:?}")]
    Timeout(Duration),

    /// A component was constructed with unusable parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn storage(err: anyhow::Error) -> Self {
        Error::Storage(format!("{:#}", err))
    }

    pub(crate) fn malformed(id: &str, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
