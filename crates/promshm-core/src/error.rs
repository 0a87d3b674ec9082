//! Core error types.

use thiserror::Error;

/// Errors reported by the metric store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The arena could not satisfy an allocation.
    #[error("arena exhausted: could not allocate {requested} bytes")]
    AllocationExhausted {
        /// Size of the request that failed.
        requested: usize,
    },

    /// A metric or collector with this name is already registered.
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),

    /// A metric name or label key fails validation.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The operation is not allowed for this metric type or value.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Number of label values does not match the metric's label schema.
    #[error("label arity mismatch: expected {expected} values, got {actual}")]
    ArityMismatch {
        /// Number of label keys in the schema.
        expected: usize,
        /// Number of label values supplied.
        actual: usize,
    },

    /// Histogram bucket bounds are not finite and strictly increasing.
    #[error("invalid histogram buckets: {0}")]
    InvalidBuckets(String),

    /// Configuration document could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
