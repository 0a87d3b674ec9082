//! Demo error types.

use thiserror::Error;

/// Demo errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Metric store error.
    #[error("store error: {0}")]
    Store(#[from] promshm_core::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker thread panicked.
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

/// Result alias for the demo.
pub type Result<T> = std::result::Result<T, Error>;
