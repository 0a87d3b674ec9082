//! promshm demo library.
//!
//! Simulates a pool of worker processes sharing one metric store and
//! renders the result in the Prometheus text format.

pub mod config;
pub mod error;
pub mod workload;

pub use config::{Args, DemoConfig};
pub use error::Error;
pub use workload::{run, RequestMetrics, RunReport};
