//! Demo configuration.

use std::path::PathBuf;

use clap::Parser;
use promshm_core::metric::DEFAULT_BUCKETS;
use promshm_core::StoreConfig;

use crate::error::{Error, Result};

/// Default number of update iterations per worker.
pub const DEFAULT_ITERATIONS: usize = 10_000;

/// Default request methods the workers pick from.
pub const DEFAULT_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
        .max(1)
}

/// Demo configuration.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Store configuration (registry name, arena budget, map capacity).
    pub store: StoreConfig,

    /// Number of worker threads standing in for worker processes.
    pub workers: usize,

    /// Updates each worker performs.
    pub iterations: usize,

    /// Label values for the `method` label.
    pub methods: Vec<String>,

    /// Latency histogram bucket bounds.
    pub buckets: Vec<f64>,
}

impl DemoConfig {
    /// Create a configuration with default workload settings.
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            workers: default_workers(),
            iterations: DEFAULT_ITERATIONS,
            methods: DEFAULT_METHODS.iter().map(|m| m.to_string()).collect(),
            buckets: DEFAULT_BUCKETS.to_vec(),
        }
    }

    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the iterations per worker.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the method label values.
    pub fn with_methods(mut self, methods: Vec<String>) -> Self {
        self.methods = methods;
        self
    }

    /// Set the latency buckets.
    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = buckets;
        self
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

/// Command-line arguments for the demo.
#[derive(Parser, Debug)]
#[command(name = "promshm-demo")]
#[command(version, about = "Drive a shared promshm metric store from worker threads", long_about = None)]
pub struct Args {
    /// JSON store configuration file. Flags below override its values.
    #[arg(long)]
    pub store_config: Option<PathBuf>,

    /// Registry name.
    #[arg(long)]
    pub registry_name: Option<String>,

    /// Arena budget in kilobytes.
    #[arg(long)]
    pub segment_kb: Option<usize>,

    /// Worker threads (0 = auto).
    #[arg(short, long, default_value_t = 0)]
    pub workers: usize,

    /// Updates per worker.
    #[arg(short, long, default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: usize,

    /// Comma-separated method label values.
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_METHODS.map(String::from))]
    pub methods: Vec<String>,

    /// Comma-separated latency bucket bounds in seconds.
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_BUCKETS)]
    pub buckets: Vec<f64>,
}

impl Args {
    /// Convert command-line arguments to a demo configuration.
    pub fn into_config(self) -> Result<DemoConfig> {
        let mut store = match &self.store_config {
            Some(path) => StoreConfig::from_json(&std::fs::read_to_string(path)?)?,
            None => StoreConfig::default(),
        };
        if let Some(name) = self.registry_name {
            store = store.with_registry_name(name);
        }
        if let Some(kb) = self.segment_kb {
            let bytes = kb
                .checked_mul(1024)
                .ok_or_else(|| Error::Config(format!("segment of {kb} KiB is too large")))?;
            store = store.with_segment_size(bytes);
        }
        store.validate()?;

        if self.methods.is_empty() {
            return Err(Error::Config("at least one method is required".into()));
        }

        let workers = if self.workers == 0 {
            default_workers()
        } else {
            self.workers
        };

        Ok(DemoConfig::new(store)
            .with_workers(workers)
            .with_iterations(self.iterations)
            .with_methods(self.methods)
            .with_buckets(self.buckets))
    }
}
