//! Simulated request workers.
//!
//! Each worker behaves like one server process attached to the shared
//! segment: it resolves its samples by label values and updates them, while
//! the registry is rendered once all workers are done.

use std::thread;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::Rng;

use promshm_core::{
    create_registry_with_config, Counter, Gauge, HeapArena, Histogram, Registry, Shared,
};

use crate::config::DemoConfig;
use crate::error::{Error, Result};

/// Status codes the simulated requests finish with, heavily weighted to 200.
const STATUS_CODES: [&str; 6] = ["200", "200", "200", "200", "404", "500"];

/// Metric families every worker updates.
#[derive(Clone)]
pub struct RequestMetrics {
    pub requests: Counter<HeapArena>,
    pub in_flight: Gauge<HeapArena>,
    pub latency: Histogram<HeapArena>,
}

impl RequestMetrics {
    /// Create the families and register them with `registry`.
    pub fn register(
        arena: &HeapArena,
        registry: &Registry<HeapArena>,
        config: &DemoConfig,
    ) -> Result<Self> {
        let requests = Counter::new(
            arena,
            "http_requests_total",
            "Total HTTP requests",
            &["method", "code"],
        )?;
        let in_flight = Gauge::new(
            arena,
            "http_requests_in_flight",
            "Requests currently being served",
            &["method"],
        )?;
        let latency = Histogram::new(
            arena,
            "http_request_duration_seconds",
            "Request latency in seconds",
            &["method"],
            &config.buckets,
        )?;

        registry.register_metric(requests.metric())?;
        registry.register_metric(in_flight.metric())?;
        registry.register_metric(latency.metric())?;
        Ok(Self {
            requests,
            in_flight,
            latency,
        })
    }

    /// Record one simulated request.
    fn serve(&self, rng: &mut impl Rng, methods: &[String]) -> Result<()> {
        let method = methods
            .choose(rng)
            .map(String::as_str)
            .ok_or_else(|| Error::Config("no methods configured".into()))?;
        let code = STATUS_CODES.choose(rng).copied().unwrap_or("200");

        self.in_flight.inc(&[method])?;
        let seconds: f64 = rng.gen_range(0.0..2.0f64).powi(3);
        self.latency.observe(seconds, &[method])?;
        self.requests.inc(&[method, code])?;
        self.in_flight.dec(&[method])?;
        Ok(())
    }
}

/// Outcome of a demo run.
#[derive(Debug)]
pub struct RunReport {
    pub exposition: String,
    pub requests: u64,
    pub arena_bytes: usize,
    pub arena_peak: usize,
}

/// Run the configured workload and render the registry.
pub fn run(config: &DemoConfig) -> Result<RunReport> {
    let arena = HeapArena::from_config(&config.store);
    let registry: Shared<Registry<HeapArena>, HeapArena> =
        create_registry_with_config(&arena, &config.store)?;
    let metrics = RequestMetrics::register(&arena, &registry, config)?;

    let started = Instant::now();
    thread::scope(|scope| -> Result<()> {
        let handles: Vec<_> = (0..config.workers)
            .map(|worker| {
                let metrics = metrics.clone();
                scope.spawn(move || -> Result<()> {
                    let mut rng = rand::thread_rng();
                    for _ in 0..config.iterations {
                        metrics.serve(&mut rng, &config.methods)?;
                    }
                    tracing::debug!(worker, iterations = config.iterations, "worker finished");
                    Ok(())
                })
            })
            .collect();

        for (worker, handle) in handles.into_iter().enumerate() {
            handle.join().map_err(|_| Error::WorkerPanicked(worker))??;
        }
        Ok(())
    })?;

    let requests = (config.workers * config.iterations) as u64;
    tracing::info!(
        workers = config.workers,
        requests,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "workload complete"
    );

    Ok(RunReport {
        exposition: registry.to_text(),
        requests,
        arena_bytes: arena.in_use(),
        arena_peak: arena.peak(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_counts_every_request() {
        let config = DemoConfig::default()
            .with_workers(4)
            .with_iterations(250)
            .with_methods(vec!["GET".into()]);
        let report = run(&config).unwrap();

        assert_eq!(report.requests, 1000);
        let total: f64 = report
            .exposition
            .lines()
            .filter(|line| line.starts_with("http_requests_total{"))
            .filter_map(|line| line.rsplit(' ').next())
            .map(|value| value.parse::<f64>().unwrap())
            .sum();
        assert_eq!(total, 1000.0);
        assert!(report
            .exposition
            .contains("http_request_duration_seconds_count{method=\"GET\"} 1000\n"));
        assert!(report
            .exposition
            .contains("http_requests_in_flight{method=\"GET\"} 0\n"));
    }

    #[test]
    fn test_run_fails_on_tiny_segment() {
        let mut config = DemoConfig::default().with_workers(1).with_iterations(1);
        config.store = config.store.with_segment_size(256);
        assert!(matches!(run(&config), Err(Error::Store(_))));
    }
}
