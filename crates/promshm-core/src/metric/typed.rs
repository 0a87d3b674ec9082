//! Typed handles over [`Metric`].
//!
//! These resolve the label set and apply the update in one call:
//!
//! ```ignore
//! let requests = Counter::new(&arena, "http_requests_total", "Requests", &["method"])?;
//! registry.register_metric(requests.metric())?;
//! requests.inc(&["GET"])?;
//! ```

use super::{Metric, MetricType};
use crate::arena::{Arena, Shared};
use crate::error::Result;

/// Monotonic counter family.
#[derive(Clone)]
pub struct Counter<A: Arena> {
    metric: Shared<Metric<A>, A>,
}

impl<A: Arena> Counter<A> {
    /// Create an unregistered counter family.
    pub fn new(arena: &A, name: &str, help: &str, label_keys: &[&str]) -> Result<Self> {
        let metric = Metric::new(arena, MetricType::Counter, name, help, label_keys)?;
        Ok(Self {
            metric: Shared::new(arena, metric)?,
        })
    }

    /// The underlying family, for registration.
    pub fn metric(&self) -> &Shared<Metric<A>, A> {
        &self.metric
    }

    /// Add one to the sample for `labels`.
    pub fn inc(&self, labels: &[&str]) -> Result<()> {
        self.metric.sample_from_labels(labels)?.inc()
    }

    /// Add a non-negative `delta` to the sample for `labels`.
    pub fn add(&self, delta: f64, labels: &[&str]) -> Result<()> {
        self.metric.sample_from_labels(labels)?.add(delta)
    }

    /// Current value of the sample for `labels`, creating it at zero.
    pub fn get(&self, labels: &[&str]) -> Result<f64> {
        Ok(self.metric.sample_from_labels(labels)?.value())
    }
}

/// Gauge family.
#[derive(Clone)]
pub struct Gauge<A: Arena> {
    metric: Shared<Metric<A>, A>,
}

impl<A: Arena> Gauge<A> {
    /// Create an unregistered gauge family.
    pub fn new(arena: &A, name: &str, help: &str, label_keys: &[&str]) -> Result<Self> {
        let metric = Metric::new(arena, MetricType::Gauge, name, help, label_keys)?;
        Ok(Self {
            metric: Shared::new(arena, metric)?,
        })
    }

    /// The underlying family, for registration.
    pub fn metric(&self) -> &Shared<Metric<A>, A> {
        &self.metric
    }

    /// Add one to the sample for `labels`.
    pub fn inc(&self, labels: &[&str]) -> Result<()> {
        self.metric.sample_from_labels(labels)?.inc()
    }

    /// Subtract one from the sample for `labels`.
    pub fn dec(&self, labels: &[&str]) -> Result<()> {
        self.metric.sample_from_labels(labels)?.dec()
    }

    /// Add a non-negative `delta` to the sample for `labels`.
    pub fn add(&self, delta: f64, labels: &[&str]) -> Result<()> {
        self.metric.sample_from_labels(labels)?.add(delta)
    }

    /// Subtract `delta` from the sample for `labels`.
    pub fn sub(&self, delta: f64, labels: &[&str]) -> Result<()> {
        self.metric.sample_from_labels(labels)?.sub(delta)
    }

    /// Overwrite the sample for `labels`.
    pub fn set(&self, value: f64, labels: &[&str]) -> Result<()> {
        self.metric.sample_from_labels(labels)?.set(value)
    }

    /// Current value of the sample for `labels`, creating it at zero.
    pub fn get(&self, labels: &[&str]) -> Result<f64> {
        Ok(self.metric.sample_from_labels(labels)?.value())
    }
}

/// Histogram family.
#[derive(Clone)]
pub struct Histogram<A: Arena> {
    metric: Shared<Metric<A>, A>,
}

impl<A: Arena> Histogram<A> {
    /// Create a histogram family with explicit bucket bounds.
    pub fn new(
        arena: &A,
        name: &str,
        help: &str,
        label_keys: &[&str],
        bounds: &[f64],
    ) -> Result<Self> {
        let metric = Metric::histogram(arena, name, help, label_keys, bounds)?;
        Ok(Self {
            metric: Shared::new(arena, metric)?,
        })
    }

    /// The underlying family, for registration.
    pub fn metric(&self) -> &Shared<Metric<A>, A> {
        &self.metric
    }

    /// Record `value` in the sample for `labels`.
    pub fn observe(&self, value: f64, labels: &[&str]) -> Result<()> {
        self.metric.histogram_from_labels(labels)?.observe(value)
    }
}
