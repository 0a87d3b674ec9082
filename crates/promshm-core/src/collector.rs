//! Named groups of metrics.

use std::fmt;

use crate::arena::{Arena, ArenaStr, Shared};
use crate::error::{Error, Result};
use crate::map::{ConcurrentMap, DEFAULT_CAPACITY};
use crate::metric::Metric;

/// Produces the metrics a collector exposes at scrape time.
pub type CollectFn<A> = fn(&Collector<A>) -> Vec<Shared<Metric<A>, A>>;

/// Default collect callback: every added metric, in insertion order.
pub fn collect_all<A: Arena>(collector: &Collector<A>) -> Vec<Shared<Metric<A>, A>> {
    collector.metrics()
}

/// A named set of metrics plus the callback that decides what is exposed.
pub struct Collector<A: Arena> {
    name: ArenaStr<A>,
    metrics: ConcurrentMap<Shared<Metric<A>, A>, A>,
    collect_fn: CollectFn<A>,
}

impl<A: Arena> Collector<A> {
    /// Create a collector with the default map capacity.
    pub fn new(arena: &A, name: &str) -> Result<Self> {
        Self::with_capacity(arena, name, DEFAULT_CAPACITY)
    }

    /// Create a collector whose metric map starts with `capacity` buckets.
    pub fn with_capacity(arena: &A, name: &str, capacity: usize) -> Result<Self> {
        Ok(Self {
            name: ArenaStr::new(arena, name)?,
            metrics: ConcurrentMap::with_capacity(arena, capacity)?,
            collect_fn: collect_all,
        })
    }

    /// Name the collector is registered under.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Replace the collect callback.
    pub fn set_collect_fn(&mut self, collect_fn: CollectFn<A>) {
        self.collect_fn = collect_fn;
    }

    /// Add `metric` under its name. Names are unique per collector.
    pub fn add_metric(&self, metric: Shared<Metric<A>, A>) -> Result<()> {
        let name = metric.name().to_string();
        if self.metrics.set_if_absent(&name, metric)? {
            tracing::debug!(collector = %self.name, metric = %name, "metric added");
            Ok(())
        } else {
            tracing::warn!(collector = %self.name, metric = %name, "metric already registered");
            Err(Error::DuplicateRegistration(name))
        }
    }

    /// Look up a metric by name.
    pub fn metric(&self, name: &str) -> Option<Shared<Metric<A>, A>> {
        self.metrics.get(name)
    }

    /// Every added metric, in insertion order.
    pub fn metrics(&self) -> Vec<Shared<Metric<A>, A>> {
        self.metrics.values()
    }

    /// Number of metrics added.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether no metric was added.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Run the collect callback.
    pub fn collect(&self) -> Vec<Shared<Metric<A>, A>> {
        (self.collect_fn)(self)
    }
}

impl<A: Arena> fmt::Debug for Collector<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.name)
            .field("metrics", &self.metrics.keys())
            .finish()
    }
}
