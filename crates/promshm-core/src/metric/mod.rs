//! Metric families.
//!
//! A [`Metric`] is a named, typed family with a fixed label schema. Each
//! distinct tuple of label values resolves to one sample, created on first
//! use and kept for the life of the metric.

pub mod histogram;
pub mod sample;
pub mod typed;

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::arena::{Arena, ArenaSlice, ArenaStr, Shared};
use crate::error::{Error, Result};
use crate::format;
use crate::map::ConcurrentMap;
use crate::sync::RwSpinLock;

pub use histogram::{
    default_buckets, exponential_buckets, linear_buckets, HistogramBuckets, HistogramSample,
    HistogramSnapshot, DEFAULT_BUCKETS,
};
pub use sample::MetricSample;
pub use typed::{Counter, Gauge, Histogram};

/// Label keys the exposition format reserves for itself.
pub const RESERVED_LABEL_KEYS: [&str; 2] = ["le", "quantile"];

static METRIC_NAME: OnceLock<Option<Regex>> = OnceLock::new();
static LABEL_KEY: OnceLock<Option<Regex>> = OnceLock::new();

fn matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}

/// Check `name` against `^[a-zA-Z_:][a-zA-Z0-9_:]*$`.
pub fn validate_metric_name(name: &str) -> Result<()> {
    if matches(&METRIC_NAME, r"^[a-zA-Z_:][a-zA-Z0-9_:]*$", name) {
        Ok(())
    } else {
        Err(Error::InvalidName(format!("invalid metric name {name:?}")))
    }
}

/// Check `key` against `^[a-zA-Z_][a-zA-Z0-9_]*$` and the reserved keys.
pub fn validate_label_key(key: &str) -> Result<()> {
    if !matches(&LABEL_KEY, r"^[a-zA-Z_][a-zA-Z0-9_]*$", key) {
        return Err(Error::InvalidName(format!("invalid label key {key:?}")));
    }
    if RESERVED_LABEL_KEYS.contains(&key) {
        return Err(Error::InvalidName(format!("label key {key:?} is reserved")));
    }
    Ok(())
}

fn validate_label_keys(keys: &[&str]) -> Result<()> {
    let mut seen = HashSet::with_capacity(keys.len());
    for key in keys {
        validate_label_key(key)?;
        if !seen.insert(*key) {
            return Err(Error::InvalidName(format!("duplicate label key {key:?}")));
        }
    }
    Ok(())
}

/// Kind of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// Monotonically increasing value.
    Counter,
    /// Value that can go up and down.
    Gauge,
    /// Cumulative bucket counts with a sum and a count.
    Histogram,
}

impl MetricType {
    /// Name used on `# TYPE` lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sample stored in a metric's sample map.
pub enum SampleSlot<A: Arena> {
    Scalar(Shared<MetricSample<A>, A>),
    Histogram(Shared<HistogramSample<A>, A>),
}

impl<A: Arena> Clone for SampleSlot<A> {
    fn clone(&self) -> Self {
        match self {
            SampleSlot::Scalar(sample) => SampleSlot::Scalar(sample.clone()),
            SampleSlot::Histogram(sample) => SampleSlot::Histogram(sample.clone()),
        }
    }
}

impl<A: Arena> fmt::Debug for SampleSlot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleSlot::Scalar(sample) => fmt::Debug::fmt(&**sample, f),
            SampleSlot::Histogram(sample) => fmt::Debug::fmt(&**sample, f),
        }
    }
}

/// A named metric family with its label schema and samples.
pub struct Metric<A: Arena> {
    kind: MetricType,
    name: ArenaStr<A>,
    help: ArenaStr<A>,
    label_keys: ArenaSlice<ArenaStr<A>, A>,
    buckets: Option<Shared<HistogramBuckets<A>, A>>,
    samples: ConcurrentMap<SampleSlot<A>, A>,
    /// Serializes label resolution so a label set maps to exactly one sample.
    lock: RwSpinLock,
    arena: A,
}

impl<A: Arena> Metric<A> {
    /// Create a metric family.
    ///
    /// Histograms created here use [`DEFAULT_BUCKETS`]; use
    /// [`Metric::histogram`] for explicit bounds. Label keys are validated
    /// up front. The metric name is checked when it is registered.
    pub fn new(
        arena: &A,
        kind: MetricType,
        name: &str,
        help: &str,
        label_keys: &[&str],
    ) -> Result<Self> {
        match kind {
            MetricType::Histogram => {
                Self::histogram(arena, name, help, label_keys, &DEFAULT_BUCKETS)
            }
            _ => {
                validate_label_keys(label_keys)?;
                Self::build(arena, kind, name, help, label_keys, None)
            }
        }
    }

    /// Create a histogram family with the given bucket bounds.
    pub fn histogram(
        arena: &A,
        name: &str,
        help: &str,
        label_keys: &[&str],
        bounds: &[f64],
    ) -> Result<Self> {
        validate_label_keys(label_keys)?;
        let buckets = Shared::new(arena, HistogramBuckets::new(arena, bounds)?)?;
        Self::build(
            arena,
            MetricType::Histogram,
            name,
            help,
            label_keys,
            Some(buckets),
        )
    }

    fn build(
        arena: &A,
        kind: MetricType,
        name: &str,
        help: &str,
        label_keys: &[&str],
        buckets: Option<Shared<HistogramBuckets<A>, A>>,
    ) -> Result<Self> {
        Ok(Self {
            kind,
            name: ArenaStr::new(arena, name)?,
            help: ArenaStr::new(arena, help)?,
            label_keys: ArenaSlice::from_fn(arena, label_keys.len(), |i| {
                ArenaStr::new(arena, label_keys[i])
            })?,
            buckets,
            samples: ConcurrentMap::new(arena)?,
            lock: RwSpinLock::new(),
            arena: arena.clone(),
        })
    }

    /// Family type.
    pub fn kind(&self) -> MetricType {
        self.kind
    }

    /// Family name as passed at construction.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// HELP text, unescaped.
    pub fn help(&self) -> &str {
        self.help.as_str()
    }

    /// Label keys in schema order.
    pub fn label_keys(&self) -> &[ArenaStr<A>] {
        &self.label_keys
    }

    /// Bucket bounds, for histograms.
    pub fn buckets(&self) -> Option<&HistogramBuckets<A>> {
        self.buckets.as_deref()
    }

    /// Samples in creation order.
    pub fn samples(&self) -> Vec<SampleSlot<A>> {
        self.samples.values()
    }

    /// Number of label sets seen so far.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Resolve a counter or gauge sample, creating it on first use.
    pub fn sample_from_labels(&self, values: &[&str]) -> Result<Shared<MetricSample<A>, A>> {
        if self.kind == MetricType::Histogram {
            return Err(Error::InvalidOperation(format!(
                "{} is a histogram, use histogram_from_labels",
                self.name
            )));
        }
        let l_value = format::l_value(&self.name, None, &self.label_keys[..], values)?;

        let _guard = self.lock.write();
        if let Some(SampleSlot::Scalar(sample)) = self.samples.get(&l_value) {
            return Ok(sample);
        }
        let sample = Shared::new(
            &self.arena,
            MetricSample::new(&self.arena, self.kind, &l_value, 0.0)?,
        )?;
        self.samples.set(&l_value, SampleSlot::Scalar(sample.clone()))?;
        tracing::trace!(metric = %self.name, l_value = %l_value, "sample created");
        Ok(sample)
    }

    /// Resolve a histogram sample, creating it on first use.
    pub fn histogram_from_labels(
        &self,
        values: &[&str],
    ) -> Result<Shared<HistogramSample<A>, A>> {
        let Some(buckets) = self.buckets.as_ref() else {
            return Err(Error::InvalidOperation(format!(
                "{} is a {}, use sample_from_labels",
                self.name, self.kind
            )));
        };
        let l_value = format::l_value(&self.name, None, &self.label_keys[..], values)?;

        let _guard = self.lock.write();
        if let Some(SampleSlot::Histogram(sample)) = self.samples.get(&l_value) {
            return Ok(sample);
        }
        let sample = Shared::new(
            &self.arena,
            HistogramSample::new(&self.arena, &l_value, values, buckets.clone())?,
        )?;
        self.samples.set(&l_value, SampleSlot::Histogram(sample.clone()))?;
        tracing::trace!(metric = %self.name, l_value = %l_value, "histogram sample created");
        Ok(sample)
    }
}

impl<A: Arena> fmt::Debug for Metric<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("label_keys", &self.label_keys)
            .field("samples", &self.samples.len())
            .finish()
    }
}
