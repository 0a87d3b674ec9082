//! Scalar samples.

use std::fmt;

use super::MetricType;
use crate::arena::{Arena, ArenaStr};
use crate::error::{Error, Result};
use crate::sync::AtomicF64;

/// One counter or gauge value for a concrete label set.
///
/// Updates are lock-free: each one loads the current bits, computes the new
/// value and retries the compare-and-swap until no other writer got in
/// between. Concurrent `add(1.0)` calls from any number of processes
/// therefore never lose an increment.
pub struct MetricSample<A: Arena> {
    kind: MetricType,
    l_value: ArenaStr<A>,
    value: AtomicF64,
}

impl<A: Arena> MetricSample<A> {
    /// Create a sample holding `initial`.
    pub fn new(arena: &A, kind: MetricType, l_value: &str, initial: f64) -> Result<Self> {
        Ok(Self {
            kind,
            l_value: ArenaStr::new(arena, l_value)?,
            value: AtomicF64::new(initial),
        })
    }

    /// Add `delta`, which must be non-negative.
    pub fn add(&self, delta: f64) -> Result<()> {
        if delta.is_nan() || delta < 0.0 {
            return Err(Error::InvalidOperation(format!(
                "{}: cannot add {delta}, use a gauge to decrease",
                self.l_value
            )));
        }
        self.value.fetch_add(delta);
        Ok(())
    }

    /// Subtract `delta`. Gauges only.
    pub fn sub(&self, delta: f64) -> Result<()> {
        self.require_gauge("sub")?;
        self.value.fetch_update(|current| current - delta);
        Ok(())
    }

    /// Overwrite the value. Gauges only.
    pub fn set(&self, value: f64) -> Result<()> {
        self.require_gauge("set")?;
        self.value.store(value);
        Ok(())
    }

    /// Add one.
    pub fn inc(&self) -> Result<()> {
        self.add(1.0)
    }

    /// Subtract one. Gauges only.
    pub fn dec(&self) -> Result<()> {
        self.sub(1.0)
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value.load()
    }

    /// Canonical `name{labels}` text of this sample.
    pub fn l_value(&self) -> &str {
        self.l_value.as_str()
    }

    /// Type of the owning family.
    pub fn kind(&self) -> MetricType {
        self.kind
    }

    fn require_gauge(&self, op: &str) -> Result<()> {
        if self.kind == MetricType::Gauge {
            Ok(())
        } else {
            Err(Error::InvalidOperation(format!(
                "{}: {op} is only allowed on gauges, not {}",
                self.l_value, self.kind
            )))
        }
    }
}

impl<A: Arena> fmt::Debug for MetricSample<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricSample")
            .field("kind", &self.kind)
            .field("l_value", &self.l_value)
            .field("value", &self.value())
            .finish()
    }
}
