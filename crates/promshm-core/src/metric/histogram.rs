//! Bucketed histograms.
//!
//! A histogram metric owns one immutable [`HistogramBuckets`] shared by all
//! of its samples. Each label set gets a [`HistogramSample`] holding the
//! cumulative bucket counts, the running sum and the observation count.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::arena::{Arena, ArenaSlice, ArenaStr, Shared};
use crate::error::{Error, Result};
use crate::sync::{AtomicF64, RwSpinLock};

/// Upper bounds used when a histogram is created without explicit buckets.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// The default bucket bounds as a vector.
pub fn default_buckets() -> Vec<f64> {
    DEFAULT_BUCKETS.to_vec()
}

/// `count` bounds starting at `start`, each `width` apart.
pub fn linear_buckets(start: f64, width: f64, count: usize) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(Error::InvalidBuckets("linear buckets need a count of at least 1".into()));
    }
    if width.is_nan() || width <= 0.0 {
        return Err(Error::InvalidBuckets(format!(
            "linear bucket width must be positive, got {width}"
        )));
    }
    Ok((0..count).map(|i| start + width * i as f64).collect())
}

/// `count` bounds starting at `start`, each `factor` times the previous.
pub fn exponential_buckets(start: f64, factor: f64, count: usize) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(Error::InvalidBuckets(
            "exponential buckets need a count of at least 1".into(),
        ));
    }
    if start.is_nan() || start <= 0.0 {
        return Err(Error::InvalidBuckets(format!(
            "exponential bucket start must be positive, got {start}"
        )));
    }
    if factor.is_nan() || factor <= 1.0 {
        return Err(Error::InvalidBuckets(format!(
            "exponential bucket factor must be greater than 1, got {factor}"
        )));
    }
    let mut bound = start;
    Ok((0..count)
        .map(|_| {
            let current = bound;
            bound *= factor;
            current
        })
        .collect())
}

/// Finite, strictly increasing upper bounds. The `+Inf` bucket is implicit.
pub struct HistogramBuckets<A: Arena> {
    bounds: ArenaSlice<f64, A>,
}

impl<A: Arena> HistogramBuckets<A> {
    /// Validate and copy `bounds` into the arena.
    ///
    /// A trailing `+Inf` is accepted and dropped.
    pub fn new(arena: &A, bounds: &[f64]) -> Result<Self> {
        let bounds = match bounds.split_last() {
            Some((&last, rest)) if last == f64::INFINITY => rest,
            _ => bounds,
        };
        if let Some(bad) = bounds.iter().find(|bound| !bound.is_finite()) {
            return Err(Error::InvalidBuckets(format!("bound {bad} is not finite")));
        }
        if let Some(pair) = bounds.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(Error::InvalidBuckets(format!(
                "bounds must be strictly increasing, got {} then {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self {
            bounds: ArenaSlice::from_slice(arena, bounds)?,
        })
    }

    /// Explicit bounds, without `+Inf`.
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Number of buckets including `+Inf`.
    pub fn bucket_count(&self) -> usize {
        self.bounds.len() + 1
    }
}

impl<A: Arena> fmt::Debug for HistogramBuckets<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.bounds.iter()).finish()
    }
}

/// Point-in-time copy of a [`HistogramSample`].
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// Explicit bounds, without `+Inf`.
    pub bounds: Vec<f64>,
    /// Cumulative counts, one per bound plus the final `+Inf` count.
    pub counts: Vec<u64>,
    pub sum: f64,
    pub count: u64,
}

/// Observations of one histogram label set.
pub struct HistogramSample<A: Arena> {
    lock: RwSpinLock,
    l_value: ArenaStr<A>,
    labels: ArenaSlice<ArenaStr<A>, A>,
    buckets: Shared<HistogramBuckets<A>, A>,
    /// Cumulative: `counts[i]` is the number of observations `<= bounds[i]`;
    /// the last slot is the `+Inf` bucket.
    counts: ArenaSlice<AtomicU64, A>,
    sum: AtomicF64,
    count: AtomicU64,
}

impl<A: Arena> HistogramSample<A> {
    /// Create an empty sample for one label set over the shared `buckets`.
    pub fn new(
        arena: &A,
        l_value: &str,
        labels: &[&str],
        buckets: Shared<HistogramBuckets<A>, A>,
    ) -> Result<Self> {
        let l_value = ArenaStr::new(arena, l_value)?;
        let labels = ArenaSlice::from_fn(arena, labels.len(), |i| {
            ArenaStr::new(arena, labels[i])
        })?;
        let counts = ArenaSlice::from_fn(arena, buckets.bucket_count(), |_| Ok(AtomicU64::new(0)))?;
        Ok(Self {
            lock: RwSpinLock::new(),
            l_value,
            labels,
            buckets,
            counts,
            sum: AtomicF64::new(0.0),
            count: AtomicU64::new(0),
        })
    }

    /// Record one observation.
    ///
    /// Every bucket whose bound is `>= value` is incremented, along with
    /// `+Inf`, the sum and the count, all under the sample lock so readers
    /// never see a partial update.
    pub fn observe(&self, value: f64) -> Result<()> {
        if value.is_nan() || value < 0.0 {
            return Err(Error::InvalidOperation(format!(
                "{}: cannot observe {value}",
                self.l_value
            )));
        }

        let first = self.buckets.bounds().partition_point(|&bound| bound < value);
        let _guard = self.lock.write();
        for count in &self.counts[first..] {
            count.fetch_add(1, Ordering::Relaxed);
        }
        self.sum.fetch_add(value);
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Consistent copy of the counts, sum and count.
    pub fn snapshot(&self) -> HistogramSnapshot {
        let _guard = self.lock.read();
        HistogramSnapshot {
            bounds: self.buckets.bounds().to_vec(),
            counts: self
                .counts
                .iter()
                .map(|count| count.load(Ordering::Relaxed))
                .collect(),
            sum: self.sum.load(),
            count: self.count.load(Ordering::Relaxed),
        }
    }

    /// Number of observations.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of all observations.
    pub fn sum(&self) -> f64 {
        self.sum.load()
    }

    /// Canonical `name{labels}` text of this sample.
    pub fn l_value(&self) -> &str {
        self.l_value.as_str()
    }

    /// Label values, in schema order.
    pub fn labels(&self) -> &[ArenaStr<A>] {
        &self.labels
    }

    /// Bucket bounds shared with the rest of the family.
    pub fn buckets(&self) -> &HistogramBuckets<A> {
        &self.buckets
    }
}

impl<A: Arena> fmt::Debug for HistogramSample<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramSample")
            .field("l_value", &self.l_value)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::arena::HeapArena;
    use std::thread;

    fn sample(arena: &HeapArena, bounds: &[f64]) -> HistogramSample<HeapArena> {
        let buckets = Shared::new(arena, HistogramBuckets::new(arena, bounds).unwrap()).unwrap();
        HistogramSample::new(arena, "latency", &[], buckets).unwrap()
    }

    #[test]
    fn test_observe_cumulative() {
        let arena = HeapArena::new();
        let histogram = sample(&arena, &[1.0, 5.0]);
        for value in [0.5, 3.0, 10.0] {
            histogram.observe(value).unwrap();
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.bounds, vec![1.0, 5.0]);
        assert_eq!(snapshot.counts, vec![1, 2, 3]);
        assert_eq!(snapshot.sum, 13.5);
        assert_eq!(snapshot.count, 3);
    }

    #[test]
    fn test_observe_on_bound_is_inclusive() {
        let arena = HeapArena::new();
        let histogram = sample(&arena, &[1.0, 5.0]);
        histogram.observe(1.0).unwrap();
        histogram.observe(0.0).unwrap();
        assert_eq!(histogram.snapshot().counts, vec![2, 2, 2]);
    }

    #[test]
    fn test_observe_rejects_negative_and_nan() {
        let arena = HeapArena::new();
        let histogram = sample(&arena, &[1.0]);
        assert!(histogram.observe(-0.1).is_err());
        assert!(histogram.observe(f64::NAN).is_err());
        assert_eq!(histogram.count(), 0);
        assert_eq!(histogram.sum(), 0.0);
    }

    #[test]
    fn test_bucket_validation() {
        let arena = HeapArena::new();
        assert!(HistogramBuckets::new(&arena, &[1.0, 1.0]).is_err());
        assert!(HistogramBuckets::new(&arena, &[2.0, 1.0]).is_err());
        assert!(HistogramBuckets::new(&arena, &[f64::NAN]).is_err());
        assert!(HistogramBuckets::new(&arena, &[1.0, f64::INFINITY, 2.0]).is_err());

        let buckets = HistogramBuckets::new(&arena, &[0.1, 1.0, f64::INFINITY]).unwrap();
        assert_eq!(buckets.bounds(), &[0.1, 1.0]);
        assert_eq!(buckets.bucket_count(), 3);

        let only_inf = HistogramBuckets::new(&arena, &[]).unwrap();
        assert_eq!(only_inf.bucket_count(), 1);
    }

    #[test]
    fn test_generators() {
        assert_eq!(linear_buckets(1.0, 2.0, 3).unwrap(), vec![1.0, 3.0, 5.0]);
        assert_eq!(
            exponential_buckets(1.0, 10.0, 3).unwrap(),
            vec![1.0, 10.0, 100.0]
        );
        assert!(linear_buckets(0.0, 0.0, 3).is_err());
        assert!(exponential_buckets(0.0, 2.0, 3).is_err());
        assert!(exponential_buckets(1.0, 1.0, 3).is_err());
        assert!(linear_buckets(0.0, 1.0, 0).is_err());
        assert_eq!(default_buckets().len(), 11);
    }

    #[test]
    fn test_concurrent_observe() {
        let arena = HeapArena::new();
        let histogram = Shared::new(&arena, sample(&arena, &[1.0, 5.0])).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let histogram = histogram.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        histogram.observe(2.0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.counts, vec![0, 2000, 2000]);
        assert_eq!(snapshot.count, 2000);
        assert_eq!(snapshot.sum, 4000.0);
    }

    #[test]
    fn test_teardown_returns_memory() {
        let arena = HeapArena::new();
        {
            let buckets =
                Shared::new(&arena, HistogramBuckets::new(&arena, &DEFAULT_BUCKETS).unwrap())
                    .unwrap();
            let _a = HistogramSample::new(&arena, "rpc{m=\"a\"}", &["a"], buckets.clone()).unwrap();
            let _b = HistogramSample::new(&arena, "rpc{m=\"b\"}", &["b"], buckets).unwrap();
        }
        assert_eq!(arena.in_use(), 0);
    }
}
