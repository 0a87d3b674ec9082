//! Reference arena backed by the global allocator.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Arena;
use crate::config::StoreConfig;
use crate::error::{Error, Result};

struct HeapArenaInner {
    limit: Option<usize>,
    in_use: AtomicUsize,
    peak: AtomicUsize,
    /// Outstanding blocks by address, used to catch mismatched frees.
    live: Mutex<HashMap<usize, Layout>>,
}

/// Arena over the process heap with an optional byte budget.
///
/// This models a segment of fixed size inside a single process. It keeps an
/// exact count of outstanding bytes, which makes it useful for checking that
/// teardown returns everything it took.
#[derive(Clone)]
pub struct HeapArena {
    inner: Arc<HeapArenaInner>,
}

impl HeapArena {
    /// Create an arena without a byte budget.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an arena that refuses allocations beyond `limit` bytes in use.
    pub fn with_limit(limit: usize) -> Self {
        Self::build(Some(limit))
    }

    /// Create an arena sized like the configured segment.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::with_limit(config.segment_size)
    }

    fn build(limit: Option<usize>) -> Self {
        Self {
            inner: Arc::new(HeapArenaInner {
                limit,
                in_use: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                live: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Byte budget, if any.
    pub fn limit(&self) -> Option<usize> {
        self.inner.limit
    }

    /// Bytes currently allocated.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    /// Highest value `in_use` has reached.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::Acquire)
    }

    /// Number of outstanding blocks.
    pub fn live_allocations(&self) -> usize {
        self.inner.live.lock().len()
    }

    fn reserve(&self, size: usize) -> bool {
        let limit = self.inner.limit;
        let reserved = self
            .inner
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let next = used.checked_add(size)?;
                match limit {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            });
        match reserved {
            Ok(previous) => {
                self.inner.peak.fetch_max(previous + size, Ordering::AcqRel);
                true
            }
            Err(_) => false,
        }
    }
}

impl Default for HeapArena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HeapArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapArena")
            .field("limit", &self.inner.limit)
            .field("in_use", &self.in_use())
            .field("peak", &self.peak())
            .finish()
    }
}

impl Arena for HeapArena {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        let requested = layout.size();
        if requested == 0 {
            // SAFETY: alignment is non-zero.
            return Ok(unsafe { NonNull::new_unchecked(layout.align() as *mut u8) });
        }

        if !self.reserve(requested) {
            tracing::warn!(
                requested,
                in_use = self.in_use(),
                limit = ?self.inner.limit,
                "arena budget exhausted"
            );
            return Err(Error::AllocationExhausted { requested });
        }

        // SAFETY: non-zero size checked above.
        let ptr = unsafe { alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            self.inner.in_use.fetch_sub(requested, Ordering::AcqRel);
            tracing::warn!(requested, "heap allocation failed");
            return Err(Error::AllocationExhausted { requested });
        };

        self.inner.live.lock().insert(ptr.as_ptr() as usize, layout);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        let recorded = self.inner.live.lock().remove(&(ptr.as_ptr() as usize));
        debug_assert_eq!(recorded, Some(layout), "block freed with a different layout");

        alloc::dealloc(ptr.as_ptr(), layout);
        self.inner.in_use.fetch_sub(layout.size(), Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accounting() {
        let arena = HeapArena::new();
        let layout = Layout::from_size_align(24, 8).unwrap();
        let a = arena.allocate(layout).unwrap();
        let b = arena.allocate_zeroed(layout).unwrap();
        assert_eq!(arena.in_use(), 48);
        assert_eq!(arena.live_allocations(), 2);
        // SAFETY: b points at 24 zeroed bytes.
        assert!(unsafe { std::slice::from_raw_parts(b.as_ptr(), 24) }
            .iter()
            .all(|&byte| byte == 0));

        unsafe {
            arena.deallocate(a, layout);
            arena.deallocate(b, layout);
        }
        assert_eq!(arena.in_use(), 0);
        assert_eq!(arena.peak(), 48);
    }

    #[test]
    fn test_limit_rejects_without_side_effects() {
        let arena = HeapArena::with_limit(32);
        let layout = Layout::from_size_align(24, 8).unwrap();
        let a = arena.allocate(layout).unwrap();

        let err = arena.allocate(layout).unwrap_err();
        assert_eq!(err, Error::AllocationExhausted { requested: 24 });
        assert_eq!(arena.in_use(), 24);

        unsafe { arena.deallocate(a, layout) };
        assert!(arena.allocate(layout).is_ok());
    }

    #[test]
    fn test_from_config_uses_segment_size() {
        let config = StoreConfig::default().with_segment_size(4096);
        let arena = HeapArena::from_config(&config);
        assert_eq!(arena.limit(), Some(4096));
    }
}
