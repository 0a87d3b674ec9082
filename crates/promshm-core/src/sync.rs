//! Synchronization primitives that can live inside a shared segment.
//!
//! Processes attached to the same segment cannot share a kernel mutex, so
//! all locking is done on a single atomic word embedded in the guarded
//! structure. Waiters spin with exponential backoff for a bounded number of
//! rounds and then yield the CPU before trying again; nobody ever sleeps in
//! the kernel on behalf of another process.
//!
//! With the `loom` feature the atomics and the spin/yield hints come from
//! `loom`, so the lock and CAS protocols can be model checked.

use std::fmt;

#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Lock word value while a writer holds the lock.
const WRITER: usize = usize::MAX;

/// Upper bound of the exponential backoff before yielding.
#[cfg(not(feature = "loom"))]
const SPIN_LIMIT: u32 = 2048;

#[cfg(feature = "loom")]
const SPIN_LIMIT: u32 = 2;

/// Spin loop hint for busy waiting.
///
/// Under loom this yields so the model checker can schedule other threads.
#[inline]
pub fn spin_loop() {
    #[cfg(not(feature = "loom"))]
    std::hint::spin_loop();

    #[cfg(feature = "loom")]
    loom::thread::yield_now();
}

/// Yield the current thread.
#[inline]
pub fn yield_now() {
    #[cfg(not(feature = "loom"))]
    std::thread::yield_now();

    #[cfg(feature = "loom")]
    loom::thread::yield_now();
}

/// Run `attempt` until it succeeds, backing off between tries.
#[inline]
fn acquire_with_backoff(mut attempt: impl FnMut() -> bool) {
    loop {
        if attempt() {
            return;
        }
        let mut round = 1;
        while round < SPIN_LIMIT {
            for _ in 0..round {
                spin_loop();
            }
            if attempt() {
                return;
            }
            round <<= 1;
        }
        yield_now();
    }
}

/// Reader/writer spin lock stored in one machine word.
///
/// `0` means free, [`WRITER`] means exclusively held, any other value is the
/// number of active readers. Readers may overlap each other but never a
/// writer.
#[repr(transparent)]
pub struct RwSpinLock {
    state: AtomicUsize,
}

impl RwSpinLock {
    /// Create an unlocked lock.
    #[cfg(not(feature = "loom"))]
    pub const fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
        }
    }

    /// Create an unlocked lock.
    #[cfg(feature = "loom")]
    pub fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
        }
    }

    /// Acquire shared access.
    pub fn read(&self) -> ReadGuard<'_> {
        acquire_with_backoff(|| self.try_lock_shared());
        ReadGuard { lock: self }
    }

    /// Acquire shared access without waiting.
    pub fn try_read(&self) -> Option<ReadGuard<'_>> {
        self.try_lock_shared().then(|| ReadGuard { lock: self })
    }

    /// Acquire exclusive access.
    pub fn write(&self) -> WriteGuard<'_> {
        acquire_with_backoff(|| self.try_lock_exclusive());
        WriteGuard { lock: self }
    }

    /// Acquire exclusive access without waiting.
    pub fn try_write(&self) -> Option<WriteGuard<'_>> {
        self.try_lock_exclusive().then(|| WriteGuard { lock: self })
    }

    /// Whether any reader or writer currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != 0
    }

    /// Whether a writer currently holds the lock.
    pub fn is_write_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) == WRITER
    }

    fn try_lock_shared(&self) -> bool {
        let readers = self.state.load(Ordering::Relaxed);
        // WRITER - 1 readers would make the next increment look like a writer.
        readers < WRITER - 1
            && self
                .state
                .compare_exchange(readers, readers + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    fn try_lock_exclusive(&self) -> bool {
        self.state.load(Ordering::Relaxed) == 0
            && self
                .state
                .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    fn unlock_shared(&self) {
        self.state.fetch_sub(1, Ordering::Release);
    }

    fn unlock_exclusive(&self) {
        self.state.store(0, Ordering::Release);
    }
}

impl Default for RwSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RwSpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Ordering::Relaxed);
        let mut s = f.debug_struct("RwSpinLock");
        match state {
            0 => s.field("state", &"unlocked"),
            WRITER => s.field("state", &"write"),
            readers => s.field("readers", &readers),
        };
        s.finish()
    }
}

/// Shared access to a [`RwSpinLock`], released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a RwSpinLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_shared();
    }
}

/// Exclusive access to a [`RwSpinLock`], released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a RwSpinLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_exclusive();
    }
}

/// `f64` stored as its bit pattern in an `AtomicU64`.
///
/// Hardware has no atomic float add, so read-modify-write goes through a
/// compare-and-swap loop on the raw bits.
#[repr(transparent)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// Create a new atomic holding `value`.
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    /// Current value.
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Overwrite the value.
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Apply `update` atomically, retrying on contention. Returns the
    /// previous value.
    pub fn fetch_update(&self, mut update: impl FnMut(f64) -> f64) -> f64 {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let next = update(f64::from_bits(current)).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return f64::from_bits(current),
                Err(actual) => {
                    current = actual;
                    spin_loop();
                }
            }
        }
    }

    /// Add `delta`, returning the previous value.
    pub fn fetch_add(&self, delta: f64) -> f64 {
        self.fetch_update(|value| value + delta)
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl fmt::Debug for AtomicF64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}
