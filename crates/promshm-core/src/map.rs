//! Arena-resident string-keyed hash map.
//!
//! Entries hash into separately chained buckets and are also threaded onto
//! an insertion-order list, which owns them. Iteration always walks the
//! order list so exposition output is deterministic. Every operation runs
//! under the map's own [`RwSpinLock`], which makes a map shareable between
//! processes attached to the same segment.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::{self, ManuallyDrop};
use std::ptr::NonNull;

use crate::arena::{Arena, ArenaBox, ArenaSlice, ArenaStr};
use crate::error::Result;
use crate::list::LinkedList;
use crate::sync::RwSpinLock;

/// Bucket count used by [`ConcurrentMap::new`].
pub const DEFAULT_CAPACITY: usize = 32;

/// Smallest usable bucket count; the hash reduces modulo `capacity - 1`.
pub const MIN_CAPACITY: usize = 2;

/// Value deleter.
pub type FreeValueFn<V> = fn(V);

struct MapEntry<V, A: Arena> {
    key: ArenaStr<A>,
    value: ManuallyDrop<V>,
    release: FreeValueFn<V>,
}

impl<V, A: Arena> Drop for MapEntry<V, A> {
    fn drop(&mut self) {
        // SAFETY: the value is taken exactly once, here.
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        (self.release)(value);
    }
}

type EntryRef<V, A> = NonNull<MapEntry<V, A>>;
type Buckets<V, A> = ArenaSlice<LinkedList<EntryRef<V, A>, A>, A>;

struct MapState<V, A: Arena> {
    capacity: usize,
    buckets: Buckets<V, A>,
    order: LinkedList<ArenaBox<MapEntry<V, A>, A>, A>,
    free_value: FreeValueFn<V>,
}

impl<V, A: Arena> MapState<V, A> {
    fn find(&self, key: &str) -> Option<EntryRef<V, A>> {
        let index = bucket_index(key, self.capacity);
        self.buckets[index]
            .iter()
            .copied()
            // SAFETY: chain references point at entries owned by `order`.
            .find(|entry| unsafe { entry.as_ref() }.key == key)
    }
}

/// Hash map from strings to `V`, allocated from an arena and guarded by a
/// spin lock.
pub struct ConcurrentMap<V, A: Arena> {
    lock: RwSpinLock,
    state: UnsafeCell<MapState<V, A>>,
    arena: A,
}

// SAFETY: all access to `state` goes through `lock`; chain references only
// point at entries owned by the same map.
unsafe impl<V: Send, A: Arena> Send for ConcurrentMap<V, A> {}
unsafe impl<V: Send + Sync, A: Arena> Sync for ConcurrentMap<V, A> {}

/// Bucket for `key`: Horner's rule over the key bytes with a multiplier
/// that is itself re-mixed after every byte.
fn bucket_index(key: &str, capacity: usize) -> usize {
    let b: usize = 27183;
    let mut a: usize = 31415;
    let mut index: usize = 0;
    for &c in key.as_bytes() {
        index = a.wrapping_mul(index).wrapping_add(c as usize) % capacity;
        a = a.wrapping_mul(b) % (capacity - 1);
    }
    index
}

fn empty_buckets<V, A: Arena>(arena: &A, capacity: usize) -> Result<Buckets<V, A>> {
    ArenaSlice::from_fn(arena, capacity, |_| Ok(LinkedList::new(arena.clone())))
}

impl<V, A: Arena> ConcurrentMap<V, A> {
    /// Create a map with [`DEFAULT_CAPACITY`] buckets.
    pub fn new(arena: &A) -> Result<Self> {
        Self::with_capacity(arena, DEFAULT_CAPACITY)
    }

    /// Create a map with `capacity` buckets (at least [`MIN_CAPACITY`]).
    pub fn with_capacity(arena: &A, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(MIN_CAPACITY);
        let buckets = empty_buckets(arena, capacity)?;
        Ok(Self {
            lock: RwSpinLock::new(),
            state: UnsafeCell::new(MapState {
                capacity,
                buckets,
                order: LinkedList::new(arena.clone()),
                free_value: mem::drop::<V>,
            }),
            arena: arena.clone(),
        })
    }

    /// Create a map whose values are released through `free_value`.
    pub fn with_deleter(arena: &A, capacity: usize, free_value: FreeValueFn<V>) -> Result<Self> {
        let mut map = Self::with_capacity(arena, capacity)?;
        map.set_free_value_fn(free_value);
        Ok(map)
    }

    /// Replace the value deleter, including for entries already stored.
    pub fn set_free_value_fn(&mut self, free_value: FreeValueFn<V>) {
        let state = self.state.get_mut();
        state.free_value = free_value;
        for entry in state.order.iter_mut() {
            entry.release = free_value;
        }
    }

    fn read<R>(&self, f: impl FnOnce(&MapState<V, A>) -> R) -> R {
        let _guard = self.lock.read();
        // SAFETY: shared access under the read lock.
        f(unsafe { &*self.state.get() })
    }

    fn write<R>(&self, f: impl FnOnce(&mut MapState<V, A>) -> R) -> R {
        let _guard = self.lock.write();
        // SAFETY: exclusive access under the write lock.
        f(unsafe { &mut *self.state.get() })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.read(|state| state.order.len())
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current bucket count.
    pub fn capacity(&self) -> usize {
        self.read(|state| state.capacity)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.read(|state| state.find(key).is_some())
    }

    /// Clone of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.with(key, V::clone)
    }

    /// Run `f` on the value stored under `key` while holding the read lock.
    pub fn with<R>(&self, key: &str, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.read(|state| {
            state
                .find(key)
                // SAFETY: the entry is owned by `order` and the lock is held.
                .map(|entry| f(unsafe { &entry.as_ref().value }))
        })
    }

    /// Insert or replace the value under `key`.
    ///
    /// A replaced value goes through the deleter; the key storage is kept.
    pub fn set(&self, key: &str, value: V) -> Result<()> {
        self.write(|state| {
            if let Some(mut entry) = Self::prepare_insert(&self.arena, state, key)? {
                // SAFETY: exclusive access under the write lock.
                let entry = unsafe { entry.as_mut() };
                let old = mem::replace(&mut *entry.value, value);
                (entry.release)(old);
                return Ok(());
            }
            Self::insert_new(&self.arena, state, key, value)
        })
    }

    /// Insert `value` only if `key` is absent. Returns whether it was
    /// inserted; an existing value is left untouched and `value` is dropped.
    pub fn set_if_absent(&self, key: &str, value: V) -> Result<bool> {
        self.write(|state| {
            if Self::prepare_insert(&self.arena, state, key)?.is_some() {
                return Ok(false);
            }
            Self::insert_new(&self.arena, state, key, value)?;
            Ok(true)
        })
    }

    /// Remove `key`, releasing its key and value. Returns whether an entry
    /// was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.write(|state| {
            let index = bucket_index(key, state.capacity);
            let Some(target) = state.buckets[index]
                .remove_by(|entry| unsafe { entry.as_ref() }.key == key)
            else {
                return false;
            };
            state
                .order
                .remove_by(|entry| ArenaBox::as_ptr(entry) == target)
                .is_some()
        })
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.read(|state| state.order.iter().map(|entry| entry.key.to_string()).collect())
    }

    /// Cloned values in insertion order.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.read(|state| {
            state
                .order
                .iter()
                .map(|entry| V::clone(&entry.value))
                .collect()
        })
    }

    /// Visit every entry in insertion order under the read lock.
    pub fn for_each(&self, mut f: impl FnMut(&str, &V)) {
        self.read(|state| {
            for entry in state.order.iter() {
                f(entry.key.as_str(), &entry.value);
            }
        })
    }

    /// Grow if needed, then look up `key`.
    fn prepare_insert(
        arena: &A,
        state: &mut MapState<V, A>,
        key: &str,
    ) -> Result<Option<EntryRef<V, A>>> {
        if state.order.len() > state.capacity / 2 {
            Self::grow(arena, state)?;
        }
        Ok(state.find(key))
    }

    fn insert_new(arena: &A, state: &mut MapState<V, A>, key: &str, value: V) -> Result<()> {
        let key = ArenaStr::new(arena, key)?;
        let index = bucket_index(&key, state.capacity);
        // Plain drop until the entry is linked, so a failed insert never
        // hands a value the map did not own to the deleter.
        let entry = ArenaBox::new(
            arena,
            MapEntry {
                key,
                value: ManuallyDrop::new(value),
                release: mem::drop::<V>,
            },
        )?;
        let raw = ArenaBox::as_ptr(&entry);

        let chain_node = state.buckets[index].prepare(raw)?;
        let order_node = state.order.prepare(entry)?;
        // SAFETY: the entry is alive inside `order_node`.
        unsafe { (*raw.as_ptr()).release = state.free_value };

        state.buckets[index].append_pending(chain_node);
        state.order.append_pending(order_node);
        Ok(())
    }

    /// Double the bucket array. Entries stay where they are; only the chains
    /// are rebuilt, and nothing changes unless every allocation succeeds.
    fn grow(arena: &A, state: &mut MapState<V, A>) -> Result<()> {
        let capacity = state.capacity.saturating_mul(2);
        let mut buckets = empty_buckets(arena, capacity)?;
        for entry in state.order.iter() {
            let index = bucket_index(&entry.key, capacity);
            buckets[index].append(ArenaBox::as_ptr(entry))?;
        }

        tracing::debug!(
            from = state.capacity,
            to = capacity,
            len = state.order.len(),
            "map grown"
        );
        state.buckets = buckets;
        state.capacity = capacity;
        Ok(())
    }
}

impl<V, A: Arena> Drop for ConcurrentMap<V, A> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        // Chains first so no dangling references outlive their entries.
        for chain in state.buckets.iter_mut() {
            chain.purge();
        }
        state.order.purge();
    }
}

impl<V: fmt::Debug, A: Arena> fmt::Debug for ConcurrentMap<V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read(|state| {
            f.debug_map()
                .entries(
                    state
                        .order
                        .iter()
                        .map(|entry| (entry.key.as_str(), &*entry.value)),
                )
                .finish()
        })
    }
}
