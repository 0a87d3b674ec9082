//! Owning and reference-counted arena pointers.

use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicUsize, Ordering};

use super::{alloc_block, free_block, Arena};
use crate::error::Result;

/// Uniquely owned value stored in an arena.
pub struct ArenaBox<T, A: Arena> {
    ptr: NonNull<T>,
    arena: A,
    _owns: PhantomData<T>,
}

// SAFETY: ArenaBox owns its T exactly like Box does.
unsafe impl<T: Send, A: Arena> Send for ArenaBox<T, A> {}
unsafe impl<T: Sync, A: Arena> Sync for ArenaBox<T, A> {}

impl<T, A: Arena> ArenaBox<T, A> {
    /// Move `value` into a fresh arena block.
    ///
    /// On failure `value` is dropped and nothing stays allocated.
    pub fn new(arena: &A, value: T) -> Result<Self> {
        let ptr = alloc_block(arena, Layout::new::<T>())?.cast::<T>();
        // SAFETY: freshly allocated, properly aligned for T.
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self {
            ptr,
            arena: arena.clone(),
            _owns: PhantomData,
        })
    }

    /// Move the value out and free the block.
    pub fn into_inner(this: Self) -> T {
        let this = ManuallyDrop::new(this);
        // SAFETY: `this` is never dropped, so the value and the handle are
        // read out exactly once and the block is freed exactly once.
        unsafe {
            let value = ptr::read(this.ptr.as_ptr());
            let arena = ptr::read(&this.arena);
            free_block(&arena, this.ptr.cast(), Layout::new::<T>());
            value
        }
    }

    /// Stable address of the boxed value.
    ///
    /// The address stays valid for as long as the box is alive, even when
    /// the box itself is moved.
    pub fn as_ptr(this: &Self) -> NonNull<T> {
        this.ptr
    }
}

impl<T, A: Arena> Deref for ArenaBox<T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the pointer is valid and initialized while the box lives.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, A: Arena> DerefMut for ArenaBox<T, A> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: unique ownership.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T, A: Arena> Drop for ArenaBox<T, A> {
    fn drop(&mut self) {
        // SAFETY: the value is initialized and dropped exactly once here.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            free_block(&self.arena, self.ptr.cast(), Layout::new::<T>());
        }
    }
}

impl<T: fmt::Debug, A: Arena> fmt::Debug for ArenaBox<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

struct SharedInner<T> {
    refs: AtomicUsize,
    value: T,
}

/// Atomically reference-counted value stored in an arena.
///
/// The counter lives next to the value inside the arena block, so handles
/// cloned in different processes attached to the same segment agree on it.
pub struct Shared<T, A: Arena> {
    ptr: NonNull<SharedInner<T>>,
    arena: A,
    _owns: PhantomData<T>,
}

// SAFETY: same reasoning as std::sync::Arc.
unsafe impl<T: Send + Sync, A: Arena> Send for Shared<T, A> {}
unsafe impl<T: Send + Sync, A: Arena> Sync for Shared<T, A> {}

impl<T, A: Arena> Shared<T, A> {
    /// Move `value` into a fresh arena block with a reference count of one.
    pub fn new(arena: &A, value: T) -> Result<Self> {
        let ptr = alloc_block(arena, Layout::new::<SharedInner<T>>())?.cast::<SharedInner<T>>();
        // SAFETY: freshly allocated and aligned.
        unsafe {
            ptr.as_ptr().write(SharedInner {
                refs: AtomicUsize::new(1),
                value,
            })
        };
        Ok(Self {
            ptr,
            arena: arena.clone(),
            _owns: PhantomData,
        })
    }

    /// Whether both handles point at the same allocation.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr == other.ptr
    }

    /// Current number of handles.
    pub fn ref_count(this: &Self) -> usize {
        this.inner().refs.load(Ordering::Acquire)
    }

    /// Mutable access when this is the only handle.
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        if this.inner().refs.load(Ordering::Acquire) == 1 {
            // SAFETY: no other handle exists, so access is unique.
            Some(unsafe { &mut this.ptr.as_mut().value })
        } else {
            None
        }
    }

    fn inner(&self) -> &SharedInner<T> {
        // SAFETY: valid while at least one handle is alive.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, A: Arena> Clone for Shared<T, A> {
    fn clone(&self) -> Self {
        let old = self.inner().refs.fetch_add(1, Ordering::Relaxed);
        if old > isize::MAX as usize {
            std::process::abort();
        }
        Self {
            ptr: self.ptr,
            arena: self.arena.clone(),
            _owns: PhantomData,
        }
    }
}

impl<T, A: Arena> Deref for Shared<T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner().value
    }
}

impl<T, A: Arena> Drop for Shared<T, A> {
    fn drop(&mut self) {
        if self.inner().refs.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        fence(Ordering::Acquire);
        // SAFETY: last handle; nobody else can observe the value.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            free_block(
                &self.arena,
                self.ptr.cast(),
                Layout::new::<SharedInner<T>>(),
            );
        }
    }
}

impl<T: fmt::Debug, A: Arena> fmt::Debug for Shared<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::HeapArena;
    use crate::error::Error;

    #[test]
    fn test_box_roundtrip_frees_block() {
        let arena = HeapArena::new();
        let boxed = ArenaBox::new(&arena, 42u64).unwrap();
        assert_eq!(*boxed, 42);
        assert_eq!(arena.live_allocations(), 1);

        let value = ArenaBox::into_inner(boxed);
        assert_eq!(value, 42);
        assert_eq!(arena.live_allocations(), 0);
        assert_eq!(arena.in_use(), 0);
    }

    #[test]
    fn test_box_address_survives_move() {
        let arena = HeapArena::new();
        let boxed = ArenaBox::new(&arena, [7u8; 16]).unwrap();
        let before = ArenaBox::as_ptr(&boxed);
        let moved = vec![boxed];
        assert_eq!(ArenaBox::as_ptr(&moved[0]), before);
    }

    #[test]
    fn test_shared_refcount() {
        let arena = HeapArena::new();
        let a = Shared::new(&arena, String::from("sample")).unwrap();
        let b = a.clone();
        assert!(Shared::ptr_eq(&a, &b));
        assert_eq!(Shared::ref_count(&a), 2);

        drop(a);
        assert_eq!(Shared::ref_count(&b), 1);
        assert_eq!(arena.live_allocations(), 1);

        drop(b);
        assert_eq!(arena.live_allocations(), 0);
    }

    #[test]
    fn test_shared_get_mut_only_when_unique() {
        let arena = HeapArena::new();
        let mut a = Shared::new(&arena, 1u32).unwrap();
        *Shared::get_mut(&mut a).unwrap() = 5;
        let b = a.clone();
        assert!(Shared::get_mut(&mut a).is_none());
        assert_eq!(*b, 5);
    }

    #[test]
    fn test_box_exhaustion() {
        let arena = HeapArena::with_limit(8);
        let err = ArenaBox::new(&arena, [0u8; 64]).unwrap_err();
        assert!(matches!(err, Error::AllocationExhausted { requested: 64 }));
        assert_eq!(arena.in_use(), 0);
    }
}
