//! Fixed-length arena arrays.

use std::alloc::Layout;
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

use super::{alloc_block, free_block, Arena};
use crate::error::{Error, Result};

/// A fixed-length array stored in an arena.
pub struct ArenaSlice<T, A: Arena> {
    ptr: NonNull<T>,
    len: usize,
    arena: A,
}

// SAFETY: owns its elements like Box<[T]>.
unsafe impl<T: Send, A: Arena> Send for ArenaSlice<T, A> {}
unsafe impl<T: Sync, A: Arena> Sync for ArenaSlice<T, A> {}

/// Drops the initialized prefix and frees the block if construction bails out.
struct PartialInit<'a, T, A: Arena> {
    ptr: NonNull<T>,
    initialized: usize,
    layout: Layout,
    arena: &'a A,
}

impl<T, A: Arena> Drop for PartialInit<'_, T, A> {
    fn drop(&mut self) {
        // SAFETY: exactly `initialized` leading elements were written.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.initialized,
            ));
            free_block(self.arena, self.ptr.cast(), self.layout);
        }
    }
}

impl<T, A: Arena> ArenaSlice<T, A> {
    /// Build `len` elements with `init`, in index order.
    ///
    /// If `init` or the allocation fails, every element built so far is
    /// dropped and the block is returned before the error propagates.
    pub fn from_fn<F>(arena: &A, len: usize, mut init: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<T>,
    {
        let layout = Layout::array::<T>(len).map_err(|_| Error::AllocationExhausted {
            requested: len.saturating_mul(mem::size_of::<T>()),
        })?;
        let ptr = alloc_block(arena, layout)?.cast::<T>();

        let mut guard = PartialInit {
            ptr,
            initialized: 0,
            layout,
            arena,
        };
        for i in 0..len {
            let value = init(i)?;
            // SAFETY: `i < len`, slot not yet written.
            unsafe { guard.ptr.as_ptr().add(i).write(value) };
            guard.initialized += 1;
        }
        mem::forget(guard);

        Ok(Self {
            ptr,
            len,
            arena: arena.clone(),
        })
    }

    /// Copy `items` into the arena.
    pub fn from_slice(arena: &A, items: &[T]) -> Result<Self>
    where
        T: Clone,
    {
        Self::from_fn(arena, items.len(), |i| Ok(items[i].clone()))
    }

    fn layout(&self) -> Layout {
        // Construction already proved this layout valid.
        Layout::array::<T>(self.len).unwrap_or_else(|_| Layout::new::<T>())
    }
}

impl<T, A: Arena> Deref for ArenaSlice<T, A> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: `len` initialized elements.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T, A: Arena> DerefMut for ArenaSlice<T, A> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: unique ownership of `len` initialized elements.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T, A: Arena> Drop for ArenaSlice<T, A> {
    fn drop(&mut self) {
        let layout = self.layout();
        // SAFETY: elements initialized in `from_fn`, dropped once here.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len));
            free_block(&self.arena, self.ptr.cast(), layout);
        }
    }
}

impl<T: fmt::Debug, A: Arena> fmt::Debug for ArenaSlice<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
