//! Arena allocation boundary.
//!
//! Every object in the store is carved out of an [`Arena`], normally a
//! slab pool living inside a shared-memory segment that several worker
//! processes attach. The store never frees memory anywhere else: each
//! arena-owned pointer keeps the handle it was allocated from and returns
//! its block through that same handle when dropped.
//!
//! The smart pointers here mirror their `std` counterparts:
//!
//! - [`ArenaBox`] owns a single value (`Box`).
//! - [`Shared`] is an atomically reference-counted value (`Arc`).
//! - [`ArenaStr`] is an immutable, NUL-terminated string copy.
//! - [`ArenaSlice`] is a fixed-length array built element by element.
//!
//! [`HeapArena`] is a reference implementation over the global allocator
//! with an optional byte budget, used by hosts without a dedicated segment
//! and by the test suite to check that nothing leaks.

mod boxed;
mod heap;
mod slice;
mod string;

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::error::Result;

pub use boxed::{ArenaBox, Shared};
pub use heap::HeapArena;
pub use slice::ArenaSlice;
pub use string::ArenaStr;

/// Size-addressed allocator over a pre-existing memory region.
///
/// Handles are cloned into every object built from them, so they should be
/// cheap to clone (a pointer to the pool, or an `Arc`).
pub trait Arena: Clone + Send + Sync {
    /// Allocate a block for `layout`. `layout.size()` is never zero.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>>;

    /// Allocate a zero-filled block for `layout`.
    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>> {
        let ptr = self.allocate(layout)?;
        // SAFETY: the block is at least `layout.size()` bytes and exclusively ours.
        unsafe { ptr.as_ptr().write_bytes(0, layout.size()) };
        Ok(ptr)
    }

    /// Return a block to the arena.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` (or `allocate_zeroed`) on
    /// this arena with the same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Allocate `layout`, handing out a dangling aligned pointer for zero sizes.
pub(crate) fn alloc_block<A: Arena>(arena: &A, layout: Layout) -> Result<NonNull<u8>> {
    if layout.size() == 0 {
        // SAFETY: alignment is always non-zero.
        return Ok(unsafe { NonNull::new_unchecked(layout.align() as *mut u8) });
    }
    arena.allocate(layout)
}

/// Counterpart of [`alloc_block`].
///
/// # Safety
///
/// Same contract as [`Arena::deallocate`].
pub(crate) unsafe fn free_block<A: Arena>(arena: &A, ptr: NonNull<u8>, layout: Layout) {
    if layout.size() != 0 {
        arena.deallocate(ptr, layout);
    }
}
