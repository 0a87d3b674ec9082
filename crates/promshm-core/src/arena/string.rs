//! Immutable arena strings.

use std::alloc::Layout;
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;

use super::{free_block, Arena};
use crate::error::{Error, Result};

/// A string duplicated into the arena.
///
/// The copy is `len + 1` bytes with a trailing NUL so that it can be handed
/// to C code sharing the segment.
pub struct ArenaStr<A: Arena> {
    ptr: NonNull<u8>,
    len: usize,
    arena: A,
}

// SAFETY: the bytes are immutable after construction.
unsafe impl<A: Arena> Send for ArenaStr<A> {}
unsafe impl<A: Arena> Sync for ArenaStr<A> {}

impl<A: Arena> ArenaStr<A> {
    /// Copy `s` into the arena.
    pub fn new(arena: &A, s: &str) -> Result<Self> {
        let layout = Self::layout(s.len())?;
        let ptr = arena.allocate(layout)?;
        // SAFETY: the block holds `len + 1` bytes and does not overlap `s`.
        unsafe {
            ptr.as_ptr().copy_from_nonoverlapping(s.as_ptr(), s.len());
            ptr.as_ptr().add(s.len()).write(0);
        }
        Ok(Self {
            ptr,
            len: s.len(),
            arena: arena.clone(),
        })
    }

    /// The string contents.
    pub fn as_str(&self) -> &str {
        // SAFETY: copied from a valid &str and never mutated.
        unsafe {
            std::str::from_utf8_unchecked(std::slice::from_raw_parts(self.ptr.as_ptr(), self.len))
        }
    }

    /// The contents including the trailing NUL.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        // SAFETY: the block is `len + 1` initialized bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len + 1) }
    }

    fn layout(len: usize) -> Result<Layout> {
        let size = len
            .checked_add(1)
            .ok_or(Error::AllocationExhausted { requested: usize::MAX })?;
        Layout::array::<u8>(size).map_err(|_| Error::AllocationExhausted { requested: size })
    }
}

impl<A: Arena> Drop for ArenaStr<A> {
    fn drop(&mut self) {
        // The layout was valid at construction, so it is valid now.
        if let Ok(layout) = Self::layout(self.len) {
            // SAFETY: allocated in `new` with this layout.
            unsafe { free_block(&self.arena, self.ptr, layout) };
        }
    }
}

impl<A: Arena> Deref for ArenaStr<A> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl<A: Arena> AsRef<str> for ArenaStr<A> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl<A: Arena> PartialEq for ArenaStr<A> {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl<A: Arena> Eq for ArenaStr<A> {}

impl<A: Arena> PartialEq<str> for ArenaStr<A> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<A: Arena> PartialEq<&str> for ArenaStr<A> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl<A: Arena> fmt::Display for ArenaStr<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<A: Arena> fmt::Debug for ArenaStr<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::HeapArena;

    #[test]
    fn test_copy_is_nul_terminated() {
        let arena = HeapArena::new();
        let s = ArenaStr::new(&arena, "http_requests_total").unwrap();
        assert_eq!(s.as_str(), "http_requests_total");
        assert_eq!(s.as_bytes_with_nul().len(), "http_requests_total".len() + 1);
        assert_eq!(*s.as_bytes_with_nul().last().unwrap(), 0);
        assert_eq!(arena.in_use(), "http_requests_total".len() + 1);
    }

    #[test]
    fn test_empty_string_still_allocates_terminator() {
        let arena = HeapArena::new();
        let s = ArenaStr::new(&arena, "").unwrap();
        assert!(s.is_empty());
        assert_eq!(s.as_bytes_with_nul(), &[0]);
        drop(s);
        assert_eq!(arena.in_use(), 0);
    }

    #[test]
    fn test_equality() {
        let arena = HeapArena::new();
        let a = ArenaStr::new(&arena, "GET").unwrap();
        let b = ArenaStr::new(&arena, "GET").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "GET");
        assert_ne!(a, "get");
    }
}
