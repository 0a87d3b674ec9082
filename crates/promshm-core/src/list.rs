//! Singly linked list over arena-allocated nodes.
//!
//! Each node is its own arena block, allocated on insert and returned on
//! removal. The list optionally carries a deleter, applied to items it
//! discards itself (`purge`, `remove`, drop), and a comparator used by
//! `remove` to locate an item.

use std::cmp::Ordering;
use std::fmt;
use std::ptr::NonNull;

use crate::arena::{Arena, ArenaBox};
use crate::error::Result;

/// Item deleter.
pub type FreeFn<T> = fn(T);

/// Item comparator.
pub type CompareFn<T> = fn(&T, &T) -> Ordering;

struct Node<T, A: Arena> {
    item: T,
    next: Option<ArenaBox<Node<T, A>, A>>,
}

/// A node allocated ahead of linking, so that several lists can be updated
/// together once every allocation has succeeded.
pub(crate) struct PendingNode<T, A: Arena> {
    node: ArenaBox<Node<T, A>, A>,
}

/// Singly linked list with O(1) append and push.
pub struct LinkedList<T, A: Arena> {
    head: Option<ArenaBox<Node<T, A>, A>>,
    tail: Option<NonNull<Node<T, A>>>,
    len: usize,
    free_fn: Option<FreeFn<T>>,
    compare_fn: Option<CompareFn<T>>,
    arena: A,
}

// SAFETY: `tail` only ever points into the chain owned through `head`.
unsafe impl<T: Send, A: Arena> Send for LinkedList<T, A> {}
unsafe impl<T: Sync, A: Arena> Sync for LinkedList<T, A> {}

impl<T, A: Arena> LinkedList<T, A> {
    /// Create an empty list. No memory is allocated until the first insert.
    pub fn new(arena: A) -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            free_fn: None,
            compare_fn: None,
            arena,
        }
    }

    /// Create an empty list whose discarded items go through `free_fn`.
    pub fn with_deleter(arena: A, free_fn: FreeFn<T>) -> Self {
        let mut list = Self::new(arena);
        list.free_fn = Some(free_fn);
        list
    }

    /// Set the deleter applied to items the list discards.
    pub fn set_free_fn(&mut self, free_fn: FreeFn<T>) {
        self.free_fn = Some(free_fn);
    }

    /// Set the comparator used by [`remove`](Self::remove).
    pub fn set_compare_fn(&mut self, compare_fn: CompareFn<T>) {
        self.compare_fn = Some(compare_fn);
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Peek at the head item.
    pub fn first(&self) -> Option<&T> {
        self.head.as_deref().map(|node| &node.item)
    }

    /// Peek at the tail item.
    pub fn last(&self) -> Option<&T> {
        // SAFETY: `tail` points at the last node owned by this list.
        self.tail.map(|tail| unsafe { &(*tail.as_ptr()).item })
    }

    /// Insert at the tail.
    pub fn append(&mut self, item: T) -> Result<()> {
        let pending = self.prepare(item)?;
        self.append_pending(pending);
        Ok(())
    }

    /// Insert at the head.
    pub fn push(&mut self, item: T) -> Result<()> {
        let PendingNode { mut node } = self.prepare(item)?;
        let raw = ArenaBox::as_ptr(&node);
        node.next = self.head.take();
        if self.tail.is_none() {
            self.tail = Some(raw);
        }
        self.head = Some(node);
        self.len += 1;
        Ok(())
    }

    /// Remove the head node and hand its item to the caller.
    pub fn pop(&mut self) -> Option<T> {
        let mut node = self.head.take()?;
        self.head = node.next.take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(ArenaBox::into_inner(node).item)
    }

    /// Remove every node, releasing items through the deleter.
    pub fn purge(&mut self) {
        while let Some(item) = self.pop() {
            self.release(item);
        }
    }

    /// Remove the first item equal to `item` and release it.
    ///
    /// Equality is the comparator returning [`Ordering::Equal`] when one is
    /// set, and `==` otherwise (address identity for pointer items).
    /// Returns whether a node was removed; a missing item is not an error.
    pub fn remove(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let compare_fn = self.compare_fn;
        let removed = self.remove_by(|candidate| match compare_fn {
            Some(compare) => compare(candidate, item) == Ordering::Equal,
            None => candidate == item,
        });
        match removed {
            Some(found) => {
                self.release(found);
                true
            }
            None => false,
        }
    }

    /// Unlink the first item matching `pred` and return it without
    /// applying the deleter.
    pub fn remove_by(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let mut prev: Option<NonNull<Node<T, A>>> = None;
        let mut link = &mut self.head;
        while link.as_ref().is_some_and(|node| !pred(&node.item)) {
            let node = link.as_mut()?;
            prev = Some(ArenaBox::as_ptr(node));
            link = &mut node.next;
        }

        let mut removed = link.take()?;
        *link = removed.next.take();
        if link.is_none() {
            self.tail = prev;
        }
        self.len -= 1;
        Some(ArenaBox::into_inner(removed).item)
    }

    /// Iterate over items from head to tail.
    pub fn iter(&self) -> Iter<'_, T, A> {
        Iter {
            next: self.head.as_deref(),
        }
    }

    /// Iterate mutably over items from head to tail.
    pub fn iter_mut(&mut self) -> IterMut<'_, T, A> {
        IterMut {
            next: self.head.as_deref_mut(),
        }
    }

    /// Allocate a node for `item` without linking it.
    pub(crate) fn prepare(&self, item: T) -> Result<PendingNode<T, A>> {
        let node = ArenaBox::new(&self.arena, Node { item, next: None })?;
        Ok(PendingNode { node })
    }

    /// Link a prepared node at the tail. Cannot fail.
    pub(crate) fn append_pending(&mut self, pending: PendingNode<T, A>) {
        let PendingNode { node } = pending;
        let raw = ArenaBox::as_ptr(&node);
        match self.tail {
            // SAFETY: `tail` points at the last node owned by this list.
            Some(tail) => unsafe { (*tail.as_ptr()).next = Some(node) },
            None => self.head = Some(node),
        }
        self.tail = Some(raw);
        self.len += 1;
    }

    fn release(&self, item: T) {
        match self.free_fn {
            Some(free_fn) => free_fn(item),
            None => drop(item),
        }
    }
}

impl<T, A: Arena> Drop for LinkedList<T, A> {
    fn drop(&mut self) {
        self.purge();
    }
}

impl<T: fmt::Debug, A: Arena> fmt::Debug for LinkedList<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Borrowing iterator over a [`LinkedList`].
pub struct Iter<'a, T, A: Arena> {
    next: Option<&'a Node<T, A>>,
}

impl<'a, T, A: Arena> Iterator for Iter<'a, T, A> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let node = self.next?;
        self.next = node.next.as_deref();
        Some(&node.item)
    }
}

/// Mutable iterator over a [`LinkedList`].
pub struct IterMut<'a, T, A: Arena> {
    next: Option<&'a mut Node<T, A>>,
}

impl<'a, T, A: Arena> Iterator for IterMut<'a, T, A> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<&'a mut T> {
        let node = self.next.take()?;
        self.next = node.next.as_deref_mut();
        Some(&mut node.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ArenaStr, HeapArena};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn collect(list: &LinkedList<u32, HeapArena>) -> Vec<u32> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_append_and_push() {
        let arena = HeapArena::new();
        let mut list = LinkedList::new(arena.clone());
        list.append(2).unwrap();
        list.append(3).unwrap();
        list.push(1).unwrap();

        assert_eq!(collect(&list), vec![1, 2, 3]);
        assert_eq!(list.first(), Some(&1));
        assert_eq!(list.last(), Some(&3));
        assert_eq!(list.len(), 3);
        assert_eq!(arena.live_allocations(), 3);
    }

    #[test]
    fn test_push_into_empty_sets_tail() {
        let mut list = LinkedList::new(HeapArena::new());
        list.push(9).unwrap();
        assert_eq!(list.last(), Some(&9));
        list.append(10).unwrap();
        assert_eq!(collect(&list), vec![9, 10]);
    }

    #[test]
    fn test_pop_until_empty() {
        let arena = HeapArena::new();
        let mut list = LinkedList::new(arena.clone());
        for i in 0..3 {
            list.append(i).unwrap();
        }
        assert_eq!(list.pop(), Some(0));
        assert_eq!(list.pop(), Some(1));
        assert_eq!(list.pop(), Some(2));
        assert_eq!(list.pop(), None);
        assert!(list.first().is_none());
        assert!(list.last().is_none());
        assert_eq!(arena.live_allocations(), 0);
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let mut list = LinkedList::new(HeapArena::new());
        for i in 1..=5 {
            list.append(i).unwrap();
        }
        assert!(list.remove(&3));
        assert!(list.remove(&1));
        assert!(list.remove(&5));
        assert!(!list.remove(&42));
        assert_eq!(collect(&list), vec![2, 4]);
        assert_eq!(list.last(), Some(&4));

        // tail must still be correct for appends after removing the old tail
        list.append(6).unwrap();
        assert_eq!(collect(&list), vec![2, 4, 6]);
    }

    #[test]
    fn test_remove_with_comparator() {
        fn by_len(a: &String, b: &String) -> Ordering {
            a.len().cmp(&b.len())
        }
        let mut list = LinkedList::new(HeapArena::new());
        list.set_compare_fn(by_len);
        list.append("a".to_string()).unwrap();
        list.append("bbb".to_string()).unwrap();
        assert!(list.remove(&"xyz".to_string()));
        assert_eq!(list.iter().cloned().collect::<Vec<_>>(), vec!["a".to_string()]);
    }

    #[test]
    fn test_remove_pointer_items_by_address() {
        let values = [7u32, 7, 7];
        let ptrs: Vec<NonNull<u32>> = values.iter().map(NonNull::from).collect();
        let mut list = LinkedList::new(HeapArena::new());
        for ptr in &ptrs {
            list.append(*ptr).unwrap();
        }
        assert!(list.remove(&ptrs[1]));
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![ptrs[0], ptrs[2]]);
    }

    static RELEASED: AtomicUsize = AtomicUsize::new(0);

    fn count_release(_item: u32) {
        RELEASED.fetch_add(1, AtomicOrdering::SeqCst);
    }

    #[test]
    fn test_deleter_runs_on_purge_and_remove_only() {
        RELEASED.store(0, AtomicOrdering::SeqCst);
        let mut list = LinkedList::with_deleter(HeapArena::new(), count_release);
        for i in 0..4 {
            list.append(i).unwrap();
        }

        assert_eq!(list.pop(), Some(0));
        assert_eq!(RELEASED.load(AtomicOrdering::SeqCst), 0);

        assert!(list.remove(&2));
        assert_eq!(RELEASED.load(AtomicOrdering::SeqCst), 1);

        list.purge();
        assert_eq!(RELEASED.load(AtomicOrdering::SeqCst), 3);
        assert!(list.is_empty());
    }

    #[test]
    fn test_drop_frees_items_and_nodes() {
        let arena = HeapArena::new();
        {
            let mut list = LinkedList::new(arena.clone());
            for name in ["GET", "POST", "PUT"] {
                list.append(ArenaStr::new(&arena, name).unwrap()).unwrap();
            }
            assert_eq!(arena.live_allocations(), 6);
        }
        assert_eq!(arena.live_allocations(), 0);
        assert_eq!(arena.in_use(), 0);
    }

    #[test]
    fn test_append_failure_leaves_list_untouched() {
        let arena = HeapArena::with_limit(64);
        let mut list = LinkedList::new(arena.clone());
        let mut appended = 0;
        while list.append(appended).is_ok() {
            appended += 1;
        }
        assert_eq!(list.len(), appended as usize);
        assert_eq!(collect(&list), (0..appended).collect::<Vec<_>>());
    }

    #[test]
    fn test_iter_mut() {
        let mut list = LinkedList::new(HeapArena::new());
        for i in 0..3 {
            list.append(i).unwrap();
        }
        for item in list.iter_mut() {
            *item *= 10;
        }
        assert_eq!(collect(&list), vec![0, 10, 20]);
    }
}
