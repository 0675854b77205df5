//! Comparator-driven binary max-heap.
//!
//! Both merge engines keep their pending merges in this heap. It differs from
//! [`std::collections::BinaryHeap`] in two ways that the merge loops rely on:
//!
//! - Ordering comes from a caller-supplied comparator instead of `Ord`, so a
//!   candidate type can rank by score and break ties by position without a
//!   newtype per policy.
//! - [`PriorityQueue::remove_matching`] drops every element matching a
//!   predicate in one linear pass and rebuilds the heap. The merge loops call
//!   it to purge stale candidates in bulk instead of paying for them one pop
//!   at a time.

use std::cmp::Ordering;

/// Binary max-heap ordered by a comparator closure.
///
/// `pop_max` always returns an element that compares `>=` every other element
/// currently held. Elements that compare equal come out in an unspecified
/// order, so comparators that need determinism must break ties themselves.
pub struct PriorityQueue<T, F> {
    items: Vec<T>,
    cmp: F,
}

impl<T, F> PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    pub fn new(cmp: F) -> Self {
        Self::with_capacity(0, cmp)
    }

    pub fn with_capacity(capacity: usize, cmp: F) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            cmp,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Largest element, without removing it.
    #[inline]
    pub fn peek_max(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn insert(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Remove and return the largest element, or `None` when empty.
    pub fn pop_max(&mut self) -> Option<T> {
        let last = self.items.pop()?;
        if self.items.is_empty() {
            return Some(last);
        }
        let top = std::mem::replace(&mut self.items[0], last);
        self.sift_down(0);
        Some(top)
    }

    /// Drop every element for which `predicate` returns true, then restore the
    /// heap property. O(n).
    pub fn remove_matching(&mut self, mut predicate: impl FnMut(&T) -> bool) {
        let before = self.items.len();
        self.items.retain(|item| !predicate(item));
        if self.items.len() != before {
            self.rebuild();
        }
    }

    fn rebuild(&mut self) {
        for i in (0..self.items.len() / 2).rev() {
            self.sift_down(i);
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if (self.cmp)(&self.items[parent], &self.items[i]) != Ordering::Less {
                return;
            }
            self.items.swap(parent, i);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                return;
            }
            let right = left + 1;
            let mut max_child = left;
            if right < len && (self.cmp)(&self.items[right], &self.items[left]) == Ordering::Greater
            {
                max_child = right;
            }
            if (self.cmp)(&self.items[i], &self.items[max_child]) != Ordering::Less {
                return;
            }
            self.items.swap(i, max_child);
            i = max_child;
        }
    }
}
