//! Bounded double-ended block stack.
//!
//! Elements live in an arena of slots linked by index, newest at the head and
//! oldest at the tail. Push, pop and tail eviction are all O(1); freed slots are
//! recycled through a free list so a bounded cache never grows past `limit + 1`
//! slots.

use std::fmt;

use crate::core::error::EmptyCacheError;

#[derive(Debug)]
struct Slot<T> {
    item: Option<T>,
    /// Towards the head (newer).
    prev: Option<usize>,
    /// Towards the tail (older).
    next: Option<usize>,
}

pub struct BlockCache<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    count: usize,
    limit: Option<usize>,
}

impl<T> BlockCache<T> {
    /// Create a cache. `None` means unbounded.
    pub fn new(limit: Option<usize>) -> Self {
        let capacity = limit.map(|l| l.saturating_add(1)).unwrap_or_default();
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            count: 0,
            limit,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Insert at the head, evicting the oldest element if the limit is exceeded.
    /// Returns the evicted element, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let idx = self.alloc(item);
        match self.head {
            Some(old_head) => {
                self.slots[idx].next = Some(old_head);
                self.slots[old_head].prev = Some(idx);
            }
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
        self.count += 1;

        match self.limit {
            Some(limit) if self.count > limit => self.remove_tail(),
            _ => None,
        }
    }

    /// Remove and return the head element.
    pub fn pop(&mut self) -> Result<T, EmptyCacheError> {
        let idx = self.head.ok_or(EmptyCacheError)?;
        self.head = self.slots[idx].next;
        match self.head {
            Some(new_head) => self.slots[new_head].prev = None,
            None => self.tail = None,
        }
        self.count -= 1;
        self.release(idx).ok_or(EmptyCacheError)
    }

    /// Borrow the head element without removing it.
    pub fn peek(&self) -> Result<&T, EmptyCacheError> {
        self.head
            .and_then(|idx| self.slots[idx].item.as_ref())
            .ok_or(EmptyCacheError)
    }

    /// Iterate head-first.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            cache: self,
            cursor: self.head,
        }
    }

    fn remove_tail(&mut self) -> Option<T> {
        let idx = self.tail?;
        self.tail = self.slots[idx].prev;
        match self.tail {
            Some(new_tail) => self.slots[new_tail].next = None,
            None => self.head = None,
        }
        self.count -= 1;
        self.release(idx)
    }

    fn alloc(&mut self, item: T) -> usize {
        let slot = Slot {
            item: Some(item),
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) -> Option<T> {
        let slot = &mut self.slots[idx];
        slot.prev = None;
        slot.next = None;
        self.free.push(idx);
        slot.item.take()
    }
}

impl<T: Clone> BlockCache<T> {
    /// Head-first copy of every element. O(n); diagnostics and persistence only.
    pub fn snapshot(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> Default for BlockCache<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T: fmt::Debug> fmt::Debug for BlockCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

pub struct Iter<'a, T> {
    cache: &'a BlockCache<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let slot = &self.cache.slots[idx];
        self.cursor = slot.next;
        slot.item.as_ref()
    }
}
