//! Fixed-capacity FIFO shared by the durable queue and the history stack.

use std::collections::VecDeque;

/// Ordered buffer that never grows past `capacity`.
///
/// Pushing onto a full buffer evicts the oldest element and hands it back to
/// the caller, so eviction is always observable. Retained elements are never
/// reordered.
#[derive(Clone, Debug)]
pub struct Bounded<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Bounded<T> {
    /// A capacity of zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Bounded {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append at the tail, returning the evicted head if the buffer was full.
    pub fn push_back(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Insert keeping the buffer ordered by `key`, scanning from the tail.
    ///
    /// Equal keys keep arrival order. When full, the element that ends up
    /// first is evicted, which is `item` itself if it sorts before everything
    /// retained.
    pub fn insert_ordered_by_key<K, F>(&mut self, item: T, key: F) -> Option<T>
    where
        K: Ord,
        F: Fn(&T) -> K,
    {
        let at = key(&item);
        let pos = self
            .items
            .iter()
            .rposition(|existing| key(existing) <= at)
            .map_or(0, |index| index + 1);

        if self.items.len() < self.capacity {
            self.items.insert(pos, item);
            return None;
        }
        if pos == 0 {
            return Some(item);
        }
        let evicted = self.items.pop_front();
        self.items.insert(pos - 1, item);
        evicted
    }

    pub fn pop_back(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Keep only elements matching `pred`, preserving order.
    pub fn retain<F>(&mut self, pred: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.items.retain(pred);
    }

    /// Shrink to the newest `len` elements, returning how many were dropped.
    pub fn truncate_front(&mut self, len: usize) -> usize {
        let excess = self.items.len().saturating_sub(len);
        self.items.drain(..excess);
        excess
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> Bounded<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
