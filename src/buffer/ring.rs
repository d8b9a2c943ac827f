//! Fixed-capacity circular buffer with oldest-first eviction.

use crate::error::{Result, TailError};
use std::mem;

/// Fixed-capacity ring buffer.
///
/// Slots fill in push order until the buffer is full; after that every push
/// overwrites the oldest slot and advances `start`. The buffer knows nothing
/// about concurrency; [`SnapshotStore`](crate::SnapshotStore) owns one behind
/// a lock.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    /// Backing storage. Grows up to `capacity` and is never longer.
    slots: Vec<T>,
    /// Index of the oldest item.
    start: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` items.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(TailError::InvalidCapacity);
        }
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            start: 0,
            capacity,
        })
    }

    /// Push an item, evicting and returning the oldest one when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.slots.len() < self.capacity {
            // Not full yet, so `start` is still 0 and the next free slot is
            // `(start + size) % capacity == size`.
            self.slots.push(item);
            return None;
        }

        let evicted = mem::replace(&mut self.slots[self.start], item);
        self.start = (self.start + 1) % self.capacity;
        Some(evicted)
    }

    /// Number of items currently stored.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index of the oldest slot.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Most recently pushed item.
    pub fn newest(&self) -> Option<&T> {
        self.iter_newest_first().next()
    }

    /// Oldest item still retained.
    pub fn oldest(&self) -> Option<&T> {
        self.iter_oldest_first().next()
    }

    /// Iterate from oldest to newest without copying.
    pub fn iter_oldest_first(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        let (tail, head) = self.slots.split_at(self.start);
        head.iter().chain(tail.iter())
    }

    /// Iterate from newest to oldest without copying.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> + '_ {
        self.iter_oldest_first().rev()
    }

    /// Change the capacity, keeping the newest items that still fit.
    ///
    /// Contents are replayed oldest-first into fresh storage, so shrinking
    /// drops the oldest excess items.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(TailError::InvalidCapacity);
        }
        if capacity == self.capacity {
            return Ok(());
        }

        let start = self.start;
        let mut items = mem::take(&mut self.slots);
        items.rotate_left(start);
        let excess = items.len().saturating_sub(capacity);
        items.drain(..excess);

        self.slots = Vec::with_capacity(capacity);
        self.start = 0;
        self.capacity = capacity;
        for item in items {
            self.push(item);
        }
        Ok(())
    }

    /// Drop all items. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.start = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy the contents into a fresh vector, newest first.
    ///
    /// The result never aliases the buffer's storage.
    pub fn to_vec_newest_first(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.slots.len());
        out.extend(self.iter_newest_first().cloned());
        out
    }
}
