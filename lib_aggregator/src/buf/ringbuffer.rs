//! # Synchronized Ring Buffer
//!
//! A fixed-capacity circular container holding the most recent `N` items
//! pushed into it. Used for event-style sources (e.g. social posts) where the
//! HTTP layer only ever wants "the last few things that happened".
//!
//! ## Locking Discipline:
//! - **Writers** (`add`) take the exclusive side of a `RwLock`. There is
//!   normally a single producer task per buffer, but several producers are
//!   also safe because every `add` is linearized by the lock.
//! - **Readers** (`for_each`, `latest`, `last`) take the shared side, so any
//!   number of HTTP handlers can walk the buffer at the same time. They only
//!   ever wait for an in-progress `add`, which is O(1).
//!
//! Slots that were never written are `None` and are never visited.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

/// Errors raised while constructing a [`RingBuffer`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// A ring with no slots cannot hold anything and is rejected up front.
    #[error("ring buffer capacity must be greater than zero")]
    ZeroCapacity,
}

/// Slot storage plus the index of the slot the next `add` will overwrite.
struct Ring<E> {
    slots: Vec<Option<E>>,
    /// Next slot to write. Once the ring has wrapped this is also the oldest item.
    head: usize,
    /// Number of occupied slots, saturating at `slots.len()`.
    filled: usize,
}

impl<E> Ring<E> {
    /// Index of the oldest surviving item.
    fn oldest(&self) -> usize {
        if self.filled < self.slots.len() {
            0
        } else {
            self.head
        }
    }
}

/// # Ring Buffer
///
/// Fixed-capacity, thread-safe circular buffer. Once full, every `add`
/// overwrites the logically oldest item.
pub struct RingBuffer<E> {
    inner: RwLock<Ring<E>>,
}

impl<E> RingBuffer<E> {
    /// Creates an empty buffer with `capacity` slots.
    ///
    /// # Errors
    /// Returns [`BufferError::ZeroCapacity`] when `capacity` is `0`.
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Ok(Self {
            inner: RwLock::new(Ring {
                slots,
                head: 0,
                filled: 0,
            }),
        })
    }

    // A panic inside a visitor must not take the buffer down for every other
    // reader, so poisoning is ignored: slots are always left in a valid state.
    fn read(&self) -> RwLockReadGuard<'_, Ring<E>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ring<E>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `item`, overwriting the oldest item if the buffer is full.
    pub fn add(&self, item: E) {
        let mut ring = self.write();
        let head = ring.head;
        let capacity = ring.slots.len();

        ring.slots[head] = Some(item);
        ring.head = (head + 1) % capacity;
        if ring.filled < capacity {
            ring.filled += 1;
        }
    }

    /// Visits every stored item once, oldest first.
    ///
    /// Concurrent `for_each` calls run in parallel; an `add` waits until all of
    /// them are done.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&E),
    {
        let ring = self.read();
        let capacity = ring.slots.len();
        let start = ring.oldest();

        for offset in 0..capacity {
            if let Some(item) = &ring.slots[(start + offset) % capacity] {
                visit(item);
            }
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.read().slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.read().filled
    }

    /// `true` until the first `add`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone> RingBuffer<E> {
    /// Returns the most recently added item, or `None` if nothing was added yet.
    pub fn last(&self) -> Option<E> {
        let ring = self.read();
        let capacity = ring.slots.len();
        let prev = (ring.head + capacity - 1) % capacity;
        ring.slots[prev].clone()
    }

    /// Returns up to `count` items, newest first.
    pub fn latest(&self, count: usize) -> Vec<E> {
        let mut items = Vec::with_capacity(count.min(self.capacity()));
        self.for_each(|item| items.push(item.clone()));
        items.reverse();
        items.truncate(count);
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn collect(buffer: &RingBuffer<u32>) -> Vec<u32> {
        let mut seen = Vec::new();
        buffer.for_each(|v| seen.push(*v));
        seen
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(RingBuffer::<u32>::new(0).err(), Some(BufferError::ZeroCapacity));
    }

    #[test]
    fn fresh_buffer_visits_nothing() {
        let buffer = RingBuffer::<u32>::new(4).unwrap();
        assert!(collect(&buffer).is_empty());
        assert_eq!(buffer.last(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn last_tracks_every_add() {
        let buffer = RingBuffer::new(3).unwrap();
        for i in 0..10u32 {
            buffer.add(i);
            assert_eq!(buffer.last(), Some(i));
        }
    }

    #[test]
    fn partially_filled_buffer_skips_empty_slots() {
        let buffer = RingBuffer::new(10).unwrap();
        buffer.add(1);
        buffer.add(2);
        buffer.add(3);

        assert_eq!(collect(&buffer), vec![1, 2, 3]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn overflow_keeps_last_n_in_insertion_order() {
        let buffer = RingBuffer::new(4).unwrap();
        for i in 0..11u32 {
            buffer.add(i);
        }

        assert_eq!(collect(&buffer), vec![7, 8, 9, 10]);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.latest(2), vec![10, 9]);
        assert_eq!(buffer.latest(100), vec![10, 9, 8, 7]);
    }

    #[test]
    fn exactly_full_buffer_starts_at_first_item() {
        let buffer = RingBuffer::new(3).unwrap();
        buffer.add(1);
        buffer.add(2);
        buffer.add(3);

        assert_eq!(collect(&buffer), vec![1, 2, 3]);
        assert_eq!(buffer.last(), Some(3));
    }

    #[test]
    fn concurrent_readers_see_consistent_windows() {
        let buffer = Arc::new(RingBuffer::new(16).unwrap());

        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..5_000u32 {
                    buffer.add(i);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let seen = collect(&buffer);
                        assert!(seen.len() <= 16);
                        // Items are consecutive integers, oldest first.
                        assert!(seen.windows(2).all(|w| w[1] == w[0] + 1));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(collect(&buffer), (4_984..5_000).collect::<Vec<_>>());
    }
}
