//! Growable FIFO used for breadth-first traversal of the lineage tree.
//!
//! The queue keeps a live window `[head, tail)` inside a slot buffer. Pops
//! advance `head`; pushes write at `tail`. When `tail` reaches the end of the
//! buffer the live window is copied to the front of a freshly sized buffer:
//!
//! - doubled when the window uses more than half of it,
//! - halved when the window uses a quarter of it or less,
//! - same size otherwise (compaction only).
//!
//! After any resize at least half of the new buffer is free, so the next
//! resize is at least `new_capacity / 2` pushes away. Copying `len` elements
//! costs no more than the pushes that preceded it, which keeps push and pop
//! amortized O(1).

use crate::error::{ExploreError, ExploreResult};

/// Initial capacity used by [`BoundedQueue::new`].
pub const DEFAULT_CAPACITY: usize = 64;

/// Smallest buffer the shrink path will reallocate to.
const MIN_CAPACITY: usize = 4;

/// FIFO over a resizable slot buffer.
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    buffer: Vec<Option<T>>,
    head: usize,
    tail: usize,
    #[cfg(test)]
    resizes: usize,
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BoundedQueue<T> {
    /// Create a queue with [`DEFAULT_CAPACITY`] slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a queue with room for `capacity` elements before the first resize.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, || None);
        Self {
            buffer,
            head: 0,
            tail: 0,
            #[cfg(test)]
            resizes: 0,
        }
    }

    /// Append an element at the back.
    pub fn push(&mut self, item: T) {
        if self.tail == self.buffer.len() {
            self.resize();
        }
        self.buffer[self.tail] = Some(item);
        self.tail += 1;
    }

    /// Remove the element at the front.
    ///
    /// # Errors
    /// Returns [`ExploreError::EmptyQueue`] when nothing is queued.
    pub fn pop(&mut self) -> ExploreResult<T> {
        if self.is_empty() {
            return Err(ExploreError::EmptyQueue);
        }
        let item = self.buffer[self.head].take();
        self.head += 1;
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
        }
        item.ok_or(ExploreError::EmptyQueue)
    }

    /// Element at the front, if any.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            None
        } else {
            self.buffer[self.head].as_ref()
        }
    }

    /// True iff no pushed element remains unpopped.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Number of queued elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tail - self.head
    }

    /// Current buffer size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn resize(&mut self) {
        let len = self.len();
        let capacity = self.buffer.len();
        let new_capacity = if len > capacity / 2 {
            capacity.saturating_mul(2).max(MIN_CAPACITY)
        } else if len.saturating_mul(4) <= capacity && capacity / 2 >= MIN_CAPACITY {
            capacity / 2
        } else {
            capacity
        };

        let mut buffer = Vec::with_capacity(new_capacity);
        buffer.extend(self.buffer[self.head..self.tail].iter_mut().map(Option::take));
        buffer.resize_with(new_capacity, || None);

        self.buffer = buffer;
        self.head = 0;
        self.tail = len;
        #[cfg(test)]
        {
            self.resizes += 1;
        }
    }
}

impl<T> Extend<T> for BoundedQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}
