use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A lock-free iteration queue with capacity control
pub(crate) struct IterationQueue<T> {
    queue: SegQueue<T>,
    capacity: usize,
    size: AtomicUsize,
}

impl<T> IterationQueue<T> {
    /// Creates a new IterationQueue with the specified capacity
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: SegQueue::new(),
            capacity,
            size: AtomicUsize::new(0),
        }
    }

    /// Attempts to push an item onto the queue
    /// Returns false if the queue is at capacity
    pub(crate) fn push(&self, item: T) -> bool {
        let mut current = self.size.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return false;
            }
            match self.size.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.queue.push(item);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Attempts to pop an item from the queue
    pub(crate) fn pop(&self) -> Option<T> {
        let item = self.queue.pop()?;
        self.size.fetch_sub(1, Ordering::AcqRel);
        Some(item)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every queued item
    pub(crate) fn clear(&self) {
        while self.pop().is_some() {}
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}
