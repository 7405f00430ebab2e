//! Pending work queues shared between application threads and the driver.
//!
//! A [`PendingQueue`] accepts items from any thread and is drained by the
//! driver once per tick. Draining swaps the backing storage out under the
//! lock, so producers racing with a drain land wholly in the next batch.
//! Entries whose processing fails are re-enqueued at the tail, which bounds
//! retries to one attempt per entry per tick.

use std::sync::Mutex;

/// Unbounded multi-producer queue drained in batches.
#[derive(Debug)]
pub struct PendingQueue<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, item: T) {
        self.items.lock().expect("queue lock poisoned").push(item);
    }

    /// Takes everything queued so far, in insertion order.
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.lock().expect("queue lock poisoned"))
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().expect("queue lock poisoned").is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue lock poisoned").len()
    }
}
