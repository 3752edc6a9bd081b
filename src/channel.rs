//! Bounded hand-off channel between pipeline stages.
//!
//! Producers never block: `offer` either enqueues or drops the item when the
//! channel is at capacity. Consumers poll with `take(timeout)` so they can
//! re-check the shutdown signal between items.

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fixed-capacity FIFO queue with drop-on-full semantics.
///
/// Cloning yields another handle to the same queue; the pipeline hands one
/// clone to the producing stage and one to the consuming stage.
pub struct BoundedChannel<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for BoundedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: self.capacity,
            dropped: self.dropped.clone(),
        }
    }
}

impl<T> BoundedChannel<T> {
    /// Create a channel holding at most `capacity` items.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("channel capacity must be >= 1"));
        }
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Ok(Self {
            tx,
            rx,
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Enqueue without blocking. Returns `false` when the item was dropped
    /// because the channel is full.
    pub fn offer(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            // Both ends live in this struct, so a disconnect cannot happen while
            // `self` exists; treat it like a drop regardless.
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Wait up to `timeout` for the oldest item. `None` means the wait timed out.
    pub fn take(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take the oldest item if one is immediately available.
    pub fn try_take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rx.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items discarded by `offer` since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
