//! Bounded, ordered queue of outbound responses.
//!
//! The head of a [`WritePipeline`] is the one write in flight; everything behind it
//! waits its turn, so responses leave in the order their requests arrived. A full
//! pipeline is the connection's signal to stop reading until a write completes.

use std::collections::VecDeque;

use thiserror::Error;

/// Default number of responses a connection may have queued.
pub const PIPELINE_CAPACITY: usize = 8;

/// An outbound message plus whether the connection closes once it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite<T> {
    pub message: T,
    pub close_after_send: bool,
}

impl<T> PendingWrite<T> {
    pub fn new(message: T, close_after_send: bool) -> Self {
        Self { message, close_after_send }
    }
}

/// The pipeline was already at capacity; the rejected write is handed back.
#[derive(Debug, Error)]
#[error("write pipeline full")]
pub struct PipelineFull<T>(pub PendingWrite<T>);

#[derive(Debug)]
pub struct WritePipeline<T> {
    items: VecDeque<PendingWrite<T>>,
    capacity: usize,
}

impl<T> WritePipeline<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "pipeline capacity must be positive");
        Self { items: VecDeque::with_capacity(capacity), capacity }
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

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// The write currently in flight.
    pub fn head(&self) -> Option<&PendingWrite<T>> {
        self.items.front()
    }

    /// Whether a queued write will close the connection.
    pub fn closing(&self) -> bool {
        self.items.iter().any(|item| item.close_after_send)
    }

    /// Appends a write. Returns `true` when it became the head, meaning the caller
    /// must issue its write now.
    pub fn enqueue(&mut self, item: PendingWrite<T>) -> Result<bool, PipelineFull<T>> {
        if self.is_full() {
            return Err(PipelineFull(item));
        }
        self.items.push_back(item);
        Ok(self.items.len() == 1)
    }

    /// Retires the head after its write completed.
    ///
    /// Returns the finished write and whether the pipeline was full just before, in
    /// which case reading may resume. The new head, if any, is the next write to issue.
    /// `None` when nothing was queued.
    pub fn on_write_complete(&mut self) -> Option<(PendingWrite<T>, bool)> {
        let was_full = self.is_full();
        self.items.pop_front().map(|done| (done, was_full))
    }
}

impl<T> Default for WritePipeline<T> {
    fn default() -> Self {
        Self::with_capacity(PIPELINE_CAPACITY)
    }
}
