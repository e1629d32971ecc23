//! Flush Queue
//!
//! The schedule queue holds the observers invalidated since the last flush.
//! It has set semantics: an observer appears at most once no matter how many
//! producers invalidated it before the flush started, which is what makes
//! multiple writes in one batch coalesce into a single re-execution.
//!
//! Execution order is first-scheduled-first-run. Correctness does not depend
//! on it (expressions recompute lazily with whatever observer reads them
//! first), only scheduling fairness does.

use indexmap::IndexSet;
use parking_lot::Mutex;

use super::edges::ConsumerId;

/// FIFO queue of scheduled observers with at-most-once membership.
pub(crate) struct ScheduleQueue {
    queue: Mutex<IndexSet<ConsumerId>>,
}

impl ScheduleQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(IndexSet::new()),
        }
    }

    /// Add a consumer to the queue. Returns false if it was already queued.
    pub(crate) fn enqueue(&self, consumer: ConsumerId) -> bool {
        self.queue.lock().insert(consumer)
    }

    /// Remove and return the oldest queued consumer.
    pub(crate) fn pop_front(&self) -> Option<ConsumerId> {
        self.queue.lock().shift_remove_index(0)
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
