//! Observer
//!
//! An observer is the eager consumer of the graph: it has side effects, no
//! readable value, and it is what ultimately drives execution.
//!
//! # How Observers Work
//!
//! 1. Creation runs the body once, synchronously, inside the observer's own
//!    tracking context, establishing its initial dependency edges.
//!
//! 2. An upstream change schedules the observer; it does not run inline.
//!    Writes arriving together therefore coalesce into a single
//!    re-execution in the next flush.
//!
//! 3. Flush execution clears the scheduled flag before the body runs, so a
//!    re-invalidation caused by the body's own writes re-schedules it
//!    instead of being lost. Reading a written-back value under `isolate`
//!    is the supported way to avoid that feedback on purpose.
//!
//! 4. Each execution discards the previous run's edges and rebuilds them
//!    from the reads it actually performs.
//!
//! # Suspension
//!
//! A suspended observer keeps receiving invalidations but only records
//! them; the flush loop will not execute it. Resuming a dirty observer
//! re-schedules it immediately. This is the hook a host uses for
//! visibility-driven outputs: an invisible output is an observer with its
//! scheduling gated, not a separate primitive.
//!
//! # Failure
//!
//! A body failure during flush is raised to the flush caller after the rest
//! of the queue has run. The edges registered before the failure point
//! remain in place until the next execution rebuilds them; this is a known
//! inconsistency window rather than silent cleanup.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::context::ContextGuard;
use super::runtime::{Consumer, Invalidation, Runtime};
use crate::error::ReactiveError;
use crate::graph::ConsumerId;

/// A side-effecting consumer re-run by the flush loop when its dependencies
/// change.
pub struct Observer {
    inner: Arc<ObserverInner>,
}

struct ObserverInner {
    id: ConsumerId,
    runtime: Runtime,
    body: Box<dyn Fn() -> Result<(), ReactiveError> + Send + Sync>,
    state: Mutex<ObserverState>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ObserverState {
    /// Queued for the next flush.
    scheduled: bool,

    /// Invalidated while suspended; re-scheduled on resume.
    dirty: bool,

    suspended: bool,
    disposed: bool,
}

pub(crate) fn create<F>(runtime: &Runtime, body: F) -> Result<Observer, ReactiveError>
where
    F: Fn() -> Result<(), ReactiveError> + Send + Sync + 'static,
{
    let inner = Arc::new(ObserverInner {
        id: ConsumerId::new(),
        runtime: runtime.clone(),
        body: Box::new(body),
        state: Mutex::new(ObserverState::default()),
    });

    let consumer_arc: Arc<dyn Consumer> = inner.clone();
    let consumer: Weak<dyn Consumer> = Arc::downgrade(&consumer_arc);
    runtime.register_consumer(inner.id, consumer);

    // The initial run establishes the observer's edges. If it fails, the
    // error surfaces to the creator and the dropped observer unregisters
    // whatever edges the partial run left behind.
    inner.execute()?;

    Ok(Observer { inner })
}

impl Observer {
    /// Get the observer's consumer ID.
    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    /// Exclude this observer from flush execution.
    ///
    /// Invalidations arriving while suspended are recorded, not lost.
    pub fn suspend(&self) {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return;
        }
        state.suspended = true;
        if state.scheduled {
            // Already queued; the flush loop will skip it and keep the
            // dirtiness for resume.
            state.scheduled = false;
            state.dirty = true;
        }
    }

    /// Let the flush loop execute this observer again; if it was
    /// invalidated while suspended, schedule it right away.
    pub fn resume(&self) {
        let reschedule = {
            let mut state = self.inner.state.lock();
            if state.disposed || !state.suspended {
                false
            } else {
                state.suspended = false;
                if state.dirty {
                    state.dirty = false;
                    state.scheduled = true;
                    true
                } else {
                    false
                }
            }
        };

        if reschedule {
            self.inner.runtime.enqueue(self.inner.id);
        }
    }

    /// Permanently retire the observer and unregister its edges.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
        }
        self.inner.retire();
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.state.lock().suspended
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }
}

impl ObserverInner {
    /// Run the body inside this observer's tracking context, rebuilding its
    /// dependency edges from scratch.
    fn execute(&self) -> Result<(), ReactiveError> {
        self.runtime.clear_consumer_edges(self.id);

        let outcome = {
            let _ctx = ContextGuard::enter(self.id);
            (self.body)()
        };

        outcome.map_err(|failure| match failure {
            wrapped @ ReactiveError::ObserverEvaluationFailed(_) => wrapped,
            other => ReactiveError::ObserverEvaluationFailed(Arc::new(other)),
        })
    }

    /// Remove the observer from the graph. Safe to call more than once.
    fn retire(&self) {
        self.runtime.clear_consumer_edges(self.id);
        self.runtime.unregister_consumer(self.id);
    }
}

impl Consumer for ObserverInner {
    fn consumer_id(&self) -> ConsumerId {
        self.id
    }

    fn invalidate(&self) -> Invalidation {
        let mut state = self.state.lock();
        if state.disposed {
            return Invalidation::Stop;
        }
        if state.suspended {
            state.dirty = true;
            return Invalidation::Stop;
        }
        if state.scheduled {
            return Invalidation::Stop;
        }
        state.scheduled = true;
        Invalidation::Schedule
    }

    fn run_scheduled(&self) -> Result<(), ReactiveError> {
        {
            let mut state = self.state.lock();
            // Cleared before execution so a self-triggered invalidation
            // re-schedules rather than being lost.
            state.scheduled = false;
            if state.disposed {
                return Ok(());
            }
            if state.suspended {
                state.dirty = true;
                return Ok(());
            }
        }
        self.execute()
    }
}

impl Drop for ObserverInner {
    fn drop(&mut self) {
        if !self.state.get_mut().disposed {
            self.retire();
        }
    }
}

impl Clone for Observer {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.inner.state.lock();
        f.debug_struct("Observer")
            .field("id", &self.inner.id.raw())
            .field("scheduled", &state.scheduled)
            .field("suspended", &state.suspended)
            .field("disposed", &state.disposed)
            .finish()
    }
}
