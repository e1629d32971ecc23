//! Reactive Expression
//!
//! A derived value is a cached, lazy computation over other producers. It is
//! both a consumer (of what its body reads) and a producer (to its own
//! readers).
//!
//! # How Derived Values Work
//!
//! 1. Creation executes nothing. The body runs for the first time when the
//!    value is first read.
//!
//! 2. A read while valid returns the cached outcome in O(1).
//!
//! 3. A read while invalid re-executes the body inside the expression's own
//!    tracking context. The previous run's upstream edges are discarded
//!    first, so the dependency set always reflects exactly the most recent
//!    execution - branching bodies can shrink or shift what they depend on
//!    between runs.
//!
//! 4. An upstream change flips the expression to invalid and forwards the
//!    invalidation to its own readers. Nothing recomputes until the next
//!    read.
//!
//! # Failure Caching
//!
//! A body failure is cached as the current outcome exactly like a value:
//! every reader gets the same `ExpressionEvaluationFailed` without the body
//! re-executing, until an upstream change invalidates the expression and the
//! next read runs it afresh. An output chained onto a failing expression
//! therefore fails too, cascading until the upstream condition is fixed.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::context::ContextGuard;
use super::runtime::{Consumer, Invalidation, Runtime};
use crate::error::ReactiveError;
use crate::graph::{ConsumerId, SourceId};

/// Validity of a derived value's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// The cached outcome is current; reads return it without executing.
    Valid,

    /// An upstream producer changed (or the body never ran); the next read
    /// re-executes the body.
    Invalid,
}

/// A cached, lazily recomputed expression over other producers.
pub struct Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<DerivedInner<T>>,
}

struct DerivedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Producer identity, used by this expression's own readers.
    source_id: SourceId,

    /// Consumer identity, used for the edges the body's reads establish.
    consumer_id: ConsumerId,

    runtime: Runtime,
    body: Box<dyn Fn() -> Result<T, ReactiveError> + Send + Sync>,
    validity: RwLock<Validity>,

    /// The most recent execution outcome. `None` only before the first run.
    cached: RwLock<Option<Result<T, ReactiveError>>>,
}

pub(crate) fn create<T, F>(runtime: &Runtime, body: F) -> Derived<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Result<T, ReactiveError> + Send + Sync + 'static,
{
    let inner = Arc::new(DerivedInner {
        source_id: SourceId::new(),
        consumer_id: ConsumerId::new(),
        runtime: runtime.clone(),
        body: Box::new(body),
        validity: RwLock::new(Validity::Invalid),
        cached: RwLock::new(None),
    });

    let consumer_arc: Arc<dyn Consumer> = inner.clone();
    let consumer: Weak<dyn Consumer> = Arc::downgrade(&consumer_arc);
    runtime.register_consumer(inner.consumer_id, consumer);

    Derived { inner }
}

impl<T> Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Get the expression's producer ID.
    pub fn id(&self) -> SourceId {
        self.inner.source_id
    }

    /// Current cache validity.
    pub fn validity(&self) -> Validity {
        *self.inner.validity.read()
    }

    /// Read the expression's value, recomputing if it is invalid.
    ///
    /// Registers an edge from this expression to the currently executing
    /// consumer, exactly as a value read does; fails with
    /// `NoReactiveContext` outside any context and outside `isolate`.
    pub fn get(&self) -> Result<T, ReactiveError> {
        self.inner.runtime.track_read(self.inner.source_id)?;

        if *self.inner.validity.read() == Validity::Valid {
            if let Some(outcome) = self.inner.cached.read().as_ref() {
                return outcome.clone();
            }
        }

        self.inner.recompute()
    }

    /// Number of consumers currently depending on this expression.
    pub fn consumer_count(&self) -> usize {
        self.inner.runtime.consumer_count_of(self.inner.source_id)
    }
}

impl<T> DerivedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Execute the body inside this expression's own tracking context and
    /// cache the outcome, success or failure alike.
    fn recompute(&self) -> Result<T, ReactiveError> {
        // Discard the previous run's edges so the dependency set reflects
        // exactly what this run reads.
        self.runtime.clear_consumer_edges(self.consumer_id);

        let outcome = {
            let _ctx = ContextGuard::enter(self.consumer_id);
            (self.body)()
        };

        let outcome = outcome.map_err(|failure| match failure {
            wrapped @ ReactiveError::ExpressionEvaluationFailed(_) => wrapped,
            other => ReactiveError::ExpressionEvaluationFailed(Arc::new(other)),
        });

        *self.cached.write() = Some(outcome.clone());
        *self.validity.write() = Validity::Valid;

        tracing::trace!(
            source = self.source_id.raw(),
            ok = outcome.is_ok(),
            "expression recomputed"
        );

        outcome
    }
}

impl<T> Consumer for DerivedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn consumer_id(&self) -> ConsumerId {
        self.consumer_id
    }

    fn invalidate(&self) -> Invalidation {
        let mut validity = self.validity.write();
        if *validity == Validity::Invalid {
            // Already stale; downstream was invalidated when this happened.
            return Invalidation::Stop;
        }
        *validity = Validity::Invalid;
        Invalidation::Forward(self.source_id)
    }

    fn run_scheduled(&self) -> Result<(), ReactiveError> {
        // Expressions are never enqueued; recomputation happens on read.
        Ok(())
    }
}

impl<T> Drop for DerivedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.runtime.remove_source(self.source_id);
        self.runtime.clear_consumer_edges(self.consumer_id);
        self.runtime.unregister_consumer(self.consumer_id);
    }
}

impl<T> Clone for Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("id", &self.inner.source_id.raw())
            .field("validity", &self.validity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::super::context::isolate;
    use super::*;

    #[test]
    fn creation_executes_nothing() {
        let rt = Runtime::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_in_body = runs.clone();
        let derived = rt.derived(move || {
            runs_in_body.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        });

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(derived.validity(), Validity::Invalid);
    }

    #[test]
    fn repeated_reads_execute_once() {
        let rt = Runtime::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_in_body = runs.clone();
        let derived = rt.derived(move || {
            runs_in_body.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        });

        assert_eq!(isolate(|| derived.get()).unwrap(), 42);
        assert_eq!(isolate(|| derived.get()).unwrap(), 42);
        assert_eq!(isolate(|| derived.get()).unwrap(), 42);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(derived.validity(), Validity::Valid);
    }

    #[test]
    fn upstream_write_invalidates_and_next_read_recomputes() {
        let rt = Runtime::new();
        let base = rt.value(10);
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_in_body = runs.clone();
        let base_in_body = base.clone();
        let doubled = rt.derived(move || {
            runs_in_body.fetch_add(1, Ordering::SeqCst);
            Ok(base_in_body.get()? * 2)
        });

        assert_eq!(isolate(|| doubled.get()).unwrap(), 20);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        base.set(15).unwrap();
        assert_eq!(doubled.validity(), Validity::Invalid);

        assert_eq!(isolate(|| doubled.get()).unwrap(), 30);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failures_are_cached_until_invalidated() {
        let rt = Runtime::new();
        let base = rt.value(-1);
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_in_body = runs.clone();
        let base_in_body = base.clone();
        let checked = rt.derived(move || {
            runs_in_body.fetch_add(1, Ordering::SeqCst);
            let current = base_in_body.get()?;
            if current < 0 {
                return Err(ReactiveError::expression_failure(std::io::Error::other(
                    "negative input",
                )));
            }
            Ok(current)
        });

        assert!(matches!(
            isolate(|| checked.get()),
            Err(ReactiveError::ExpressionEvaluationFailed(_))
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Re-reading re-raises the cached failure without executing.
        assert!(matches!(
            isolate(|| checked.get()),
            Err(ReactiveError::ExpressionEvaluationFailed(_))
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        base.set(5).unwrap();
        assert_eq!(isolate(|| checked.get()).unwrap(), 5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn expressions_chain() {
        let rt = Runtime::new();
        let base = rt.value(5);

        let base_in_body = base.clone();
        let doubled = rt.derived(move || Ok(base_in_body.get()? * 2));

        let doubled_in_body = doubled.clone();
        let plus_ten = rt.derived(move || Ok(doubled_in_body.get()? + 10));

        assert_eq!(isolate(|| plus_ten.get()).unwrap(), 20);

        base.set(10).unwrap();
        // The invalidation crossed both expressions.
        assert_eq!(plus_ten.validity(), Validity::Invalid);
        assert_eq!(isolate(|| plus_ten.get()).unwrap(), 30);
    }
}
