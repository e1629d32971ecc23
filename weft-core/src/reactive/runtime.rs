//! Reactive Runtime
//!
//! The runtime is the per-session coordinator that connects values, derived
//! expressions, and observers. It owns the dependency edge map, the consumer
//! registry, and the flush queue.
//!
//! # How It Works
//!
//! 1. Reads inside a consumer's execution register edges through the
//!    runtime's edge map.
//!
//! 2. A write walks the edge map breadth-first: each reached expression is
//!    marked invalid (and the walk continues through it), each reached
//!    observer is enqueued. The walk is bookkeeping only.
//!
//! 3. The host calls [`Runtime::flush`] once per batch of external writes;
//!    the flush loop executes queued observers to a fixed point, and those
//!    executions lazily recompute whatever stale expressions they read.
//!
//! # Sessions
//!
//! A runtime is one independent session's graph. Handles are cheap clones
//! of one shared state; separate runtimes share nothing and may run on
//! separate threads freely. Within one runtime, execution is cooperative:
//! one consumer body runs to completion before the next begins.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::context::{self, Frame};
use super::derived::{self, Derived};
use super::observer::{self, Observer};
use super::value::{self, Input, Value, WritePolicy};
use crate::error::ReactiveError;
use crate::graph::{ConsumerId, EdgeMap, ScheduleQueue, SourceId};

/// Default bound on observer executions within one flush.
pub const DEFAULT_FLUSH_ITERATION_LIMIT: usize = 100_000;

/// Tunables for a runtime instance.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Maximum observer executions per flush before the flush aborts with
    /// `ReactivityLoopSuspected`. `None` disables the safety net, leaving
    /// loop avoidance entirely to application logic.
    pub flush_iteration_limit: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_iteration_limit: Some(DEFAULT_FLUSH_ITERATION_LIMIT),
        }
    }
}

/// Outcome of delivering an invalidation signal to a consumer.
pub(crate) enum Invalidation {
    /// Already stale, suspended, or retired; the walk stops here.
    Stop,

    /// An expression became newly invalid; continue the walk through its
    /// producer side.
    Forward(SourceId),

    /// An observer became newly scheduled; enqueue it.
    Schedule,
}

/// A consumer registered with the runtime.
///
/// Invalidation is pure bookkeeping and must not execute user code;
/// execution happens through `run_scheduled` during flush (observers) or
/// lazily on read (expressions).
pub(crate) trait Consumer: Send + Sync {
    fn consumer_id(&self) -> ConsumerId;

    fn invalidate(&self) -> Invalidation;

    fn run_scheduled(&self) -> Result<(), ReactiveError>;
}

struct RuntimeInner {
    edges: EdgeMap,
    registry: DashMap<ConsumerId, Weak<dyn Consumer>>,
    queue: ScheduleQueue,
    config: RuntimeConfig,
}

/// One session's reactive graph.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with explicit configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                edges: EdgeMap::new(),
                registry: DashMap::new(),
                queue: ScheduleQueue::new(),
                config,
            }),
        }
    }

    /// Create a mutable reactive value with the default equal-write policy.
    pub fn value<T>(&self, initial: T) -> Value<T>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        value::create(self, initial, WritePolicy::default())
    }

    /// Create a mutable reactive value with an explicit equal-write policy.
    pub fn value_with_policy<T>(&self, initial: T, policy: WritePolicy) -> Value<T>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        value::create(self, initial, policy)
    }

    /// Create an externally-owned value, returning its privileged writer.
    pub fn input<T>(&self, initial: T) -> Input<T>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        value::create_input(self, initial)
    }

    /// Create a derived expression. The body does not run until the first
    /// read.
    pub fn derived<T, F>(&self, body: F) -> Derived<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Result<T, ReactiveError> + Send + Sync + 'static,
    {
        derived::create(self, body)
    }

    /// Create an observer and run it once to establish its edges.
    pub fn observe<F>(&self, body: F) -> Result<Observer, ReactiveError>
    where
        F: Fn() -> Result<(), ReactiveError> + Send + Sync + 'static,
    {
        observer::create(self, body)
    }

    /// Execute scheduled observers until the queue is empty.
    ///
    /// Observer failures do not halt the remaining queue: every failure is
    /// logged, the first is returned once the queue has drained. When the
    /// configured iteration limit is exceeded the flush aborts with
    /// `ReactivityLoopSuspected`, leaving the remaining queue in place.
    pub fn flush(&self) -> Result<(), ReactiveError> {
        let mut iterations = 0usize;
        let mut executed = 0usize;
        let mut first_failure: Option<ReactiveError> = None;

        loop {
            if let Some(limit) = self.inner.config.flush_iteration_limit {
                if iterations >= limit && !self.inner.queue.is_empty() {
                    return Err(ReactiveError::ReactivityLoopSuspected(limit));
                }
            }

            let consumer_id = match self.inner.queue.pop_front() {
                Some(consumer_id) => consumer_id,
                None => break,
            };
            iterations += 1;

            let consumer = match self.lookup(consumer_id) {
                Some(consumer) => consumer,
                None => continue,
            };

            executed += 1;
            if let Err(failure) = consumer.run_scheduled() {
                tracing::error!(
                    observer = consumer_id.raw(),
                    error = %failure,
                    "observer failed during flush"
                );
                if first_failure.is_none() {
                    first_failure = Some(failure);
                }
            }
        }

        if executed > 0 {
            tracing::debug!(executed, "flush complete");
        }

        match first_failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// Run a batch of writes, then flush once.
    ///
    /// This is the host-facing entry point for "one external event, one
    /// coherent recomputation pass".
    pub fn batch<F, R>(&self, writes: F) -> Result<R, ReactiveError>
    where
        F: FnOnce() -> R,
    {
        let output = writes();
        self.flush()?;
        Ok(output)
    }

    /// Number of observers currently awaiting flush.
    pub fn pending_observers(&self) -> usize {
        self.inner.queue.len()
    }

    /// Register a producer read against the current reactive context.
    pub(crate) fn track_read(&self, source: SourceId) -> Result<(), ReactiveError> {
        match context::current() {
            None => Err(ReactiveError::NoReactiveContext),
            Some(Frame::Isolated) => Ok(()),
            Some(Frame::Consumer(consumer)) => {
                self.inner.edges.add_edge(source, consumer);
                tracing::trace!(
                    source = source.raw(),
                    consumer = consumer.raw(),
                    "dependency recorded"
                );
                Ok(())
            }
        }
    }

    /// Walk the graph from a written producer, marking consumers stale and
    /// enqueueing affected observers. Executes no user code.
    pub(crate) fn invalidate_source(&self, source: SourceId) {
        let mut invalidated = 0usize;
        let mut scheduled = 0usize;

        self.inner.edges.propagate(source, |consumer_id| {
            let consumer = self.lookup(consumer_id)?;
            match consumer.invalidate() {
                Invalidation::Stop => None,
                Invalidation::Forward(downstream) => {
                    invalidated += 1;
                    Some(downstream)
                }
                Invalidation::Schedule => {
                    invalidated += 1;
                    scheduled += 1;
                    self.inner.queue.enqueue(consumer_id);
                    None
                }
            }
        });

        tracing::trace!(
            source = source.raw(),
            invalidated,
            scheduled,
            "invalidation propagated"
        );
    }

    pub(crate) fn register_consumer(&self, consumer_id: ConsumerId, consumer: Weak<dyn Consumer>) {
        self.inner.registry.insert(consumer_id, consumer);
    }

    pub(crate) fn unregister_consumer(&self, consumer_id: ConsumerId) {
        self.inner.registry.remove(&consumer_id);
    }

    pub(crate) fn clear_consumer_edges(&self, consumer_id: ConsumerId) {
        self.inner.edges.remove_consumer(consumer_id);
    }

    pub(crate) fn remove_source(&self, source: SourceId) {
        self.inner.edges.remove_source(source);
    }

    pub(crate) fn enqueue(&self, consumer_id: ConsumerId) {
        self.inner.queue.enqueue(consumer_id);
    }

    pub(crate) fn consumer_count_of(&self, source: SourceId) -> usize {
        self.inner.edges.consumer_count(source)
    }

    /// Resolve a registered consumer, pruning entries whose handles were
    /// dropped without an explicit dispose.
    fn lookup(&self, consumer_id: ConsumerId) -> Option<Arc<dyn Consumer>> {
        let upgraded = self
            .inner
            .registry
            .get(&consumer_id)
            .and_then(|entry| entry.value().upgrade());

        if upgraded.is_none() && self.inner.registry.remove(&consumer_id).is_some() {
            tracing::debug!(consumer = consumer_id.raw(), "pruned dropped consumer");
        }

        upgraded
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("registered_consumers", &self.inner.registry.len())
            .field("pending_observers", &self.pending_observers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn flush_on_empty_queue_is_a_no_op() {
        let rt = Runtime::new();
        assert_eq!(rt.pending_observers(), 0);
        rt.flush().unwrap();
    }

    #[test]
    fn flush_is_idempotent() {
        let rt = Runtime::new();
        let value = rt.value(0);
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_in_body = runs.clone();
        let value_in_body = value.clone();
        let _observer = rt
            .observe(move || {
                runs_in_body.fetch_add(1, Ordering::SeqCst);
                value_in_body.get()?;
                Ok(())
            })
            .unwrap();

        value.set(1).unwrap();
        rt.flush().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // No intervening writes: the second flush executes nothing.
        rt.flush().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unbounded_feedback_is_reported() {
        let rt = Runtime::with_config(RuntimeConfig {
            flush_iteration_limit: Some(5),
        });
        let value = rt.value(0);

        // Reads and writes the same value without isolation: every run
        // re-schedules itself.
        let value_in_body = value.clone();
        let _observer = rt
            .observe(move || {
                let current = value_in_body.get()?;
                value_in_body.set(current + 1)?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(
            rt.flush(),
            Err(ReactiveError::ReactivityLoopSuspected(5))
        ));
    }

    #[test]
    fn batch_runs_writes_then_flushes() {
        let rt = Runtime::new();
        let value = rt.value(0);
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_in_body = runs.clone();
        let value_in_body = value.clone();
        let _observer = rt
            .observe(move || {
                runs_in_body.fetch_add(1, Ordering::SeqCst);
                value_in_body.get()?;
                Ok(())
            })
            .unwrap();

        rt.batch(|| {
            value.set(1).unwrap();
            value.set(2).unwrap();
        })
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(rt.pending_observers(), 0);
    }

    #[test]
    fn independent_runtimes_share_nothing() {
        let first = Runtime::new();
        let second = Runtime::new();

        let value = first.value(0);
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_in_body = runs.clone();
        let value_in_body = value.clone();
        let _observer = first
            .observe(move || {
                runs_in_body.fetch_add(1, Ordering::SeqCst);
                value_in_body.get()?;
                Ok(())
            })
            .unwrap();

        value.set(1).unwrap();

        // Flushing the unrelated session executes nothing.
        second.flush().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        first.flush().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
