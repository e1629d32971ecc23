//! Reactive Value
//!
//! A reactive value is a mutable cell and a graph leaf: it can be read and
//! tracked but depends on nothing itself.
//!
//! # How Values Work
//!
//! 1. Reading inside a consumer's execution registers an edge from the value
//!    to that consumer. Reading outside any context is an error; reading
//!    under `isolate` returns the value without an edge.
//!
//! 2. Writing stores the new value and marks every transitively dependent
//!    consumer stale. Writing never executes anything: expressions recompute
//!    on their next read, observers run in the next flush.
//!
//! 3. Whether a write that leaves the value equal to its predecessor
//!    invalidates at all is an explicit per-value policy, chosen at
//!    creation.
//!
//! # External Inputs
//!
//! Values fed by an outside event source (a transport layer, a clock) are
//! created through [`Runtime::input`](super::Runtime::input), which returns
//! the one privileged [`Input`] writer. The `Value` handles it hands out
//! reject `set` with `ReadOnly`, so application code cannot race the
//! external source. A periodically-written clock input is all it takes to
//! model time-driven re-execution; the engine needs no timer primitive.
//!
//! [`Value`] handles are cheap clones sharing one cell. The cell leaves the
//! graph when its last handle drops.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::Runtime;
use crate::error::ReactiveError;
use crate::graph::SourceId;

/// Policy for writes that leave the value equal to its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Skip invalidation when the new value compares equal to the old one.
    #[default]
    SkipEqual,

    /// Invalidate consumers on every write, equal or not.
    AlwaysNotify,
}

/// A reactive cell holding a value of type `T`.
pub struct Value<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    cell: Arc<ValueCell<T>>,
}

struct ValueCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    id: SourceId,
    runtime: Runtime,
    value: RwLock<T>,
    policy: WritePolicy,

    /// Only the `Input` writer may store into an external cell.
    external: bool,
}

impl<T> ValueCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Store a new value and propagate invalidation per the write policy.
    fn store(&self, next: T) {
        let changed = {
            let mut value = self.value.write();
            let changed = match self.policy {
                WritePolicy::SkipEqual => *value != next,
                WritePolicy::AlwaysNotify => true,
            };
            *value = next;
            changed
        };

        if changed {
            self.runtime.invalidate_source(self.id);
        } else {
            tracing::trace!(
                source = self.id.raw(),
                "write left value unchanged, skipping invalidation"
            );
        }
    }
}

impl<T> Drop for ValueCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn drop(&mut self) {
        self.runtime.remove_source(self.id);
    }
}

pub(crate) fn create<T>(runtime: &Runtime, initial: T, policy: WritePolicy) -> Value<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    Value {
        cell: Arc::new(ValueCell {
            id: SourceId::new(),
            runtime: runtime.clone(),
            value: RwLock::new(initial),
            policy,
            external: false,
        }),
    }
}

pub(crate) fn create_input<T>(runtime: &Runtime, initial: T) -> Input<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    Input {
        cell: Arc::new(ValueCell {
            id: SourceId::new(),
            runtime: runtime.clone(),
            value: RwLock::new(initial),
            policy: WritePolicy::default(),
            external: true,
        }),
    }
}

impl<T> Value<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Get the value's producer ID.
    pub fn id(&self) -> SourceId {
        self.cell.id
    }

    /// The equal-write policy this value was created with.
    pub fn policy(&self) -> WritePolicy {
        self.cell.policy
    }

    /// Whether only an external [`Input`] may write this value.
    pub fn is_read_only(&self) -> bool {
        self.cell.external
    }

    /// Read the current value.
    ///
    /// Registers an edge from this value to the currently executing
    /// consumer. Fails with `NoReactiveContext` when called outside any
    /// consumer execution and outside `isolate`.
    pub fn get(&self) -> Result<T, ReactiveError> {
        self.cell.runtime.track_read(self.cell.id)?;
        Ok(self.cell.value.read().clone())
    }

    /// Write a new value and invalidate dependents.
    ///
    /// Fails with `ReadOnly` on values owned by an external input source.
    /// Invalidation is bookkeeping only; call
    /// [`Runtime::flush`](super::Runtime::flush) after a batch of writes to
    /// re-run affected observers.
    pub fn set(&self, next: T) -> Result<(), ReactiveError> {
        if self.cell.external {
            return Err(ReactiveError::ReadOnly);
        }
        self.cell.store(next);
        Ok(())
    }

    /// Write a new value derived from the current one.
    pub fn update<F>(&self, mutate: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let current = self.cell.value.read();
            mutate(&current)
        };
        self.set(next)
    }

    /// Number of consumers currently depending on this value.
    pub fn consumer_count(&self) -> usize {
        self.cell.runtime.consumer_count_of(self.cell.id)
    }
}

impl<T> Clone for Value<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Debug for Value<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value")
            .field("id", &self.cell.id.raw())
            .field("value", &*self.cell.value.read())
            .field("consumer_count", &self.consumer_count())
            .finish()
    }
}

/// The privileged writer for an externally-owned value.
///
/// Hands out read-only [`Value`] handles through [`Input::value`]; its own
/// [`Input::set`] is the single legitimate write path.
pub struct Input<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    cell: Arc<ValueCell<T>>,
}

impl<T> Input<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Get the underlying producer ID.
    pub fn id(&self) -> SourceId {
        self.cell.id
    }

    /// Write from the external source. Never rejected.
    pub fn set(&self, next: T) {
        self.cell.store(next);
    }

    /// A read-only handle to the underlying value.
    pub fn value(&self) -> Value<T> {
        Value {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Clone for Input<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Debug for Input<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input")
            .field("id", &self.cell.id.raw())
            .field("value", &*self.cell.value.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::context::isolate;
    use super::*;

    #[test]
    fn read_outside_any_context_fails() {
        let rt = Runtime::new();
        let value = rt.value(7);

        assert!(matches!(value.get(), Err(ReactiveError::NoReactiveContext)));
    }

    #[test]
    fn read_under_isolate_succeeds() {
        let rt = Runtime::new();
        let value = rt.value(7);

        assert_eq!(isolate(|| value.get()).unwrap(), 7);
        // No edge was registered by the isolated read.
        assert_eq!(value.consumer_count(), 0);
    }

    #[test]
    fn set_then_read_returns_new_value() {
        let rt = Runtime::new();
        let value = rt.value(1);

        value.set(2).unwrap();
        assert_eq!(isolate(|| value.get()).unwrap(), 2);
    }

    #[test]
    fn update_builds_on_current_value() {
        let rt = Runtime::new();
        let value = rt.value(10);

        value.update(|current| current + 5).unwrap();
        assert_eq!(isolate(|| value.get()).unwrap(), 15);
    }

    #[test]
    fn clone_shares_the_cell() {
        let rt = Runtime::new();
        let first = rt.value(0);
        let second = first.clone();

        first.set(42).unwrap();
        assert_eq!(isolate(|| second.get()).unwrap(), 42);
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn input_values_reject_plain_writes() {
        let rt = Runtime::new();
        let input = rt.input(0);
        let value = input.value();

        assert!(value.is_read_only());
        assert!(matches!(value.set(1), Err(ReactiveError::ReadOnly)));

        input.set(1);
        assert_eq!(isolate(|| value.get()).unwrap(), 1);
    }
}
