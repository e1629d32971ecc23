//! Reactive Primitives
//!
//! This module implements the core reactive system: values, derived
//! expressions, and observers, coordinated by a per-session [`Runtime`].
//!
//! # Concepts
//!
//! ## Values
//!
//! A [`Value`] is a mutable cell and a graph leaf. Reading it inside a
//! consumer's execution registers that consumer as a dependent; writing it
//! marks every transitively affected consumer stale. Values owned by an
//! external event source are created through [`Runtime::input`] and can
//! only be written through the returned [`Input`] handle.
//!
//! ## Derived expressions
//!
//! A [`Derived`] is a cached, lazy computation over other producers. It
//! executes only when it is read while stale; repeated reads between
//! invalidations return the cached outcome without executing. Its
//! dependency set is rebuilt from scratch on every execution, so bodies
//! with branching logic track exactly what they actually read.
//!
//! ## Observers
//!
//! An [`Observer`] is an eager, side-effecting consumer with no readable
//! value. Invalidation schedules it; the host-driven [`Runtime::flush`]
//! executes everything scheduled, once per observer, after a batch of
//! writes. All observation goes through observers and expressions - there
//! is no value-change callback hook, by design: every side effect runs
//! under the same execution discipline.
//!
//! # Dependency Tracking
//!
//! Tracking is automatic: a thread-local context records which consumer is
//! executing, and producer reads register edges against it. Reads outside
//! any context fail with `NoReactiveContext`; reads under [`isolate`]
//! succeed without registering, which is the supported way to break
//! read-then-write feedback loops.

mod context;
mod derived;
mod observer;
mod runtime;
mod value;

pub use context::isolate;
pub use derived::{Derived, Validity};
pub use observer::Observer;
pub use runtime::{Runtime, RuntimeConfig, DEFAULT_FLUSH_ITERATION_LIMIT};
pub use value::{Input, Value, WritePolicy};
