//! Weft Core
//!
//! This crate provides the core runtime for the Weft reactive framework:
//! a dependency-tracking execution engine that lazily and efficiently
//! recomputes derived values and side effects when their inputs change.
//!
//! It implements:
//!
//! - Reactive primitives (values, derived expressions, observers)
//! - Automatic, dynamic dependency tracking
//! - Invalidation propagation and batched flush scheduling
//!
//! Rendering, transport, and session management are host concerns that
//! interact with the engine only through these primitives: external events
//! become writes to input values, outputs are observers whose side effect
//! is whatever the host renders.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the primitives and the per-session runtime
//! - `graph`: dependency edge bookkeeping and the flush queue
//! - `error`: the engine's error taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::reactive::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // A mutable value and a cached derived expression.
//! let count = rt.value(0);
//! let doubled = rt.derived({
//!     let count = count.clone();
//!     move || Ok(count.get()? * 2)
//! });
//!
//! // An observer re-runs whenever something it read changes.
//! let _printer = rt.observe({
//!     let doubled = doubled.clone();
//!     move || {
//!         println!("doubled = {}", doubled.get()?);
//!         Ok(())
//!     }
//! })?;
//!
//! // One batch of writes, one coherent recomputation pass.
//! count.set(5)?;
//! rt.flush()?; // prints "doubled = 10"
//! ```

pub mod error;
pub mod graph;
pub mod reactive;
