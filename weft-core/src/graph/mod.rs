//! Dependency Graph
//!
//! This module implements the shared bookkeeping between reactive producers
//! and consumers.
//!
//! # Overview
//!
//! The graph is a dynamic DAG:
//!
//! - Producers are reactive values and the producer side of reactive
//!   expressions; consumers are expressions and observers.
//! - An edge from producer to consumer exists exactly when the consumer read
//!   that producer during its most recent execution.
//!
//! When a producer changes, the graph is walked breadth-first to mark every
//! transitively affected consumer stale and enqueue affected observers. The
//! walk is pure bookkeeping: recomputation happens lazily on read, side
//! effects happen in the flush phase.
//!
//! # Design Decisions
//!
//! 1. Edges are stored bidirectionally: producer -> consumers for the
//!    invalidation walk, consumer -> producers so a re-executing consumer
//!    can discard its stale edges in O(edges) without a full graph scan.
//!
//! 2. The walk carries a visited set so a node reachable via two paths
//!    (a convergent diamond) is processed once, and it stops at consumers
//!    that were already stale.

mod edges;
mod scheduler;

pub use edges::{ConsumerId, SourceId};

pub(crate) use edges::EdgeMap;
pub(crate) use scheduler::ScheduleQueue;
