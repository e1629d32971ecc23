//! Edge Bookkeeping
//!
//! The dependency graph is stored as two mirrored maps:
//!
//! - `outgoing`: producer -> consumers, walked when a producer changes to
//!   find everything that must be invalidated.
//! - `incoming`: consumer -> producers, walked when a consumer re-executes
//!   to discard its previous run's edges in O(edges).
//!
//! Edges are created only by an actual read during a consumer's most recent
//! execution, and removed only when that consumer re-executes or is
//! destroyed. Invalidation propagation is a plain breadth-first walk over
//! `outgoing`; it never executes user code.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Unique identifier for a producer (a reactive value or the producer side
/// of a reactive expression).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique producer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a consumer (a reactive expression or an observer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Generate a new unique consumer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Bidirectional dependency edge store.
///
/// Shared by every producer and consumer of one runtime. All mutation is
/// keyed to a single logical execution thread per runtime; the concurrent
/// maps keep cross-thread sharing of independent handles safe without a
/// graph-wide lock.
pub(crate) struct EdgeMap {
    /// producer -> consumers currently depending on it.
    outgoing: DashMap<SourceId, HashSet<ConsumerId>>,

    /// consumer -> producers it read during its most recent execution.
    incoming: DashMap<ConsumerId, HashSet<SourceId>>,
}

impl EdgeMap {
    pub(crate) fn new() -> Self {
        Self {
            outgoing: DashMap::new(),
            incoming: DashMap::new(),
        }
    }

    /// Record that `consumer` read `source` during its current execution.
    pub(crate) fn add_edge(&self, source: SourceId, consumer: ConsumerId) {
        self.outgoing.entry(source).or_default().insert(consumer);
        self.incoming.entry(consumer).or_default().insert(source);
    }

    /// Discard every edge into `consumer`.
    ///
    /// Called at the start of a consumer's re-execution (the dependency set
    /// is rebuilt from scratch by the reads of that run) and when the
    /// consumer is destroyed.
    pub(crate) fn remove_consumer(&self, consumer: ConsumerId) {
        if let Some((_, sources)) = self.incoming.remove(&consumer) {
            for source in sources {
                if let Some(mut consumers) = self.outgoing.get_mut(&source) {
                    consumers.remove(&consumer);
                }
            }
        }
    }

    /// Drop a destroyed producer's consumer set.
    ///
    /// Surviving consumers still list the producer in their `incoming`
    /// sets; those entries go away when the consumers next re-execute.
    pub(crate) fn remove_source(&self, source: SourceId) {
        self.outgoing.remove(&source);
    }

    /// The consumers currently subscribed to `source`.
    pub(crate) fn consumers_of(&self, source: SourceId) -> Vec<ConsumerId> {
        self.outgoing
            .get(&source)
            .map(|consumers| consumers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of consumers currently subscribed to `source`.
    pub(crate) fn consumer_count(&self, source: SourceId) -> usize {
        self.outgoing
            .get(&source)
            .map(|consumers| consumers.len())
            .unwrap_or(0)
    }

    /// Breadth-first invalidation walk from a written producer.
    ///
    /// `visit` is called exactly once per reachable consumer, even when the
    /// graph contains convergent diamonds. When the visited consumer is
    /// itself a producer that became newly invalid, `visit` returns its
    /// producer ID and the walk continues through it; `None` stops the walk
    /// at that node. No user code runs during the walk.
    pub(crate) fn propagate<F>(&self, origin: SourceId, mut visit: F)
    where
        F: FnMut(ConsumerId) -> Option<SourceId>,
    {
        let mut frontier = VecDeque::new();
        let mut seen = HashSet::new();
        frontier.push_back(origin);

        while let Some(source) = frontier.pop_front() {
            // Clone the consumer list out of the map so no shard lock is
            // held while the visit callback mutates consumer state.
            for consumer in self.consumers_of(source) {
                if !seen.insert(consumer) {
                    continue;
                }
                if let Some(forwarded) = visit(consumer) {
                    frontier.push_back(forwarded);
                }
            }
        }
    }
}
