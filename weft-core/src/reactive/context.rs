//! Reactive Context
//!
//! The reactive context tracks which consumer is currently executing. This
//! enables automatic dependency tracking: when a producer is read, the read
//! registers an edge from that producer to the current consumer.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running a consumer pushes a
//! tracking frame; `isolate` pushes a sentinel frame under which reads
//! succeed but register nothing. Frames are popped by an RAII guard, so the
//! enclosing context is restored on every exit path, including panics.
//!
//! Nesting is the normal case: an expression recomputed inside an observer's
//! execution pushes its own frame on top of the observer's.
//!
//! A read with no frame on the stack at all is an error
//! (`NoReactiveContext`): it means a reactive value was used as a plain
//! variable outside the graph.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::ConsumerId;

thread_local! {
    static CONTEXT_STACK: RefCell<SmallVec<[Frame; 8]>> = RefCell::new(SmallVec::new());
}

/// One entry of the context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame {
    /// A consumer is executing; reads register edges into it.
    Consumer(ConsumerId),

    /// Inside `isolate`: reads succeed but register no edges.
    Isolated,
}

/// The innermost active frame, if any.
pub(crate) fn current() -> Option<Frame> {
    CONTEXT_STACK.with(|stack| stack.borrow().last().copied())
}

/// Guard that pops its frame when dropped.
pub(crate) struct ContextGuard {
    frame: Frame,
}

impl ContextGuard {
    /// Push a tracking frame for the given consumer.
    pub(crate) fn enter(consumer: ConsumerId) -> Self {
        Self::push(Frame::Consumer(consumer))
    }

    /// Push the no-registration sentinel.
    pub(crate) fn enter_isolated() -> Self {
        Self::push(Frame::Isolated)
    }

    fn push(frame: Frame) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(frame));
        Self { frame }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Catches mismatched push/pop pairs during development.
            debug_assert_eq!(
                popped,
                Some(self.frame),
                "context stack mismatch: expected {:?}, got {:?}",
                self.frame,
                popped
            );
        });
    }
}

/// Execute `body` without registering dependency edges.
///
/// Reads inside `body` succeed (values are retrievable) but establish no
/// producer-to-consumer edges, so the enclosing consumer is not re-run when
/// those producers later change. This is the sanctioned way for a consumer
/// to read a value it also writes without creating a feedback loop.
pub fn isolate<F, R>(body: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ContextGuard::enter_isolated();
    body()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_frame_outside_any_context() {
        assert_eq!(current(), None);
    }

    #[test]
    fn guard_restores_enclosing_frame() {
        let outer = ConsumerId::new();
        let inner = ConsumerId::new();

        {
            let _outer_guard = ContextGuard::enter(outer);
            assert_eq!(current(), Some(Frame::Consumer(outer)));

            {
                let _inner_guard = ContextGuard::enter(inner);
                assert_eq!(current(), Some(Frame::Consumer(inner)));
            }

            assert_eq!(current(), Some(Frame::Consumer(outer)));
        }

        assert_eq!(current(), None);
    }

    #[test]
    fn isolate_pushes_the_sentinel() {
        let consumer = ConsumerId::new();
        let _guard = ContextGuard::enter(consumer);

        isolate(|| {
            assert_eq!(current(), Some(Frame::Isolated));
        });

        assert_eq!(current(), Some(Frame::Consumer(consumer)));
    }

    #[test]
    fn frame_is_popped_on_panic() {
        let result = std::panic::catch_unwind(|| {
            isolate(|| panic!("boom"));
        });

        assert!(result.is_err());
        assert_eq!(current(), None);
    }
}
