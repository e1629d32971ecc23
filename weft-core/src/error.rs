//! Error Taxonomy
//!
//! Every failure the engine can surface is a variant of [`ReactiveError`].
//! The engine never swallows an error: lazy expression failures are raised
//! to the reader, observer failures are raised out of the flush loop to the
//! host.
//!
//! Failure outcomes are cached by expressions exactly like values are, so
//! the error type is cheaply cloneable and wrapped causes are shared behind
//! an `Arc`.

use std::sync::Arc;

use thiserror::Error;

/// A shared, cloneable wrapped error cause.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the reactive engine.
#[derive(Debug, Clone, Error)]
pub enum ReactiveError {
    /// A producer was read outside any reactive context and outside
    /// `isolate`. Always a programming error; never retried.
    #[error("reactive producer read outside any reactive context")]
    NoReactiveContext,

    /// A write was attempted on a value whose only legitimate writer is its
    /// external input source.
    #[error("value is read-only; only its external input source may write it")]
    ReadOnly,

    /// The body of a reactive expression failed. Re-raised to every reader
    /// until an upstream change triggers a fresh execution.
    #[error("reactive expression evaluation failed")]
    ExpressionEvaluationFailed(#[source] SharedError),

    /// An observer body failed. Raised out of the flush loop to the host;
    /// other queued observers still run.
    #[error("observer evaluation failed")]
    ObserverEvaluationFailed(#[source] SharedError),

    /// A flush did not settle within the configured iteration limit,
    /// suggesting an unbounded feedback loop in application logic.
    #[error("flush exceeded {0} iterations; reactivity loop suspected")]
    ReactivityLoopSuspected(usize),
}

impl ReactiveError {
    /// Wrap an arbitrary error as an expression evaluation failure.
    pub fn expression_failure<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ExpressionEvaluationFailed(Arc::new(source))
    }

    /// Wrap an arbitrary error as an observer evaluation failure.
    pub fn observer_failure<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ObserverEvaluationFailed(Arc::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_cause_is_reachable_through_source() {
        let error = ReactiveError::expression_failure(std::io::Error::other("boom"));

        let source = std::error::Error::source(&error).expect("cause attached");
        assert_eq!(source.to_string(), "boom");
    }

    #[test]
    fn errors_are_cloneable() {
        let error = ReactiveError::observer_failure(std::io::Error::other("boom"));
        let copy = error.clone();

        assert!(matches!(copy, ReactiveError::ObserverEvaluationFailed(_)));
    }

    #[test]
    fn loop_error_reports_limit() {
        let error = ReactiveError::ReactivityLoopSuspected(5);
        assert!(error.to_string().contains('5'));
    }
}
