//! Error Types
//!
//! Every failure the runtime can observe is described by [`ReactiveError`].
//! Most of them never reach the caller: invalid targets, invalid paths,
//! callback failures and runaway update loops are routed to the error
//! reporting hook (see [`crate::config::report`]) and the offending call
//! becomes a no-op. Only evaluation failures of non-`user` watchers
//! propagate through `Result`.

use thiserror::Error;

use crate::reactive::WatcherId;

/// Boxed error returned by user-supplied getters and callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Errors produced by the reactive runtime.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReactiveError {
    /// A mutation primitive was called on something that is not a container.
    #[error("cannot {operation} reactive property on a {found} value")]
    InvalidTarget {
        /// The primitive that was called (`set` or `delete`).
        operation: &'static str,
        /// Kind of value that was passed instead of a container.
        found: &'static str,
    },

    /// A watch expression is not a simple dot-delimited path.
    #[error(
        "failed watching path \"{0}\": only simple dot-delimited paths are accepted, \
         use a getter closure for full control"
    )]
    InvalidPath(String),

    /// A watcher's evaluation function failed.
    #[error("getter for watcher \"{expression}\" failed: {source}")]
    Evaluation {
        /// Expression of the failing watcher.
        expression: String,
        /// Error returned by the getter.
        #[source]
        source: BoxError,
    },

    /// A watcher's change callback failed.
    #[error("callback for watcher \"{expression}\" failed: {source}")]
    Callback {
        /// Expression of the failing watcher.
        expression: String,
        /// Error returned by the callback.
        #[source]
        source: BoxError,
    },

    /// A watcher kept re-queueing itself within a single flush.
    #[error(
        "infinite update loop in watcher \"{expression}\" ({watcher:?}): \
         re-queued more than {limit} times in one flush"
    )]
    InfiniteUpdateLoop {
        /// The offending watcher.
        watcher: WatcherId,
        /// Its expression.
        expression: String,
        /// The configured re-queue limit.
        limit: usize,
    },

    /// A snapshot was requested for a self-referential value graph.
    #[error("cannot snapshot a cyclic value graph")]
    CyclicValue,
}

impl ReactiveError {
    /// Wrap a getter failure.
    pub fn evaluation(expression: impl Into<String>, source: BoxError) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            source,
        }
    }

    /// Wrap a callback failure.
    pub fn callback(expression: impl Into<String>, source: BoxError) -> Self {
        Self::Callback {
            expression: expression.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = ReactiveError::InvalidTarget {
            operation: "set",
            found: "number",
        };
        assert_eq!(
            err.to_string(),
            "cannot set reactive property on a number value"
        );

        let err = ReactiveError::evaluation("a.b", "boom".into());
        assert_eq!(err.to_string(), "getter for watcher \"a.b\" failed: boom");
        assert!(std::error::Error::source(&err).is_some());
    }
}
