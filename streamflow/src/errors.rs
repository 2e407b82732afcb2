//! Error types for stream pipelines.
//!
//! Every error is terminal for the pipeline it was recorded on. Errors are
//! written once to the pipeline's error cell and returned by the next
//! terminal operation.

use parking_lot::Mutex;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// The main error type for stream operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The stream was used incorrectly.
    #[error("{0}")]
    Usage(#[from] UsageError),

    /// The pipeline's scope was cancelled or its deadline passed.
    #[error("stream cancelled: {0}")]
    Cancelled(String),

    /// A terminal operation that needs an element found none.
    #[error("stream is empty")]
    EmptyStream,

    /// A user-supplied function panicked inside a stage worker.
    #[error("worker in stage '{stage}' panicked: {message}")]
    WorkerPanicked {
        /// The stage the worker belonged to.
        stage: String,
        /// The panic message.
        message: String,
    },
}

impl StreamError {
    /// Returns true for [`StreamError::Usage`].
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Returns true for [`StreamError::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Misuse of a stream handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// The handle was already linked to another operation or consumed.
    #[error("stream already operated upon or closed")]
    AlreadyConsumed,

    /// `parallel` was requested after another operation.
    #[error("parallel operation must be the first operation")]
    ParallelNotFirst,

    /// `parallel` was requested with a degree below one.
    #[error("parallelism must be positive, but was {0}")]
    NonPositiveParallelism(usize),
}

/// Holds the first error recorded for a pipeline.
#[derive(Debug, Default)]
pub struct ErrorCell {
    slot: Mutex<Option<StreamError>>,
}

impl ErrorCell {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error` unless an earlier one is already stored.
    ///
    /// Returns true if this call stored the error.
    pub fn record(&self, error: StreamError) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(error);
        true
    }

    /// Returns the stored error, if any.
    #[must_use]
    pub fn get(&self) -> Option<StreamError> {
        self.slot.lock().clone()
    }

    /// Returns true once an error has been recorded.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }
}
