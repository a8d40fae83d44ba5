//! Error types for backend operations.

use std::time::Duration;

use foodtruck_store::StoreError;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The store answered with something other than the expected shape.
    #[error("unexpected store response: {0}")]
    Parse(String),

    /// A fetch needed for context (e.g. the current revision) found nothing.
    #[error("no document to act on: {0}")]
    Auth(String),

    /// A single store call exceeded its time bound.
    #[error("store call `{operation}` timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    /// Store failure, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}
