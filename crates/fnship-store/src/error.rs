//! Error types for artifact storage and target updates.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} failed: {reason}")]
    Service {
        operation: &'static str,
        reason: String,
        /// Throttling, timeouts and 5xx responses.
        transient: bool,
    },

    #[error("bucket not accessible: {0}")]
    Bucket(String),

    #[error("invalid target pointer {path}: {reason}")]
    Pointer { path: String, reason: String },

    #[error("store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn io(operation: &'static str, source: std::io::Error) -> Self {
        StoreError::Io { operation, source }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            StoreError::Service { transient, .. } => *transient,
            StoreError::Bucket(_) | StoreError::Pointer { .. } | StoreError::Task(_) => false,
        }
    }
}
