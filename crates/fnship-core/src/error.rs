//! Error types for configuration and discovery.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Environment;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building the run configuration or discovering functions.
///
/// Every variant is fatal for the run: nothing has been deployed yet when
/// one of these surfaces.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid environment: {0:?} (expected dev, qa or prod)")]
    InvalidEnvironment(String),

    #[error("invalid backend: {0:?} (expected local or aws)")]
    InvalidBackend(String),

    #[error("invalid fingerprint: {0:?}")]
    InvalidFingerprint(String),

    #[error("an environment is required for rollback")]
    MissingEnvironment,

    #[error("artifact bucket not configured for environment: {0}")]
    MissingBucket(Environment),

    #[error("max_workers must be at least 1")]
    InvalidWorkerCount,

    #[error("failed to read config file {path}: {reason}")]
    ConfigFile { path: PathBuf, reason: String },

    #[error("failed to scan {path}: {reason}")]
    Discovery { path: PathBuf, reason: String },

    #[error("function name {name:?} is used by both {first} and {second}")]
    DuplicateFunction {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}
