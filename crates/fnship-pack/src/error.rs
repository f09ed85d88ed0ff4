use std::path::PathBuf;

use thiserror::Error;

pub type PackResult<T> = Result<T, PackError>;

#[derive(Debug, Error)]
pub enum PackError {
    /// Source tree missing or unreadable while fingerprinting.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive could not be written.
    #[error("failed to package {path}: {reason}")]
    Packaging { path: PathBuf, reason: String },
}
