//! Per-unit failure taxonomy.

use fnship_core::Environment;
use fnship_ledger::LedgerError;
use fnship_pack::PackError;
use fnship_store::StoreError;
use thiserror::Error;

pub type DeployResult<T> = Result<T, DeployError>;

/// Why a unit failed.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("failed to read source tree: {0}")]
    Io(#[source] PackError),

    #[error("packaging failed: {0}")]
    Packaging(#[source] PackError),

    #[error("artifact upload failed: {0}")]
    Upload(#[source] StoreError),

    #[error("artifact lookup failed: {0}")]
    ArtifactLookup(#[source] StoreError),

    #[error("target update failed: {0}")]
    TargetUpdate(#[source] StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("no previous deployment of {function} in {environment} to roll back to")]
    NoRollbackTarget {
        function: String,
        environment: Environment,
    },

    #[error("rollback artifact {location} no longer exists")]
    MissingArtifact { location: String },

    #[error("worker failed: {0}")]
    Worker(String),
}

impl DeployError {
    /// Short machine-readable label for summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::Io(_) => "io",
            DeployError::Packaging(_) => "packaging",
            DeployError::Upload(_) => "upload",
            DeployError::ArtifactLookup(_) => "artifact_lookup",
            DeployError::TargetUpdate(_) => "target_update",
            DeployError::Ledger(_) => "ledger",
            DeployError::NoRollbackTarget { .. } => "no_rollback_target",
            DeployError::MissingArtifact { .. } => "missing_artifact",
            DeployError::Worker(_) => "worker",
        }
    }
}
