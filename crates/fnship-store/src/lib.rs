//! fnship-store — where artifacts live and which artifact each target runs.
//!
//! Two seams, each with a local-filesystem implementation and an AWS one:
//!
//! - **`ArtifactStore`**: write-once blobs keyed `{function}/{fingerprint}/function.zip`
//! - **`ComputeTarget`**: repoints `{function}_{environment}` at an artifact
//!
//! `Retrying` wraps either seam with a bounded retry budget for transient
//! failures.

pub mod artifact;
#[cfg(feature = "aws")]
pub mod aws;
pub mod error;
pub mod retry;
pub mod target;

pub use artifact::{ArtifactLocation, ArtifactStore, FsArtifactStore, PutOutcome};
pub use error::{StoreError, StoreResult};
pub use retry::{RetryPolicy, Retrying};
pub use target::{ComputeTarget, FsComputeTarget, TargetPointer};
