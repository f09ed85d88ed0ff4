//! Compute targets: the live pointer to a function's active artifact.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifact::ArtifactLocation;
use crate::error::{StoreError, StoreResult};

/// Repoints a named compute target (`{function}_{environment}`) at an artifact.
#[async_trait]
pub trait ComputeTarget: Send + Sync {
    async fn update_target(&self, target_name: &str, location: &ArtifactLocation)
    -> StoreResult<()>;
}

/// What a local target currently runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPointer {
    pub target: String,
    pub location: ArtifactLocation,
    pub updated_at: DateTime<Utc>,
}

/// Targets as JSON pointer files: `{dir}/{target}.json`.
#[derive(Debug, Clone)]
pub struct FsComputeTarget {
    dir: PathBuf,
}

impl FsComputeTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn pointer_path(&self, target_name: &str) -> PathBuf {
        self.dir.join(format!("{target_name}.json"))
    }

    /// Read the pointer for `target_name`, if it was ever set.
    pub fn current(&self, target_name: &str) -> StoreResult<Option<TargetPointer>> {
        let path = self.pointer_path(target_name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io("target read", e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Pointer {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ComputeTarget for FsComputeTarget {
    async fn update_target(
        &self,
        target_name: &str,
        location: &ArtifactLocation,
    ) -> StoreResult<()> {
        let pointer = TargetPointer {
            target: target_name.to_string(),
            location: location.clone(),
            updated_at: Utc::now(),
        };
        let body = serde_json::to_vec_pretty(&pointer).map_err(|e| StoreError::Pointer {
            path: target_name.to_string(),
            reason: e.to_string(),
        })?;
        let dir = self.dir.clone();
        let path = self.pointer_path(target_name);

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            std::fs::create_dir_all(&dir).map_err(|e| StoreError::io("target update", e))?;
            let mut staged = tempfile::NamedTempFile::new_in(&dir)
                .map_err(|e| StoreError::io("target update", e))?;
            staged
                .write_all(&body)
                .map_err(|e| StoreError::io("target update", e))?;
            staged
                .persist(&path)
                .map_err(|e| StoreError::io("target update", e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        info!(target = %target_name, %location, "target updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(key: &str) -> ArtifactLocation {
        ArtifactLocation {
            bucket: "fnship-dev".into(),
            key: key.into(),
        }
    }

    #[tokio::test]
    async fn update_overwrites_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let targets = FsComputeTarget::new(dir.path().join("targets"));
        assert!(targets.current("f1_dev").unwrap().is_none());

        targets.update_target("f1_dev", &location("f1/a/function.zip")).await.unwrap();
        targets.update_target("f1_dev", &location("f1/b/function.zip")).await.unwrap();

        let pointer = targets.current("f1_dev").unwrap().unwrap();
        assert_eq!(pointer.target, "f1_dev");
        assert_eq!(pointer.location.key, "f1/b/function.zip");
    }

    #[tokio::test]
    async fn corrupt_pointer_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f1_dev.json"), "not json").unwrap();
        let targets = FsComputeTarget::new(dir.path());
        assert!(matches!(
            targets.current("f1_dev").unwrap_err(),
            StoreError::Pointer { .. }
        ));
    }
}
