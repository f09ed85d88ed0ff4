//! Content-addressed artifact storage.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fnship_core::{ContentFingerprint, artifact_key};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Where an artifact lives: a bucket and an object key inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Result of a conditional upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub location: ArtifactLocation,
    /// False when the artifact was already present and nothing was written.
    pub uploaded: bool,
}

/// Write-once blob storage keyed by `(function, fingerprint)`.
///
/// Implementations must tolerate concurrent callers for different functions;
/// keys never overlap across functions, so no cross-function locking is needed.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Location an artifact has (or would have) in this store.
    fn location(&self, function: &str, fingerprint: &ContentFingerprint) -> ArtifactLocation;

    async fn exists(&self, function: &str, fingerprint: &ContentFingerprint) -> StoreResult<bool>;

    /// Upload `archive` unless an artifact with the same key already exists.
    /// Existing artifacts are never overwritten.
    async fn put_if_absent(
        &self,
        function: &str,
        fingerprint: &ContentFingerprint,
        archive: &Path,
    ) -> StoreResult<PutOutcome>;
}

/// Artifact store on the local filesystem: `{root}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
    bucket: String,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    fn object_path(&self, location: &ArtifactLocation) -> PathBuf {
        self.root.join(&location.bucket).join(&location.key)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn location(&self, function: &str, fingerprint: &ContentFingerprint) -> ArtifactLocation {
        ArtifactLocation {
            bucket: self.bucket.clone(),
            key: artifact_key(function, fingerprint),
        }
    }

    async fn exists(&self, function: &str, fingerprint: &ContentFingerprint) -> StoreResult<bool> {
        let path = self.object_path(&self.location(function, fingerprint));
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io("artifact lookup", e))
    }

    async fn put_if_absent(
        &self,
        function: &str,
        fingerprint: &ContentFingerprint,
        archive: &Path,
    ) -> StoreResult<PutOutcome> {
        let location = self.location(function, fingerprint);
        let dest = self.object_path(&location);
        let source = archive.to_path_buf();

        let uploaded = tokio::task::spawn_blocking(move || write_once(&source, &dest))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        if uploaded {
            info!(%location, "artifact stored");
        } else {
            debug!(%location, "artifact already present, upload skipped");
        }
        Ok(PutOutcome { location, uploaded })
    }
}

/// Copy `source` to `dest` unless `dest` exists. The copy goes through a temp
/// file in the destination directory and is linked into place without
/// clobbering, so a concurrent writer of the same key cannot be overwritten
/// and readers never see a partial artifact.
fn write_once(source: &Path, dest: &Path) -> StoreResult<bool> {
    if dest.exists() {
        return Ok(false);
    }
    let parent = dest.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| StoreError::io("artifact upload", e))?;

    let mut staged =
        tempfile::NamedTempFile::new_in(parent).map_err(|e| StoreError::io("artifact upload", e))?;
    let mut reader =
        std::fs::File::open(source).map_err(|e| StoreError::io("artifact upload", e))?;
    std::io::copy(&mut reader, staged.as_file_mut())
        .map_err(|e| StoreError::io("artifact upload", e))?;

    match staged.persist_noclobber(dest) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(StoreError::io("artifact upload", e.error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(c: char) -> ContentFingerprint {
        ContentFingerprint::from_hex(&c.to_string().repeat(64)).unwrap()
    }

    fn archive(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join(format!("upload-{}.zip", body.len()));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn put_then_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("artifacts"), "fnship-dev");
        assert!(!store.exists("f2", &fp('b')).await.unwrap());

        let outcome = store
            .put_if_absent("f2", &fp('b'), &archive(dir.path(), "zip-bytes"))
            .await
            .unwrap();
        assert!(outcome.uploaded);
        assert_eq!(outcome.location.key, format!("f2/{}/function.zip", "b".repeat(64)));
        assert!(store.exists("f2", &fp('b')).await.unwrap());
    }

    #[tokio::test]
    async fn second_put_is_a_noop_and_keeps_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("artifacts"), "fnship-dev");

        store
            .put_if_absent("f1", &fp('a'), &archive(dir.path(), "first"))
            .await
            .unwrap();
        let again = store
            .put_if_absent("f1", &fp('a'), &archive(dir.path(), "second!"))
            .await
            .unwrap();
        assert!(!again.uploaded);

        let stored = dir
            .path()
            .join("artifacts/fnship-dev")
            .join(&again.location.key);
        assert_eq!(std::fs::read_to_string(stored).unwrap(), "first");
    }

    #[tokio::test]
    async fn concurrent_puts_for_distinct_functions() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FsArtifactStore::new(dir.path().join("a"), "b"));
        let src = archive(dir.path(), "payload");

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let src = src.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put_if_absent(&format!("f{i}"), &fp('c'), &src)
                    .await
                    .unwrap()
                    .uploaded
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
    }

    #[tokio::test]
    async fn missing_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path(), "b");
        let err = store
            .put_if_absent("f1", &fp('a'), &dir.path().join("nope.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(!store.exists("f1", &fp('a')).await.unwrap());
    }
}
