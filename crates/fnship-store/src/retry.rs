//! Bounded retry with exponential backoff for transient store failures.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use fnship_core::ContentFingerprint;
use tracing::warn;

use crate::artifact::{ArtifactLocation, ArtifactStore, PutOutcome};
use crate::error::StoreResult;
use crate::target::ComputeTarget;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// How many times to try a call and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Run `call` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(operation, attempt, max_attempts, ?delay, error = %e, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Wraps an [`ArtifactStore`] or [`ComputeTarget`] with a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ArtifactStore> ArtifactStore for Retrying<S> {
    fn location(&self, function: &str, fingerprint: &ContentFingerprint) -> ArtifactLocation {
        self.inner.location(function, fingerprint)
    }

    async fn exists(&self, function: &str, fingerprint: &ContentFingerprint) -> StoreResult<bool> {
        self.policy
            .run("artifact lookup", || self.inner.exists(function, fingerprint))
            .await
    }

    async fn put_if_absent(
        &self,
        function: &str,
        fingerprint: &ContentFingerprint,
        archive: &Path,
    ) -> StoreResult<PutOutcome> {
        self.policy
            .run("artifact upload", || {
                self.inner.put_if_absent(function, fingerprint, archive)
            })
            .await
    }
}

#[async_trait]
impl<S: ComputeTarget> ComputeTarget for Retrying<S> {
    async fn update_target(
        &self,
        target_name: &str,
        location: &ArtifactLocation,
    ) -> StoreResult<()> {
        self.policy
            .run("target update", || self.inner.update_target(target_name, location))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn transient() -> StoreError {
        StoreError::Service {
            operation: "test",
            reason: "throttled".into(),
            transient: true,
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run("op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = fast()
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = fast()
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Bucket("gone".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct FlakyTarget {
        failures_left: Mutex<u32>,
    }

    #[async_trait]
    impl ComputeTarget for FlakyTarget {
        async fn update_target(&self, _: &str, _: &ArtifactLocation) -> StoreResult<()> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(transient());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn decorator_retries_target_updates() {
        let target = Retrying::new(
            FlakyTarget {
                failures_left: Mutex::new(2),
            },
            fast(),
        );
        let location = ArtifactLocation {
            bucket: "b".into(),
            key: "k".into(),
        };
        target.update_target("f1_dev", &location).await.unwrap();
        assert_eq!(*target.inner().failures_left.lock().unwrap(), 0);
    }
}
