//! S3 artifact store and Lambda compute target.
//!
//! SDK-level retries are disabled: wrap these in [`crate::Retrying`] so the
//! attempt budget is applied once. Failures surface as
//! [`StoreError::Service`] with the transient flag set for throttling,
//! timeouts and 5xx responses.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use fnship_core::{ContentFingerprint, artifact_key};
use tracing::{debug, info};

use crate::artifact::{ArtifactLocation, ArtifactStore, PutOutcome};
use crate::error::{StoreError, StoreResult};
use crate::target::ComputeTarget;

/// Load shared SDK configuration from the ambient AWS environment.
pub async fn load_sdk_config() -> aws_config::SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .retry_config(RetryConfig::disabled())
        .load()
        .await
}

/// Map an SDK error, marking throttling, timeouts and 5xx as transient.
fn service_error<E>(operation: &'static str, err: SdkError<E>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        _ => matches!(status, Some(429) | Some(500..=599)),
    };
    StoreError::Service {
        operation,
        reason: DisplayErrorContext(&err).to_string(),
        transient,
    }
}

// ── S3 ────────────────────────────────────────────────────────────

/// Artifacts in an S3 bucket under `{function}/{fingerprint}/function.zip`.
#[derive(Debug, Clone)]
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ArtifactStore {
    pub fn new(config: &aws_config::SdkConfig, bucket: impl Into<String>) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(config),
            bucket: bucket.into(),
        }
    }

    /// Check that the bucket exists and is reachable with current credentials.
    pub async fn validate_bucket(&self) -> StoreResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!(bucket = %self.bucket, "artifact bucket validated");
                Ok(())
            }
            Err(err) => {
                let reason = match err.raw_response().map(|r| r.status().as_u16()) {
                    Some(404) => format!("bucket does not exist: {}", self.bucket),
                    Some(403) => format!("no permission to access bucket: {}", self.bucket),
                    _ => format!("{}: {}", self.bucket, DisplayErrorContext(&err)),
                };
                Err(StoreError::Bucket(reason))
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    fn location(&self, function: &str, fingerprint: &ContentFingerprint) -> ArtifactLocation {
        ArtifactLocation {
            bucket: self.bucket.clone(),
            key: artifact_key(function, fingerprint),
        }
    }

    async fn exists(&self, function: &str, fingerprint: &ContentFingerprint) -> StoreResult<bool> {
        let key = artifact_key(function, fingerprint);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(service_error("artifact lookup", err)),
        }
    }

    async fn put_if_absent(
        &self,
        function: &str,
        fingerprint: &ContentFingerprint,
        archive: &Path,
    ) -> StoreResult<PutOutcome> {
        let location = self.location(function, fingerprint);
        if self.exists(function, fingerprint).await? {
            debug!(%location, "artifact already present, upload skipped");
            return Ok(PutOutcome {
                location,
                uploaded: false,
            });
        }

        let body = ByteStream::from_path(archive).await.map_err(|e| StoreError::Service {
            operation: "artifact upload",
            reason: e.to_string(),
            transient: false,
        })?;

        // `If-None-Match: *` keeps the write conditional when two runs race.
        let result = self
            .client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(body)
            .if_none_match("*")
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(%location, "artifact uploaded");
                Ok(PutOutcome {
                    location,
                    uploaded: true,
                })
            }
            Err(err) if err.raw_response().map(|r| r.status().as_u16()) == Some(412) => {
                debug!(%location, "artifact written concurrently, upload skipped");
                Ok(PutOutcome {
                    location,
                    uploaded: false,
                })
            }
            Err(err) => Err(service_error("artifact upload", err)),
        }
    }
}

// ── Lambda ────────────────────────────────────────────────────────

/// Lambda functions named `{function}_{environment}`, updated from S3.
#[derive(Debug, Clone)]
pub struct LambdaComputeTarget {
    client: aws_sdk_lambda::Client,
}

impl LambdaComputeTarget {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_lambda::Client::new(config),
        }
    }
}

#[async_trait]
impl ComputeTarget for LambdaComputeTarget {
    async fn update_target(
        &self,
        target_name: &str,
        location: &ArtifactLocation,
    ) -> StoreResult<()> {
        self.client
            .update_function_code()
            .function_name(target_name)
            .s3_bucket(&location.bucket)
            .s3_key(&location.key)
            .send()
            .await
            .map_err(|err| service_error("target update", err))?;
        info!(target = %target_name, %location, "lambda function updated");
        Ok(())
    }
}
