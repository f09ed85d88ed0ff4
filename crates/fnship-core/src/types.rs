//! Shared types used across fnship crates.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// File name of every uploaded artifact inside its `{function}/{fingerprint}/` prefix.
pub const ARTIFACT_FILE_NAME: &str = "function.zip";

/// Fixed offset used to render human-readable deployment times (UTC−06:00).
pub const DISPLAY_UTC_OFFSET_SECS: i32 = -6 * 3600;

/// Format of [`DeploymentRecord::deployed_at`], e.g. `Mar 04, 2025 02:15 PM`.
pub const DISPLAY_TIME_FORMAT: &str = "%b %d, %Y %I:%M %p";

// ── Environment ───────────────────────────────────────────────────

/// Named deployment environment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Qa,
    Prod,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Qa => "qa",
            Environment::Prod => "prod",
        }
    }

    /// Map a git branch to the environment it deploys to.
    ///
    /// `feature/*` → dev, `qa` → qa, `main` → prod, anything else → dev.
    pub fn from_branch(branch: &str) -> Self {
        match branch.trim() {
            "qa" => Environment::Qa,
            "main" => Environment::Prod,
            _ => Environment::Dev,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "qa" => Ok(Environment::Qa),
            "prod" => Ok(Environment::Prod),
            _ => Err(CoreError::InvalidEnvironment(s.to_string())),
        }
    }
}

// ── Fingerprint ───────────────────────────────────────────────────

/// Hex-encoded SHA-256 digest of a function's source tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Length of the hex encoding.
    pub const HEX_LEN: usize = 64;

    /// Parse a lowercase hex digest.
    pub fn from_hex(hex: &str) -> Result<Self, CoreError> {
        let valid = hex.len() == Self::HEX_LEN
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(hex.to_string()))
        } else {
            Err(CoreError::InvalidFingerprint(hex.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentFingerprint {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ContentFingerprint> for String {
    fn from(value: ContentFingerprint) -> Self {
        value.0
    }
}

// ── Function unit ─────────────────────────────────────────────────

/// A deployable source directory discovered under the base directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionUnit {
    pub name: String,
    /// First directory below the base directory (e.g. `payments`).
    pub domain: String,
    pub source_path: PathBuf,
}

impl FunctionUnit {
    /// Name of the live compute target for this function in `environment`.
    pub fn target_name(&self, environment: Environment) -> String {
        target_name(&self.name, environment)
    }
}

/// Compute target naming convention: `{function}_{environment}`.
pub fn target_name(function: &str, environment: Environment) -> String {
    format!("{function}_{environment}")
}

/// Artifact object key convention: `{function}/{fingerprint}/function.zip`.
pub fn artifact_key(function: &str, fingerprint: &ContentFingerprint) -> String {
    format!("{function}/{fingerprint}/{ARTIFACT_FILE_NAME}")
}

// ── Deployment records ────────────────────────────────────────────

/// Who and what triggered a deployment; attached to every ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployIdentity {
    pub commit_id: String,
    pub branch_name: String,
    pub developer: String,
}

impl Default for DeployIdentity {
    fn default() -> Self {
        Self {
            commit_id: "unknown".to_string(),
            branch_name: "dev".to_string(),
            developer: "unknown".to_string(),
        }
    }
}

/// Unique deployment identifier: `{function}_{environment}_{utc timestamp}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    pub fn generate(function: &str, environment: Environment, at: DateTime<Utc>) -> Self {
        Self(format!(
            "{function}_{environment}_{}",
            at.format("%Y%m%d%H%M%S%9f")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeploymentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One successful deployment of a function to an environment.
///
/// Records are immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployment_id: DeploymentId,
    pub function_name: String,
    pub environment: Environment,
    pub fingerprint: ContentFingerprint,
    /// Human-readable time in the fixed display offset.
    pub deployed_at: String,
    pub deployed_at_utc: DateTime<Utc>,
    pub commit_id: String,
    pub branch_name: String,
    pub developer: String,
}

impl DeploymentRecord {
    pub fn new(
        function_name: &str,
        environment: Environment,
        fingerprint: ContentFingerprint,
        identity: &DeployIdentity,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            deployment_id: DeploymentId::generate(function_name, environment, at),
            function_name: function_name.to_string(),
            environment,
            fingerprint,
            deployed_at: format_display_time(at),
            deployed_at_utc: at,
            commit_id: identity.commit_id.clone(),
            branch_name: identity.branch_name.clone(),
            developer: identity.developer.clone(),
        }
    }

    pub fn target_name(&self) -> String {
        target_name(&self.function_name, self.environment)
    }

    pub fn artifact_key(&self) -> String {
        artifact_key(&self.function_name, &self.fingerprint)
    }
}

/// Render `at` in the fixed display offset.
pub fn format_display_time(at: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(DISPLAY_UTC_OFFSET_SECS) {
        Some(offset) => at.with_timezone(&offset).format(DISPLAY_TIME_FORMAT).to_string(),
        None => at.format(DISPLAY_TIME_FORMAT).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fp(c: char) -> ContentFingerprint {
        ContentFingerprint::from_hex(&c.to_string().repeat(64)).unwrap()
    }

    #[test]
    fn environment_from_branch() {
        assert_eq!(Environment::from_branch("feature/login"), Environment::Dev);
        assert_eq!(Environment::from_branch("qa"), Environment::Qa);
        assert_eq!(Environment::from_branch("main"), Environment::Prod);
        assert_eq!(Environment::from_branch("hotfix/x"), Environment::Dev);
    }

    #[test]
    fn environment_parse_is_case_insensitive() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn fingerprint_rejects_non_hex() {
        assert!(ContentFingerprint::from_hex("abc").is_err());
        assert!(ContentFingerprint::from_hex(&"G".repeat(64)).is_err());
        assert!(ContentFingerprint::from_hex(&"A".repeat(64)).is_err());
        assert_eq!(fp('b').short(), "bbbbbbbbbbbb");
    }

    #[test]
    fn naming_conventions() {
        assert_eq!(target_name("f2", Environment::Qa), "f2_qa");
        let key = artifact_key("f2", &fp('b'));
        assert_eq!(key, format!("f2/{}/function.zip", "b".repeat(64)));
    }

    #[test]
    fn record_renders_display_time_in_fixed_offset() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 20, 15, 0).unwrap();
        let record = DeploymentRecord::new(
            "f1",
            Environment::Prod,
            fp('a'),
            &DeployIdentity::default(),
            at,
        );
        assert_eq!(record.deployed_at, "Mar 04, 2025 02:15 PM");
        assert_eq!(record.deployment_id.as_str(), "f1_prod_20250304201500000000000");
        assert_eq!(record.target_name(), "f1_prod");
    }

    #[test]
    fn record_serde_round_trip_keeps_fingerprint_validation() {
        let record = DeploymentRecord::new(
            "f1",
            Environment::Dev,
            fp('c'),
            &DeployIdentity::default(),
            Utc::now(),
        );
        let json = serde_json::to_string(&record).unwrap();
        let back: DeploymentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);

        let tampered = json.replace(&"c".repeat(64), "zz");
        assert!(serde_json::from_str::<DeploymentRecord>(&tampered).is_err());
    }
}
