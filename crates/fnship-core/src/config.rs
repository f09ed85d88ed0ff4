//! Run configuration: `fnship.toml` parsing and layering with CLI/env values.
//!
//! The resolved [`RunConfig`] is built once at startup and handed to the
//! orchestrator by reference; nothing below the CLI reads the process
//! environment.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::types::{DeployIdentity, Environment};

pub const DEFAULT_SOURCE_DIR: &str = "lambdas";
pub const DEFAULT_ENTRY_POINT: &str = "lambda_function.py";
pub const DEFAULT_MAX_WORKERS: usize = 5;
pub const DEFAULT_STATE_DIR: &str = ".fnship";
pub const DEFAULT_CONFIG_FILE: &str = "fnship.toml";
pub const LEDGER_FILE_NAME: &str = "ledger.redb";

/// Which storage/compute services the run talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Artifacts and targets on the local filesystem under the state dir.
    #[default]
    Local,
    /// S3 artifacts and Lambda targets.
    Aws,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => f.write_str("local"),
            Backend::Aws => f.write_str("aws"),
        }
    }
}

impl FromStr for Backend {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "aws" => Ok(Backend::Aws),
            _ => Err(CoreError::InvalidBackend(s.to_string())),
        }
    }
}

// ── fnship.toml ───────────────────────────────────────────────────

/// Contents of an optional `fnship.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub source: Option<SourceSection>,
    pub deploy: Option<DeploySection>,
    /// Artifact bucket per environment.
    pub buckets: Option<BTreeMap<Environment, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSection {
    pub dir: Option<PathBuf>,
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploySection {
    pub max_workers: Option<usize>,
    pub backend: Option<Backend>,
    pub state_dir: Option<PathBuf>,
    pub verify_rollback_artifact: Option<bool>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| CoreError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load `explicit` if given, else `fnship.toml` in `dir` when present.
    pub fn locate(explicit: Option<&Path>, dir: &Path) -> CoreResult<Option<Self>> {
        match explicit {
            Some(path) => Self::from_file(path).map(Some),
            None => {
                let default = dir.join(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(&default).map(Some)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// State directory named in the file, if any.
    pub fn state_dir(&self) -> Option<&Path> {
        self.deploy.as_ref()?.state_dir.as_deref()
    }
}

// ── Overrides ─────────────────────────────────────────────────────

/// Values supplied on the command line or through environment variables.
/// These win over `fnship.toml`.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub environment: Option<String>,
    pub rollback: bool,
    pub allow_list: Vec<String>,
    pub commit_id: Option<String>,
    pub branch_name: Option<String>,
    pub developer: Option<String>,
    pub source_dir: Option<PathBuf>,
    pub entry_point: Option<String>,
    pub max_workers: Option<usize>,
    pub backend: Option<Backend>,
    pub state_dir: Option<PathBuf>,
    pub buckets: BTreeMap<Environment, String>,
    pub verify_rollback_artifact: Option<bool>,
    pub dry_run: bool,
}

// ── Resolved configuration ────────────────────────────────────────

/// Forward deploy or rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Forward,
    /// `allow_list = None` means every discovered function is eligible.
    Rollback { allow_list: Option<BTreeSet<String>> },
}

/// Immutable configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub environment: Environment,
    pub mode: RunMode,
    pub identity: DeployIdentity,
    pub source_dir: PathBuf,
    pub entry_point: String,
    pub max_workers: usize,
    pub backend: Backend,
    pub state_dir: PathBuf,
    /// Artifact bucket for `environment`.
    pub bucket: String,
    /// Check the previous artifact still exists before rolling back to it.
    pub verify_rollback_artifact: bool,
    pub dry_run: bool,
}

impl RunConfig {
    /// Layer `overrides` over `file` over defaults and validate the result.
    pub fn resolve(file: Option<FileConfig>, overrides: ConfigOverrides) -> CoreResult<Self> {
        let file = file.unwrap_or_default();
        let source = file.source.unwrap_or_default();
        let deploy = file.deploy.unwrap_or_default();
        let file_buckets = file.buckets.unwrap_or_default();

        let defaults = DeployIdentity::default();
        let identity = DeployIdentity {
            commit_id: non_empty(overrides.commit_id).unwrap_or(defaults.commit_id),
            branch_name: non_empty(overrides.branch_name).unwrap_or(defaults.branch_name),
            developer: non_empty(overrides.developer).unwrap_or(defaults.developer),
        };

        let explicit_env = non_empty(overrides.environment)
            .map(|e| e.parse::<Environment>())
            .transpose()?;
        // Forward deploys always follow the branch; ENVIRONMENT only selects
        // the rollback target.
        let environment = if overrides.rollback {
            explicit_env.ok_or(CoreError::MissingEnvironment)?
        } else {
            let derived = Environment::from_branch(&identity.branch_name);
            if let Some(env) = explicit_env.filter(|env| *env != derived) {
                warn!(
                    requested = %env,
                    branch = %identity.branch_name,
                    environment = %derived,
                    "forward deploys follow the branch; ignoring requested environment"
                );
            }
            derived
        };

        let allow_list: BTreeSet<String> = overrides
            .allow_list
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        let mode = if overrides.rollback {
            RunMode::Rollback {
                allow_list: (!allow_list.is_empty()).then_some(allow_list),
            }
        } else {
            if !allow_list.is_empty() {
                warn!(
                    count = allow_list.len(),
                    "function allow-list only applies to rollbacks; ignoring"
                );
            }
            RunMode::Forward
        };

        let max_workers = overrides
            .max_workers
            .or(deploy.max_workers)
            .unwrap_or(DEFAULT_MAX_WORKERS);
        if max_workers == 0 {
            return Err(CoreError::InvalidWorkerCount);
        }

        let backend = overrides.backend.or(deploy.backend).unwrap_or_default();
        let bucket = non_empty(overrides.buckets.get(&environment).cloned())
            .or_else(|| non_empty(file_buckets.get(&environment).cloned()));
        let bucket = match (backend, bucket) {
            (_, Some(bucket)) => bucket,
            (Backend::Local, None) => format!("fnship-{environment}"),
            (Backend::Aws, None) => return Err(CoreError::MissingBucket(environment)),
        };

        let config = Self {
            environment,
            mode,
            identity,
            source_dir: overrides
                .source_dir
                .or(source.dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_DIR)),
            entry_point: non_empty(overrides.entry_point)
                .or(non_empty(source.entry_point))
                .unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string()),
            max_workers,
            backend,
            state_dir: overrides
                .state_dir
                .or(deploy.state_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            bucket,
            verify_rollback_artifact: overrides
                .verify_rollback_artifact
                .or(deploy.verify_rollback_artifact)
                .unwrap_or(true),
            dry_run: overrides.dry_run,
        };

        info!(
            environment = %config.environment,
            rollback = config.is_rollback(),
            backend = %config.backend,
            bucket = %config.bucket,
            dry_run = config.dry_run,
            "run configuration resolved"
        );
        Ok(config)
    }

    pub fn is_rollback(&self) -> bool {
        matches!(self.mode, RunMode::Rollback { .. })
    }

    /// Whether `function` may be acted on in this run.
    ///
    /// Always true for forward deploys; under rollback, true when no
    /// allow-list is configured or the function is on it.
    pub fn is_eligible(&self, function: &str) -> bool {
        match &self.mode {
            RunMode::Forward => true,
            RunMode::Rollback { allow_list: None } => true,
            RunMode::Rollback {
                allow_list: Some(names),
            } => names.contains(function),
        }
    }

    /// Path of the redb ledger file.
    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join(LEDGER_FILE_NAME)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_deploy_derives_environment_from_branch() {
        let config = RunConfig::resolve(
            None,
            ConfigOverrides {
                branch_name: Some("main".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.environment, Environment::Prod);
        assert_eq!(config.mode, RunMode::Forward);
        assert_eq!(config.bucket, "fnship-prod");
        assert_eq!(config.max_workers, DEFAULT_MAX_WORKERS);
        assert_eq!(config.identity.commit_id, "unknown");
    }

    #[test]
    fn forward_deploy_ignores_exported_environment() {
        let overrides = || ConfigOverrides {
            environment: Some("prod".into()),
            branch_name: Some("feature/login".into()),
            ..Default::default()
        };
        let config = RunConfig::resolve(None, overrides()).unwrap();
        assert_eq!(config.environment, Environment::Dev);

        let config = RunConfig::resolve(
            None,
            ConfigOverrides {
                rollback: true,
                ..overrides()
            },
        )
        .unwrap();
        assert_eq!(config.environment, Environment::Prod);
    }

    #[test]
    fn rollback_requires_environment() {
        let err = RunConfig::resolve(
            None,
            ConfigOverrides {
                rollback: true,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MissingEnvironment));
    }

    #[test]
    fn allow_list_scopes_rollback_only() {
        let rollback = RunConfig::resolve(
            None,
            ConfigOverrides {
                environment: Some("dev".into()),
                rollback: true,
                allow_list: vec!["f1".into(), " ".into()],
                ..Default::default()
            },
        )
        .unwrap();
        assert!(rollback.is_eligible("f1"));
        assert!(!rollback.is_eligible("f2"));

        let forward = RunConfig::resolve(
            None,
            ConfigOverrides {
                allow_list: vec!["f1".into()],
                ..Default::default()
            },
        )
        .unwrap();
        assert!(forward.is_eligible("f2"));
    }

    #[test]
    fn aws_backend_requires_bucket() {
        let err = RunConfig::resolve(
            None,
            ConfigOverrides {
                branch_name: Some("main".into()),
                backend: Some(Backend::Aws),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MissingBucket(Environment::Prod)));
    }

    #[test]
    fn zero_workers_rejected() {
        let err = RunConfig::resolve(
            None,
            ConfigOverrides {
                max_workers: Some(0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidWorkerCount));
    }

    #[test]
    fn file_values_sit_below_overrides() {
        let file: FileConfig = toml::from_str(
            r#"
[source]
dir = "functions"
entry_point = "handler.py"

[deploy]
max_workers = 8
backend = "aws"
verify_rollback_artifact = false

[buckets]
dev = "artifacts-dev"
prod = "artifacts-prod"
"#,
        )
        .unwrap();

        let config = RunConfig::resolve(
            Some(file),
            ConfigOverrides {
                environment: Some("dev".into()),
                max_workers: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.source_dir, PathBuf::from("functions"));
        assert_eq!(config.entry_point, "handler.py");
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.backend, Backend::Aws);
        assert_eq!(config.bucket, "artifacts-dev");
        assert!(!config.verify_rollback_artifact);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = FileConfig::from_file(Path::new("/nonexistent/fnship.toml")).unwrap_err();
        assert!(matches!(err, CoreError::ConfigFile { .. }));
    }

    #[test]
    fn locate_prefers_explicit_then_default_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileConfig::locate(None, dir.path()).unwrap().is_none());

        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[deploy]\nstate_dir = \"/var/lib/fnship\"\n",
        )
        .unwrap();
        let found = FileConfig::locate(None, dir.path()).unwrap().unwrap();
        assert_eq!(found.state_dir(), Some(Path::new("/var/lib/fnship")));

        let explicit = dir.path().join("other.toml");
        std::fs::write(&explicit, "[source]\ndir = \"functions\"\n").unwrap();
        let found = FileConfig::locate(Some(&explicit), dir.path()).unwrap().unwrap();
        assert!(found.state_dir().is_none());
        assert_eq!(
            found.source.unwrap().dir,
            Some(PathBuf::from("functions"))
        );
    }
}
