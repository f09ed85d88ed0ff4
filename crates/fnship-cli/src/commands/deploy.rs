use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use clap::builder::BoolishValueParser;
use fnship_core::{Backend, ConfigOverrides, Environment, FunctionRegistry, RunConfig};
use fnship_deploy::{Orchestrator, Outcome, Plan, RunSummary, UnitAction, UnitReport};
use fnship_ledger::RedbLedger;
use fnship_store::aws::{LambdaComputeTarget, S3ArtifactStore, load_sdk_config};
use fnship_store::{
    ArtifactStore, ComputeTarget, FsArtifactStore, FsComputeTarget, RetryPolicy, Retrying,
};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Environment to roll back: dev, qa or prod. Forward deploys always
    /// derive it from the branch.
    #[arg(short, long, env = "ENVIRONMENT")]
    pub environment: Option<String>,

    /// Roll back instead of deploying.
    #[arg(long, env = "IS_ROLLBACK", value_parser = BoolishValueParser::new())]
    pub rollback: bool,

    /// Restrict a rollback to these functions (comma-separated).
    #[arg(long, env = "SPECIFIC_LAMBDAS", value_delimiter = ',')]
    pub functions: Vec<String>,

    /// Commit recorded with each deployment.
    #[arg(long, env = "COMMIT_SHA")]
    pub commit: Option<String>,

    /// Branch recorded with each deployment; also selects the environment.
    #[arg(long, env = "BRANCH_NAME")]
    pub branch: Option<String>,

    /// Who triggered the deployment.
    #[arg(long, env = "DEVELOPER")]
    pub developer: Option<String>,

    /// Directory holding the function sources.
    #[arg(long, env = "FNSHIP_SOURCE_DIR")]
    pub source_dir: Option<PathBuf>,

    /// File that marks a directory as a function.
    #[arg(long)]
    pub entry_point: Option<String>,

    /// Functions processed concurrently.
    #[arg(long, env = "FNSHIP_MAX_WORKERS")]
    pub max_workers: Option<usize>,

    /// Storage and compute backend: local or aws.
    #[arg(long, env = "FNSHIP_BACKEND")]
    pub backend: Option<Backend>,

    /// Directory for the ledger and local backends.
    #[arg(long, env = "FNSHIP_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    #[arg(long, env = "S3_BUCKET_DEV")]
    pub bucket_dev: Option<String>,

    #[arg(long, env = "S3_BUCKET_QA")]
    pub bucket_qa: Option<String>,

    #[arg(long, env = "S3_BUCKET_PROD")]
    pub bucket_prod: Option<String>,

    /// Roll back without checking that the previous artifact still exists.
    #[arg(long)]
    pub skip_artifact_check: bool,

    /// Report decisions without packaging, uploading or recording anything.
    #[arg(long, env = "DRY_RUN", value_parser = BoolishValueParser::new())]
    pub dry_run: bool,
}

impl DeployArgs {
    fn into_overrides(self, force_rollback: bool) -> ConfigOverrides {
        let buckets: BTreeMap<Environment, String> = [
            (Environment::Dev, self.bucket_dev),
            (Environment::Qa, self.bucket_qa),
            (Environment::Prod, self.bucket_prod),
        ]
        .into_iter()
        .filter_map(|(env, bucket)| Some((env, bucket?)))
        .collect();

        ConfigOverrides {
            environment: self.environment,
            rollback: self.rollback || force_rollback,
            allow_list: self.functions,
            commit_id: self.commit,
            branch_name: self.branch,
            developer: self.developer,
            source_dir: self.source_dir,
            entry_point: self.entry_point,
            max_workers: self.max_workers,
            backend: self.backend,
            state_dir: self.state_dir,
            buckets,
            verify_rollback_artifact: self.skip_artifact_check.then_some(false),
            dry_run: self.dry_run,
        }
    }
}

pub async fn run(
    args: DeployArgs,
    config_path: Option<&Path>,
    force_rollback: bool,
    json: bool,
) -> anyhow::Result<RunSummary> {
    let file = super::load_file_config(config_path)?;
    let config = Arc::new(RunConfig::resolve(file, args.into_overrides(force_rollback))?);

    let units = FunctionRegistry::new(&config.source_dir, &config.entry_point).discover()?;
    if units.is_empty() {
        warn!(path = ?config.source_dir, "no functions found");
    }

    let ledger_path = config.ledger_path();
    let ledger = RedbLedger::open(&ledger_path)
        .with_context(|| format!("opening ledger {}", ledger_path.display()))?;
    let (artifacts, target) = build_backends(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let orchestrator = Orchestrator::new(config.clone(), Arc::new(ledger), artifacts, target);
    let summary = orchestrator.run(units, shutdown_rx).await;

    print_summary(&config, &summary, json)?;
    Ok(summary)
}

async fn build_backends(
    config: &RunConfig,
) -> anyhow::Result<(Arc<dyn ArtifactStore>, Arc<dyn ComputeTarget>)> {
    match config.backend {
        Backend::Local => Ok((
            Arc::new(FsArtifactStore::new(
                config.state_dir.join("artifacts"),
                config.bucket.clone(),
            )),
            Arc::new(FsComputeTarget::new(config.state_dir.join("targets"))),
        )),
        Backend::Aws => {
            let sdk = load_sdk_config().await;
            let store = S3ArtifactStore::new(&sdk, config.bucket.clone());
            store
                .validate_bucket()
                .await
                .context("validating artifact bucket")?;
            let policy = RetryPolicy::default();
            Ok((
                Arc::new(Retrying::new(store, policy)),
                Arc::new(Retrying::new(LambdaComputeTarget::new(&sdk), policy)),
            ))
        }
    }
}

fn print_summary(config: &RunConfig, summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    let reports = summary.sorted();
    if json {
        let units: Vec<_> = reports
            .iter()
            .map(|r| {
                serde_json::json!({
                    "function": r.function,
                    "status": r.status(),
                    "detail": detail(r),
                })
            })
            .collect();
        let body = serde_json::json!({
            "environment": config.environment,
            "rollback": config.is_rollback(),
            "dry_run": config.dry_run,
            "totals": summary.totals(),
            "units": units,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let mode = if config.is_rollback() { "rollback" } else { "deploy" };
    let dry = if config.dry_run { " (dry run)" } else { "" };
    println!("{mode} to {}{dry}", config.environment);
    for report in &reports {
        let mark = match report.outcome {
            Outcome::Succeeded(_) => "✓",
            Outcome::Failed(_) => "✗",
            Outcome::Cancelled => "-",
        };
        println!(
            "  {mark} {:<32} {:<12} {}",
            report.function,
            report.status(),
            detail(report)
        );
    }
    let totals = summary.totals();
    println!(
        "{} succeeded ({} skipped), {} failed, {} cancelled",
        totals.succeeded, totals.skipped, totals.failed, totals.cancelled
    );
    Ok(())
}

fn detail(report: &UnitReport) -> String {
    match &report.outcome {
        Outcome::Succeeded(UnitAction::Skipped(reason)) => reason.as_str().to_string(),
        Outcome::Succeeded(UnitAction::Deployed {
            location, uploaded, ..
        }) => {
            if *uploaded {
                format!("{location}")
            } else {
                format!("{location} (already stored)")
            }
        }
        Outcome::Succeeded(UnitAction::RolledBack {
            location, restored, ..
        }) => format!("{location} (from {restored})"),
        Outcome::Succeeded(UnitAction::Planned(Plan::Deploy {
            fingerprint,
            replaces,
        })) => match replaces {
            Some(previous) => format!("would deploy {} over {}", fingerprint.short(), previous.short()),
            None => format!("would deploy {} (first deployment)", fingerprint.short()),
        },
        Outcome::Succeeded(UnitAction::Planned(Plan::Rollback {
            fingerprint,
            deployment_id,
        })) => format!("would roll back to {} ({deployment_id})", fingerprint.short()),
        Outcome::Failed(e) => e.to_string(),
        Outcome::Cancelled => "not started".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnship_core::RunMode;

    fn args() -> DeployArgs {
        DeployArgs {
            environment: None,
            rollback: false,
            functions: Vec::new(),
            commit: None,
            branch: None,
            developer: None,
            source_dir: None,
            entry_point: None,
            max_workers: None,
            backend: None,
            state_dir: None,
            bucket_dev: None,
            bucket_qa: None,
            bucket_prod: None,
            skip_artifact_check: false,
            dry_run: false,
        }
    }

    #[test]
    fn rollback_subcommand_forces_rollback_mode() {
        let overrides = DeployArgs {
            environment: Some("prod".into()),
            functions: vec!["f1".into()],
            ..args()
        }
        .into_overrides(true);
        let config = RunConfig::resolve(None, overrides).unwrap();
        assert!(matches!(config.mode, RunMode::Rollback { allow_list: Some(_) }));
        assert!(config.verify_rollback_artifact);
    }

    #[test]
    fn only_given_buckets_are_overridden() {
        let overrides = DeployArgs {
            bucket_qa: Some("qa-artifacts".into()),
            skip_artifact_check: true,
            ..args()
        }
        .into_overrides(false);
        assert_eq!(overrides.buckets.len(), 1);
        assert_eq!(overrides.buckets[&Environment::Qa], "qa-artifacts");
        assert_eq!(overrides.verify_rollback_artifact, Some(false));
    }

    #[tokio::test]
    async fn local_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let unit = dir.path().join("lambdas/orders/create");
        std::fs::create_dir_all(&unit).unwrap();
        std::fs::write(unit.join("lambda_function.py"), "pass\n").unwrap();

        let run_args = || DeployArgs {
            environment: Some("dev".into()),
            source_dir: Some(dir.path().join("lambdas")),
            state_dir: Some(dir.path().join("state")),
            ..args()
        };
        let missing = dir.path().join("absent.toml");
        assert!(run(run_args(), Some(missing.as_path()), false, false).await.is_err());

        let summary = run(run_args(), None, false, true).await.unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.reports[0].status(), "deployed");

        let again = run(run_args(), None, false, false).await.unwrap();
        assert_eq!(again.skipped(), 1);
    }
}
