//! Orchestrator — runs the decision engine over every discovered unit.
//!
//! Each unit goes through decide → execute independently. Units are fanned
//! out to at most `max_workers` concurrent tasks; a failure in one never
//! stops the others. On the deploy path the ledger record is appended last,
//! so a record exists only for artifacts that were stored and activated.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use fnship_core::{ContentFingerprint, DeploymentRecord, FunctionUnit, RunConfig, RunMode};
use fnship_ledger::DeploymentLedger;
use fnship_pack::PackError;
use fnship_store::{ArtifactStore, ComputeTarget};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::decision::{Decision, decide_forward, decide_rollback};
use crate::error::{DeployError, DeployResult};
use crate::summary::{Plan, RunSummary, UnitAction, UnitReport};

/// Subdirectory of the state dir holding in-flight archives.
const SCRATCH_DIR: &str = "tmp";

/// Drives deployments for one run. Cheap to clone; clones share backends.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<RunConfig>,
    ledger: Arc<dyn DeploymentLedger>,
    artifacts: Arc<dyn ArtifactStore>,
    target: Arc<dyn ComputeTarget>,
    scratch_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        config: Arc<RunConfig>,
        ledger: Arc<dyn DeploymentLedger>,
        artifacts: Arc<dyn ArtifactStore>,
        target: Arc<dyn ComputeTarget>,
    ) -> Self {
        let scratch_dir = config.state_dir.join(SCRATCH_DIR);
        Self {
            config,
            ledger,
            artifacts,
            target,
            scratch_dir,
        }
    }

    /// Gather the inputs for `unit` and apply the decision rules.
    pub async fn decide(&self, unit: &FunctionUnit) -> DeployResult<Decision> {
        let environment = self.config.environment;
        match &self.config.mode {
            RunMode::Forward => {
                let source = unit.source_path.clone();
                let current = tokio::task::spawn_blocking(move || fnship_pack::fingerprint(&source))
                    .await
                    .map_err(worker_error)?
                    .map_err(DeployError::Io)?;
                let latest = self.ledger.latest_fingerprint(&unit.name, environment).await?;
                debug!(
                    function = %unit.name,
                    current = %current.short(),
                    latest = latest.as_ref().map(|f| f.short()).unwrap_or("none"),
                    "fingerprint compared"
                );
                Ok(decide_forward(current, latest))
            }
            RunMode::Rollback { .. } => {
                let eligible = self.config.is_eligible(&unit.name);
                let previous = if eligible {
                    self.ledger.previous_record(&unit.name, environment).await?
                } else {
                    None
                };
                Ok(decide_rollback(eligible, &unit.name, environment, previous))
            }
        }
    }

    /// Decide and execute for a single unit.
    pub async fn process_unit(&self, unit: &FunctionUnit) -> DeployResult<UnitAction> {
        let decision = self.decide(unit).await?;

        if self.config.dry_run {
            return match decision {
                Decision::Skip(reason) => Ok(UnitAction::Skipped(reason)),
                Decision::Deploy {
                    fingerprint,
                    replaces,
                } => Ok(UnitAction::Planned(Plan::Deploy {
                    fingerprint,
                    replaces,
                })),
                Decision::Rollback { record } => Ok(UnitAction::Planned(Plan::Rollback {
                    fingerprint: record.fingerprint,
                    deployment_id: record.deployment_id,
                })),
                Decision::Fail(e) => Err(e),
            };
        }

        match decision {
            Decision::Skip(reason) => {
                info!(function = %unit.name, reason = reason.as_str(), "skipped");
                Ok(UnitAction::Skipped(reason))
            }
            Decision::Deploy { fingerprint, .. } => self.deploy(unit, fingerprint).await,
            Decision::Rollback { record } => self.rollback(unit, record).await,
            Decision::Fail(e) => Err(e),
        }
    }

    async fn deploy(
        &self,
        unit: &FunctionUnit,
        fingerprint: ContentFingerprint,
    ) -> DeployResult<UnitAction> {
        let environment = self.config.environment;
        let source = unit.source_path.clone();
        let scratch = self.scratch_dir.clone();

        // Removed on drop, whichever way this function returns.
        let archive = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&scratch).map_err(|e| PackError::Packaging {
                path: scratch.clone(),
                reason: e.to_string(),
            })?;
            fnship_pack::pack_to_file(&source, &scratch)
        })
        .await
        .map_err(worker_error)?
        .map_err(DeployError::Packaging)?;
        debug!(function = %unit.name, size_bytes = archive.size_bytes(), "archive built");

        let put = self
            .artifacts
            .put_if_absent(&unit.name, &fingerprint, archive.path())
            .await
            .map_err(DeployError::Upload)?;

        let target_name = unit.target_name(environment);
        self.target
            .update_target(&target_name, &put.location)
            .await
            .map_err(DeployError::TargetUpdate)?;

        let record = DeploymentRecord::new(
            &unit.name,
            environment,
            fingerprint.clone(),
            &self.config.identity,
            Utc::now(),
        );
        let deployment_id = record.deployment_id.clone();
        self.ledger.append(record).await?;

        info!(
            function = %unit.name,
            target = %target_name,
            fingerprint = %fingerprint.short(),
            uploaded = put.uploaded,
            deployment_id = %deployment_id,
            "deployed"
        );
        Ok(UnitAction::Deployed {
            fingerprint,
            location: put.location,
            uploaded: put.uploaded,
            deployment_id,
        })
    }

    async fn rollback(
        &self,
        unit: &FunctionUnit,
        record: DeploymentRecord,
    ) -> DeployResult<UnitAction> {
        let fingerprint = record.fingerprint;
        let location = self.artifacts.location(&unit.name, &fingerprint);

        if self.config.verify_rollback_artifact
            && !self
                .artifacts
                .exists(&unit.name, &fingerprint)
                .await
                .map_err(DeployError::ArtifactLookup)?
        {
            return Err(DeployError::MissingArtifact {
                location: location.to_string(),
            });
        }

        let target_name = unit.target_name(self.config.environment);
        self.target
            .update_target(&target_name, &location)
            .await
            .map_err(DeployError::TargetUpdate)?;

        info!(
            function = %unit.name,
            target = %target_name,
            fingerprint = %fingerprint.short(),
            restored = %record.deployment_id,
            "rolled back"
        );
        Ok(UnitAction::RolledBack {
            fingerprint,
            location,
            restored: record.deployment_id,
        })
    }

    /// Process `units` with at most `max_workers` in flight.
    ///
    /// Once `shutdown` turns true no further units are started; those still
    /// waiting are reported as cancelled while in-flight units finish.
    pub async fn run(
        &self,
        units: Vec<FunctionUnit>,
        mut shutdown: watch::Receiver<bool>,
    ) -> RunSummary {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut summary = RunSummary::default();

        info!(
            units = units.len(),
            max_workers = self.config.max_workers,
            environment = %self.config.environment,
            rollback = self.config.is_rollback(),
            dry_run = self.config.dry_run,
            "starting deployment run"
        );

        let mut pending = units.into_iter();
        while let Some(unit) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                warn!("shutdown requested, not starting remaining functions");
                summary.push(UnitReport::cancelled(unit.name));
                for unit in pending.by_ref() {
                    summary.push(UnitReport::cancelled(unit.name));
                }
                break;
            };

            in_flight.insert(unit.name.clone());
            let orchestrator = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = orchestrator.process_unit(&unit).await;
                (unit.name, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((function, result)) => {
                    in_flight.remove(&function);
                    if let Err(e) = &result {
                        error!(function = %function, kind = e.kind(), error = %e, "function failed");
                    }
                    summary.push(UnitReport::from_result(function, result));
                }
                Err(e) => error!(error = %e, "worker task aborted"),
            }
        }

        // Anything left never reported back: its task panicked.
        for function in in_flight {
            summary.push(UnitReport::from_result(
                function,
                Err(DeployError::Worker("worker task panicked".into())),
            ));
        }

        let totals = summary.totals();
        info!(
            total = totals.total,
            succeeded = totals.succeeded,
            skipped = totals.skipped,
            failed = totals.failed,
            cancelled = totals.cancelled,
            "deployment complete"
        );
        summary
    }
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn worker_error(e: JoinError) -> DeployError {
    DeployError::Worker(e.to_string())
}
