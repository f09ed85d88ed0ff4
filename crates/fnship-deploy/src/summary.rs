//! Per-unit outcomes and run totals.

use fnship_core::{ContentFingerprint, DeploymentId};
use fnship_store::ArtifactLocation;
use serde::Serialize;

use crate::decision::SkipReason;
use crate::error::DeployError;

/// What a dry run would have done for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Deploy {
        fingerprint: ContentFingerprint,
        replaces: Option<ContentFingerprint>,
    },
    Rollback {
        fingerprint: ContentFingerprint,
        deployment_id: DeploymentId,
    },
}

/// What was done for a unit that completed without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitAction {
    Skipped(SkipReason),
    Deployed {
        fingerprint: ContentFingerprint,
        location: ArtifactLocation,
        /// False when the artifact already existed in the store.
        uploaded: bool,
        deployment_id: DeploymentId,
    },
    RolledBack {
        fingerprint: ContentFingerprint,
        location: ArtifactLocation,
        /// The ledger record whose artifact is live again.
        restored: DeploymentId,
    },
    Planned(Plan),
}

#[derive(Debug)]
pub enum Outcome {
    Succeeded(UnitAction),
    Failed(DeployError),
    /// Never started because shutdown was requested first.
    Cancelled,
}

#[derive(Debug)]
pub struct UnitReport {
    pub function: String,
    pub outcome: Outcome,
}

impl UnitReport {
    pub fn from_result(function: String, result: Result<UnitAction, DeployError>) -> Self {
        let outcome = match result {
            Ok(action) => Outcome::Succeeded(action),
            Err(e) => Outcome::Failed(e),
        };
        Self { function, outcome }
    }

    pub fn cancelled(function: String) -> Self {
        Self {
            function,
            outcome: Outcome::Cancelled,
        }
    }

    /// One-word status for logs and the CLI summary.
    pub fn status(&self) -> &'static str {
        match &self.outcome {
            Outcome::Succeeded(UnitAction::Skipped(_)) => "skipped",
            Outcome::Succeeded(UnitAction::Deployed { .. }) => "deployed",
            Outcome::Succeeded(UnitAction::RolledBack { .. }) => "rolled_back",
            Outcome::Succeeded(UnitAction::Planned(_)) => "planned",
            Outcome::Failed(_) => "failed",
            Outcome::Cancelled => "cancelled",
        }
    }
}

/// Aggregate of a whole run. Skipped units count as succeeded.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<UnitReport>,
}

/// Serializable totals, as printed at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RunSummary {
    pub fn push(&mut self, report: UnitReport) {
        self.reports.push(report);
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Succeeded(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Succeeded(UnitAction::Skipped(_))))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Cancelled))
    }

    pub fn totals(&self) -> Totals {
        Totals {
            total: self.reports.len(),
            succeeded: self.succeeded(),
            skipped: self.skipped(),
            failed: self.failed(),
            cancelled: self.cancelled(),
        }
    }

    /// True when every unit finished without error.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.cancelled() == 0
    }

    pub fn report(&self, function: &str) -> Option<&UnitReport> {
        self.reports.iter().find(|r| r.function == function)
    }

    /// Reports sorted by function name, for stable output.
    pub fn sorted(&self) -> Vec<&UnitReport> {
        let mut reports: Vec<_> = self.reports.iter().collect();
        reports.sort_by(|a, b| a.function.cmp(&b.function));
        reports
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }
}
