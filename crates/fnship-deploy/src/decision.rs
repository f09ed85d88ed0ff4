//! Decision rules. No I/O: callers gather the inputs and act on the result.

use fnship_core::{ContentFingerprint, DeploymentRecord, Environment};

use crate::error::DeployError;

/// What to do with one function in this run.
#[derive(Debug)]
pub enum Decision {
    Skip(SkipReason),
    /// Package and activate `fingerprint`. `replaces` is the latest recorded
    /// fingerprint, if any.
    Deploy {
        fingerprint: ContentFingerprint,
        replaces: Option<ContentFingerprint>,
    },
    /// Reactivate the artifact of `record` without rebuilding.
    Rollback { record: DeploymentRecord },
    Fail(DeployError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Source fingerprint matches the latest deployment.
    Unchanged,
    /// Rollback restricted to an allow-list that does not name this function.
    NotInAllowList,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Unchanged => "unchanged",
            SkipReason::NotInAllowList => "not in allow-list",
        }
    }
}

/// Forward deploy: skip when the source matches the latest record.
pub fn decide_forward(
    current: ContentFingerprint,
    latest: Option<ContentFingerprint>,
) -> Decision {
    match latest {
        Some(latest) if latest == current => Decision::Skip(SkipReason::Unchanged),
        replaces => Decision::Deploy {
            fingerprint: current,
            replaces,
        },
    }
}

/// Rollback: restore the record before the latest one.
pub fn decide_rollback(
    eligible: bool,
    function: &str,
    environment: Environment,
    previous: Option<DeploymentRecord>,
) -> Decision {
    if !eligible {
        return Decision::Skip(SkipReason::NotInAllowList);
    }
    match previous {
        Some(record) => Decision::Rollback { record },
        None => Decision::Fail(DeployError::NoRollbackTarget {
            function: function.to_string(),
            environment,
        }),
    }
}
