//! fnship-deploy — the deployment decision engine.
//!
//! For every discovered function the orchestrator decides whether to skip,
//! deploy or roll back, executes that decision, and aggregates the outcomes
//! across a bounded pool of workers.
//!
//! # Components
//!
//! - **`decision`**: pure decision rules (`Decision`, `SkipReason`)
//! - **`orchestrator`**: per-unit execution and concurrent fan-out
//! - **`summary`**: per-unit outcomes and run totals

pub mod decision;
pub mod error;
pub mod orchestrator;
pub mod summary;

pub use decision::{Decision, SkipReason, decide_forward, decide_rollback};
pub use error::{DeployError, DeployResult};
pub use orchestrator::Orchestrator;
pub use summary::{Outcome, Plan, RunSummary, Totals, UnitAction, UnitReport};
