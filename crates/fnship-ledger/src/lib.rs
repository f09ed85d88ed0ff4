//! fnship-ledger — append-only deployment history.
//!
//! Backed by [redb](https://docs.rs/redb). Records are JSON-serialized into a
//! primary table keyed by deployment id. A secondary index keyed
//! `{function}/{environment}/{sequence}` keeps each target's history in
//! insertion order, so "latest" and "previous" are a bounded reverse range
//! read rather than a table scan.
//!
//! `RedbLedger` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`) and
//! can be shared across worker tasks.

pub mod error;
pub mod ledger;
pub mod tables;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{DeploymentLedger, RedbLedger};
