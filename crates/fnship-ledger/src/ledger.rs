//! RedbLedger — redb-backed deployment ledger.
//!
//! Records are only ever inserted. Each insert assigns the next sequence
//! number for its `(function, environment)` pair in the same write
//! transaction, so index order is append order even when wall-clock
//! timestamps collide.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use fnship_core::{ContentFingerprint, DeploymentRecord, Environment};
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, info};

use crate::error::{LedgerError, LedgerResult};
use crate::tables::*;

/// Convert any `Display` error into a `LedgerError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| LedgerError::$variant(e.to_string())
    };
}

/// The queries the orchestrator depends on.
#[async_trait]
pub trait DeploymentLedger: Send + Sync {
    /// Fingerprint of the most recent deployment of `function` to `environment`.
    async fn latest_fingerprint(
        &self,
        function: &str,
        environment: Environment,
    ) -> LedgerResult<Option<ContentFingerprint>>;

    /// The record before the most recent one, i.e. what was live before the
    /// last deploy. `None` when fewer than two records exist.
    async fn previous_record(
        &self,
        function: &str,
        environment: Environment,
    ) -> LedgerResult<Option<DeploymentRecord>>;

    /// Insert a new record. Existing records are never touched.
    async fn append(&self, record: DeploymentRecord) -> LedgerResult<()>;
}

/// Thread-safe deployment ledger backed by redb.
#[derive(Clone)]
pub struct RedbLedger {
    db: Arc<Database>,
}

impl RedbLedger {
    /// Open (or create) a persistent ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(map_err!(Open))?;
        }
        let db = Database::create(path).map_err(map_err!(Open))?;
        let ledger = Self { db: Arc::new(db) };
        ledger.ensure_tables()?;
        debug!(?path, "ledger opened");
        Ok(ledger)
    }

    /// Create an ephemeral in-memory ledger (for testing and dry runs).
    pub fn open_in_memory() -> LedgerResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let ledger = Self { db: Arc::new(db) };
        ledger.ensure_tables()?;
        debug!("in-memory ledger opened");
        Ok(ledger)
    }

    fn ensure_tables(&self) -> LedgerResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.open_table(TARGET_INDEX).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert a record and its index entry in one transaction.
    pub fn insert_record(&self, record: &DeploymentRecord) -> LedgerResult<()> {
        let id = record.deployment_id.as_str();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let (start, end) = index_bounds(&record.function_name, record.environment);

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let sequence;
        {
            let mut records = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            if records.get(id).map_err(map_err!(Read))?.is_some() {
                return Err(LedgerError::Duplicate(id.to_string()));
            }

            let mut index = txn.open_table(TARGET_INDEX).map_err(map_err!(Table))?;
            sequence = {
                let mut range = index
                    .range(start.as_str()..end.as_str())
                    .map_err(map_err!(Read))?;
                match range.next_back() {
                    Some(entry) => {
                        let (key, _) = entry.map_err(map_err!(Read))?;
                        parse_sequence(key.value())? + 1
                    }
                    None => 0,
                }
            };

            let index_key = format!("{start}{sequence:0width$}", width = SEQUENCE_WIDTH);
            records
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            index
                .insert(index_key.as_str(), id)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;

        info!(
            deployment_id = %id,
            function = %record.function_name,
            environment = %record.environment,
            fingerprint = %record.fingerprint.short(),
            sequence,
            "deployment recorded"
        );
        Ok(())
    }

    /// Get a record by deployment id.
    pub fn get_record(&self, deployment_id: &str) -> LedgerResult<Option<DeploymentRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        match table.get(deployment_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: DeploymentRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Up to `limit` records for a target, newest first.
    pub fn list_history(
        &self,
        function: &str,
        environment: Environment,
        limit: usize,
    ) -> LedgerResult<Vec<DeploymentRecord>> {
        let (start, end) = index_bounds(function, environment);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(TARGET_INDEX).map_err(map_err!(Table))?;
        let records = txn.open_table(RECORDS).map_err(map_err!(Table))?;

        let mut results = Vec::new();
        let range = index
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?;
        for entry in range.rev().take(limit) {
            let (key, id) = entry.map_err(map_err!(Read))?;
            let guard = records
                .get(id.value())
                .map_err(map_err!(Read))?
                .ok_or_else(|| LedgerError::DanglingIndex(key.value().to_string()))?;
            let record: DeploymentRecord =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Most recent record for a target.
    pub fn get_latest(
        &self,
        function: &str,
        environment: Environment,
    ) -> LedgerResult<Option<DeploymentRecord>> {
        Ok(self.list_history(function, environment, 1)?.into_iter().next())
    }

    /// Second most recent record for a target.
    pub fn get_previous(
        &self,
        function: &str,
        environment: Environment,
    ) -> LedgerResult<Option<DeploymentRecord>> {
        Ok(self.list_history(function, environment, 2)?.into_iter().nth(1))
    }
}

#[async_trait]
impl DeploymentLedger for RedbLedger {
    async fn latest_fingerprint(
        &self,
        function: &str,
        environment: Environment,
    ) -> LedgerResult<Option<ContentFingerprint>> {
        let ledger = self.clone();
        let function = function.to_string();
        let latest = blocking(move || ledger.get_latest(&function, environment)).await?;
        Ok(latest.map(|record| record.fingerprint))
    }

    async fn previous_record(
        &self,
        function: &str,
        environment: Environment,
    ) -> LedgerResult<Option<DeploymentRecord>> {
        let ledger = self.clone();
        let function = function.to_string();
        blocking(move || ledger.get_previous(&function, environment)).await
    }

    async fn append(&self, record: DeploymentRecord) -> LedgerResult<()> {
        let ledger = self.clone();
        blocking(move || ledger.insert_record(&record)).await
    }
}

/// Run a redb operation off the async worker threads.
async fn blocking<T, F>(op: F) -> LedgerResult<T>
where
    F: FnOnce() -> LedgerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(map_err!(Task))?
}

/// Half-open key range covering every index entry of one target.
/// `'0'` is the byte after `'/'`, so the range stops exactly past the prefix.
fn index_bounds(function: &str, environment: Environment) -> (String, String) {
    (
        format!("{function}/{environment}/"),
        format!("{function}/{environment}0"),
    )
}

fn parse_sequence(index_key: &str) -> LedgerResult<u64> {
    index_key
        .rsplit('/')
        .next()
        .and_then(|seq| seq.parse::<u64>().ok())
        .ok_or_else(|| LedgerError::Read(format!("malformed index key: {index_key}")))
}
