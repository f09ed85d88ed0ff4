//! redb table definitions for the deployment ledger.

use redb::TableDefinition;

/// Deployment records keyed by deployment id, JSON values.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Recency index: `{function}/{environment}/{sequence:020}` → deployment id.
pub const TARGET_INDEX: TableDefinition<&str, &str> = TableDefinition::new("target_index");

/// Width of the zero-padded sequence suffix in [`TARGET_INDEX`] keys.
pub const SEQUENCE_WIDTH: usize = 20;
