//! Records exchanged with the ledger collaborator.
//!
//! These mirror what a versioned key-value ledger hands back from its scans:
//! plain key/value pairs, per-key modifications with commit timestamps, and
//! the metadata of a paginated rich query.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A key and its current value, as yielded by range and rich query scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
	pub key: String,
	pub value: Vec<u8>,
}

/// Commit time of a ledger transaction split into seconds and nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerTimestamp {
	pub seconds: i64,
	pub nanos: i32,
}

impl LedgerTimestamp {
	/// Current wall-clock time.
	pub fn now() -> Self {
		let elapsed = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.unwrap_or_default();
		Self {
			seconds: elapsed.as_secs() as i64,
			nanos: elapsed.subsec_nanos() as i32,
		}
	}
}

/// One version of a key, as yielded by a history scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyModification {
	/// Transaction that produced this version.
	pub tx_id: String,
	/// When the transaction was committed.
	pub timestamp: LedgerTimestamp,
	/// Whether the transaction deleted the key.
	pub is_delete: bool,
	/// Value written by the transaction, empty for deletions.
	pub value: Vec<u8>,
}

/// Metadata returned alongside a page of rich query results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResponseMetadata {
	pub fetched_records_count: i32,
	pub bookmark: String,
}
