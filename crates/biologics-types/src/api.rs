//! Read-side response shapes.
//!
//! These values are computed from ledger reads and returned to callers;
//! none of them is ever persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Order;

/// One ledger version of an order key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQueryResult {
	/// Transaction that wrote this version.
	pub tx_id: String,
	/// Commit time of the transaction in RFC 3339 form.
	pub timestamp: String,
	/// Whether the transaction deleted the key.
	pub is_delete: bool,
	/// The order as it stood right after the transaction.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub value: Option<Order>,
}

/// A key/record pair in a paginated result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQueryResult {
	#[serde(rename = "Key")]
	pub key: String,
	#[serde(rename = "Record")]
	pub record: Order,
}

/// Page metadata handed back by the ledger's rich query engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMetadata {
	/// Number of records in this page.
	pub fetched_records_count: i32,
	/// Opaque cursor to pass back for the next page.
	pub bookmark: String,
}

/// Response of a paginated order query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedQueryResponse {
	pub data: Vec<OrderQueryResult>,
	pub metadata: PaginationMetadata,
}

/// Direction of a sort key in a rich query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
	Asc,
	Desc,
}

impl SortOrder {
	/// Returns the query token for this direction.
	pub fn as_str(&self) -> &'static str {
		match self {
			SortOrder::Asc => "asc",
			SortOrder::Desc => "desc",
		}
	}
}

impl fmt::Display for SortOrder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for SortOrder {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"asc" => Ok(Self::Asc),
			"desc" => Ok(Self::Desc),
			other => Err(format!(
				"sortOrder must be 'asc' or 'desc', got '{}'",
				other
			)),
		}
	}
}
