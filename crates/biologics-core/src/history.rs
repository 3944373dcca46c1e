//! Reconstruction of an order's version history from the ledger.

use crate::OrderError;
use biologics_ledger::LedgerService;
use biologics_types::{HistoryQueryResult, KeyModification, LedgerTimestamp, Order};
use chrono::{DateTime, SecondsFormat};

/// Formats a ledger commit time as RFC 3339 in UTC with second precision.
pub fn format_timestamp(timestamp: LedgerTimestamp) -> Result<String, OrderError> {
	let nanos = u32::try_from(timestamp.nanos).map_err(|_| {
		OrderError::Store(format!("negative nanoseconds in ledger timestamp: {}", timestamp.nanos))
	})?;
	DateTime::from_timestamp(timestamp.seconds, nanos)
		.map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
		.ok_or_else(|| {
			OrderError::Store(format!(
				"ledger timestamp out of range: {}s {}ns",
				timestamp.seconds, timestamp.nanos
			))
		})
}

fn to_result(order_id: &str, modification: KeyModification) -> Result<HistoryQueryResult, OrderError> {
	let value = if modification.is_delete || modification.value.is_empty() {
		None
	} else {
		let order: Order = serde_json::from_slice(&modification.value).map_err(|e| {
			OrderError::Decode(format!(
				"failed to decode history value of '{}' at tx {}: {}",
				order_id, modification.tx_id, e
			))
		})?;
		Some(order)
	};

	Ok(HistoryQueryResult {
		timestamp: format_timestamp(modification.timestamp)?,
		tx_id: modification.tx_id,
		is_delete: modification.is_delete,
		value,
	})
}

/// Lists every ledger version of `order_id`, oldest first.
///
/// Deletion markers and empty values are reported with no `value`. The
/// history cursor is released however the scan ends.
pub async fn order_history(
	ledger: &LedgerService,
	order_id: &str,
) -> Result<Vec<HistoryQueryResult>, OrderError> {
	let mut versions = ledger.history(order_id).await?;
	let mut results = Vec::new();
	while let Some(modification) = versions.next().await? {
		results.push(to_result(order_id, modification)?);
	}
	Ok(results)
}
