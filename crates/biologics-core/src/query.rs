//! Range scans and paginated rich queries over the order set.
//!
//! Sorting, paging and bookmark issuance belong to the ledger's rich query
//! engine. This module builds the query descriptor, validates the caller's
//! paging parameters and reshapes each page into [`PaginatedQueryResponse`].

use crate::OrderError;
use biologics_config::QueryConfig;
use biologics_ledger::{LedgerService, ScopedIterator};
use biologics_types::{
	KeyValue, Order, OrderQueryResult, PaginatedQueryResponse, PaginationMetadata, SortOrder,
};
use serde_json::json;

/// Paging parameters after defaults and limits have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
	pub page_size: i32,
	pub bookmark: String,
	pub sort_field: String,
	pub sort_order: SortOrder,
}

impl PageRequest {
	/// Validates raw caller input against the query settings.
	///
	/// `page_size` must be a positive 32-bit integer and is capped at
	/// `max_page_size`. Empty sort inputs fall back to the configured defaults.
	pub fn parse(
		settings: &QueryConfig,
		page_size: &str,
		bookmark: &str,
		sort_field: &str,
		sort_order: &str,
	) -> Result<Self, OrderError> {
		let requested: i32 = page_size.parse().map_err(|e| {
			OrderError::Validation(format!("pageSize must be a valid integer: {}", e))
		})?;
		if requested <= 0 {
			return Err(OrderError::Validation(format!(
				"pageSize must be positive, got {}",
				requested
			)));
		}
		let cap = i32::try_from(settings.max_page_size).unwrap_or(i32::MAX);
		if requested > cap {
			tracing::debug!(requested, cap, "Capping page size");
		}

		let sort_field = if sort_field.is_empty() {
			settings.default_sort_field.clone()
		} else {
			sort_field.to_string()
		};
		let sort_order = if sort_order.is_empty() {
			settings.default_sort_order
		} else {
			sort_order.parse().map_err(OrderError::Validation)?
		};

		Ok(Self {
			page_size: requested.min(cap),
			bookmark: bookmark.to_string(),
			sort_field,
			sort_order,
		})
	}

	/// Rich query selecting every order, sorted by the requested field.
	pub fn descriptor(&self) -> String {
		json!({
			"selector": { "orderId": { "$exists": true } },
			"sort": [ { self.sort_field.as_str(): self.sort_order.as_str() } ],
		})
		.to_string()
	}
}

fn decode_record(kv: &KeyValue) -> Result<Order, OrderError> {
	serde_json::from_slice(&kv.value)
		.map_err(|e| OrderError::Decode(format!("failed to decode order '{}': {}", kv.key, e)))
}

/// Decodes every record a scan yields, stopping at the first malformed one.
async fn collect_orders(mut scan: ScopedIterator<KeyValue>) -> Result<Vec<Order>, OrderError> {
	let mut orders = Vec::new();
	while let Some(kv) = scan.next().await? {
		orders.push(decode_record(&kv)?);
	}
	Ok(orders)
}

/// Current value of every order with a key in `[start_key, end_key)`.
pub async fn orders_in_range(
	ledger: &LedgerService,
	start_key: &str,
	end_key: &str,
) -> Result<Vec<Order>, OrderError> {
	let scan = ledger.range(start_key, end_key).await?;
	let orders = collect_orders(scan).await?;
	tracing::debug!(start_key, end_key, count = orders.len(), "Scanned orders");
	Ok(orders)
}

/// Fetches one page of orders through the ledger's rich query engine.
pub async fn orders_page(
	ledger: &LedgerService,
	request: &PageRequest,
) -> Result<PaginatedQueryResponse, OrderError> {
	let query = request.descriptor();
	let (mut page, metadata) = ledger
		.query_page(&query, request.page_size, &request.bookmark)
		.await?;

	let mut data = Vec::new();
	while let Some(kv) = page.next().await? {
		let record = decode_record(&kv)?;
		data.push(OrderQueryResult { key: kv.key, record });
	}

	tracing::debug!(
		sort_field = %request.sort_field,
		sort_order = %request.sort_order,
		fetched = metadata.fetched_records_count,
		"Fetched order page"
	);
	Ok(PaginatedQueryResponse {
		data,
		metadata: PaginationMetadata {
			fetched_records_count: metadata.fetched_records_count,
			bookmark: metadata.bookmark,
		},
	})
}
