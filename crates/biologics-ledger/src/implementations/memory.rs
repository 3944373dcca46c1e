//! In-memory ledger backend.
//!
//! Keeps the full version history of every key in process memory. Each
//! `put_state` is committed as its own transaction with a fresh transaction
//! id and the current wall-clock time. Useful for tests and development,
//! where persistence across restarts is not required.

use crate::rich_query::RichQuery;
use crate::{
	BufferedIterator, HistoryIterator, LedgerError, LedgerFactory, LedgerInterface,
	LedgerRegistry, StateIterator,
};
use async_trait::async_trait;
use biologics_types::{
	ConfigSchema, ImplementationRegistry, KeyModification, KeyValue, LedgerTimestamp,
	QueryResponseMetadata, Schema, SchemaError,
};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Version log of every key, ordered by key.
type VersionStore = BTreeMap<String, Vec<KeyModification>>;

/// In-memory ledger implementation.
///
/// Cloning yields another handle onto the same ledger, which lets tests keep
/// a handle after boxing one into the engine.
#[derive(Clone, Default)]
pub struct MemoryLedger {
	/// Per-key version logs protected by a read-write lock.
	versions: Arc<RwLock<VersionStore>>,
	/// Number of scan cursors handed out and not yet released.
	open_iterators: Arc<AtomicUsize>,
}

impl MemoryLedger {
	/// Creates an empty ledger.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of scan cursors currently open.
	pub fn open_iterators(&self) -> usize {
		self.open_iterators.load(Ordering::SeqCst)
	}

	/// Records a deletion of `key` as a new version.
	///
	/// Deletion is not part of the ledger port; it exists so that deletion
	/// markers written by other parties can be reproduced.
	pub async fn delete_state(&self, key: &str) -> Result<(), LedgerError> {
		self.commit(key, Vec::new(), true).await;
		Ok(())
	}

	/// Number of versions recorded for `key`, deletions included.
	pub async fn versions_of(&self, key: &str) -> usize {
		self.versions.read().await.get(key).map_or(0, Vec::len)
	}

	async fn commit(&self, key: &str, value: Vec<u8>, is_delete: bool) {
		let modification = KeyModification {
			tx_id: Uuid::new_v4().simple().to_string(),
			timestamp: LedgerTimestamp::now(),
			is_delete,
			value,
		};
		let mut versions = self.versions.write().await;
		versions
			.entry(key.to_string())
			.or_default()
			.push(modification);
	}

	/// Wraps materialized results in a cursor tracked by the open counter.
	fn cursor<T: Send + 'static>(&self, items: Vec<T>) -> BufferedIterator<T> {
		self.open_iterators.fetch_add(1, Ordering::SeqCst);
		let open = self.open_iterators.clone();
		BufferedIterator::new(items).with_release(move || {
			open.fetch_sub(1, Ordering::SeqCst);
		})
	}

	async fn current_values(&self, start: Bound<String>, end: Bound<String>) -> Vec<KeyValue> {
		let versions = self.versions.read().await;
		versions
			.range((start, end))
			.filter_map(|(key, log)| {
				let latest = log.last()?;
				(!latest.is_delete).then(|| KeyValue {
					key: key.clone(),
					value: latest.value.clone(),
				})
			})
			.collect()
	}
}

fn bound(key: &str, inclusive: bool) -> Bound<String> {
	match (key.is_empty(), inclusive) {
		(true, _) => Bound::Unbounded,
		(false, true) => Bound::Included(key.to_string()),
		(false, false) => Bound::Excluded(key.to_string()),
	}
}

#[async_trait]
impl LedgerInterface for MemoryLedger {
	async fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
		let versions = self.versions.read().await;
		Ok(versions
			.get(key)
			.and_then(|log| log.last())
			.filter(|latest| !latest.is_delete)
			.map(|latest| latest.value.clone()))
	}

	async fn put_state(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
		if key.is_empty() {
			return Err(LedgerError::Backend("key must not be empty".into()));
		}
		if value.is_empty() {
			return Err(LedgerError::Backend(format!(
				"value for key '{}' must not be empty",
				key
			)));
		}
		self.commit(key, value, false).await;
		Ok(())
	}

	async fn get_state_by_range(
		&self,
		start_key: &str,
		end_key: &str,
	) -> Result<StateIterator, LedgerError> {
		if !start_key.is_empty() && !end_key.is_empty() && start_key > end_key {
			return Err(LedgerError::Backend(format!(
				"invalid range: start key '{}' is after end key '{}'",
				start_key, end_key
			)));
		}
		let items = self
			.current_values(bound(start_key, true), bound(end_key, false))
			.await;
		tracing::trace!(start_key, end_key, count = items.len(), "Opened range scan");
		Ok(Box::new(self.cursor(items)))
	}

	async fn get_history_for_key(&self, key: &str) -> Result<HistoryIterator, LedgerError> {
		let versions = self.versions.read().await;
		let items = versions.get(key).cloned().unwrap_or_default();
		drop(versions);
		Ok(Box::new(self.cursor(items)))
	}

	async fn get_query_result_with_pagination(
		&self,
		query: &str,
		page_size: i32,
		bookmark: &str,
	) -> Result<(StateIterator, QueryResponseMetadata), LedgerError> {
		let query = RichQuery::parse(query)?;
		let records = self
			.current_values(Bound::Unbounded, Bound::Unbounded)
			.await;
		let (page, metadata) = query.execute(records, page_size, bookmark)?;
		Ok((Box::new(self.cursor(page)), metadata))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryLedgerSchema)
	}
}

/// Configuration schema for MemoryLedger.
pub struct MemoryLedgerSchema;

impl ConfigSchema for MemoryLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), SchemaError> {
		// No settings; an empty table is the only valid config.
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory ledger from configuration.
///
/// Configuration parameters:
/// - None
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	MemoryLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryLedger::new()))
}

/// Registry for the memory ledger implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = LedgerFactory;

	fn factory() -> Self::Factory {
		create_ledger
	}
}

impl LedgerRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ScopedIterator;

	async fn drain<T: Send>(mut iter: ScopedIterator<T>) -> Vec<T> {
		let mut items = Vec::new();
		while let Some(item) = iter.next().await.unwrap() {
			items.push(item);
		}
		items
	}

	#[tokio::test]
	async fn test_basic_operations() {
		let ledger = MemoryLedger::new();

		ledger.put_state("k", b"v1".to_vec()).await.unwrap();
		assert_eq!(ledger.get_state("k").await.unwrap(), Some(b"v1".to_vec()));
		assert_eq!(ledger.get_state("missing").await.unwrap(), None);

		ledger.put_state("k", b"v2".to_vec()).await.unwrap();
		assert_eq!(ledger.get_state("k").await.unwrap(), Some(b"v2".to_vec()));

		ledger.delete_state("k").await.unwrap();
		assert_eq!(ledger.get_state("k").await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_rejects_empty_key_and_value() {
		let ledger = MemoryLedger::new();
		assert!(ledger.put_state("", b"v".to_vec()).await.is_err());
		assert!(ledger.put_state("k", Vec::new()).await.is_err());
	}

	#[tokio::test]
	async fn test_history_keeps_every_version() {
		let ledger = MemoryLedger::new();
		ledger.put_state("k", b"v1".to_vec()).await.unwrap();
		ledger.put_state("k", b"v2".to_vec()).await.unwrap();
		ledger.delete_state("k").await.unwrap();

		let history = drain(ScopedIterator::new(
			ledger.get_history_for_key("k").await.unwrap(),
		))
		.await;
		assert_eq!(history.len(), 3);
		assert_eq!(history[0].value, b"v1".to_vec());
		assert_eq!(history[1].value, b"v2".to_vec());
		assert!(history[2].is_delete);
		assert!(history[0].timestamp <= history[1].timestamp);
		assert_ne!(history[0].tx_id, history[1].tx_id);
	}

	#[tokio::test]
	async fn test_range_scan_bounds() {
		let ledger = MemoryLedger::new();
		for key in ["a", "b", "c", "d"] {
			ledger.put_state(key, key.as_bytes().to_vec()).await.unwrap();
		}
		ledger.delete_state("c").await.unwrap();

		let all = drain(ScopedIterator::new(ledger.get_state_by_range("", "").await.unwrap())).await;
		let keys: Vec<_> = all.iter().map(|kv| kv.key.as_str()).collect();
		assert_eq!(keys, vec!["a", "b", "d"]);

		let bounded =
			drain(ScopedIterator::new(ledger.get_state_by_range("b", "d").await.unwrap())).await;
		let keys: Vec<_> = bounded.iter().map(|kv| kv.key.as_str()).collect();
		assert_eq!(keys, vec!["b"]);

		assert!(ledger.get_state_by_range("d", "a").await.is_err());
	}

	#[tokio::test]
	async fn test_cursors_are_counted_until_released() {
		let ledger = MemoryLedger::new();
		ledger.put_state("a", b"1".to_vec()).await.unwrap();

		let scan = ScopedIterator::new(ledger.get_state_by_range("", "").await.unwrap());
		let history = ScopedIterator::new(ledger.get_history_for_key("a").await.unwrap());
		assert_eq!(ledger.open_iterators(), 2);

		drop(scan);
		assert_eq!(ledger.open_iterators(), 1);
		drop(history);
		assert_eq!(ledger.open_iterators(), 0);
	}

	#[tokio::test]
	async fn test_paginated_query() {
		let ledger = MemoryLedger::new();
		for id in ["o1", "o2", "o3"] {
			let doc = serde_json::json!({ "orderId": id });
			ledger
				.put_state(id, serde_json::to_vec(&doc).unwrap())
				.await
				.unwrap();
		}

		let query = r#"{"selector":{"orderId":{"$exists":true}},"sort":[{"orderId":"asc"}]}"#;
		let (iter, metadata) = ledger
			.get_query_result_with_pagination(query, 2, "")
			.await
			.unwrap();
		let page = drain(ScopedIterator::new(iter)).await;
		assert_eq!(page.len(), 2);
		assert_eq!(metadata.fetched_records_count, 2);
		assert!(!metadata.bookmark.is_empty());
		assert_eq!(ledger.open_iterators(), 0);
	}

	#[test]
	fn test_config_schema() {
		let empty = toml::Value::Table(toml::map::Map::new());
		assert!(create_ledger(&empty).is_ok());

		let mut table = toml::map::Map::new();
		table.insert("storage_path".into(), toml::Value::String("x".into()));
		assert!(create_ledger(&toml::Value::Table(table)).is_err());
	}
}
