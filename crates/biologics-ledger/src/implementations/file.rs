//! File-backed ledger backend.
//!
//! Each key owns an append-only version log stored as JSON lines in
//! `<storage_path>/<hex(key)>.log`. Hex file names keep arbitrary keys
//! filesystem-safe. Keys too long for a hex file name are stored under
//! `h-<sha3(key)>.log` instead, and every line of such a log carries the key
//! itself so directory listings can still recover it. Logs are rewritten
//! atomically by writing a temp file and renaming it over the original.

use crate::rich_query::RichQuery;
use crate::{
	BufferedIterator, HistoryIterator, LedgerError, LedgerFactory, LedgerInterface,
	LedgerRegistry, StateIterator,
};
use async_trait::async_trait;
use biologics_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, KeyModification, KeyValue,
	LedgerTimestamp, QueryResponseMetadata, Schema, SchemaError,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

const LOG_EXTENSION: &str = "log";
/// Longest hex stem used as a file name; longer keys are hashed.
const MAX_HEX_STEM: usize = 200;
const HASHED_PREFIX: &str = "h-";
const DEFAULT_STORAGE_PATH: &str = "./data/ledger";

/// One line of a key's version log.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionRecord {
	/// Present only in logs stored under a hashed file name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	key: Option<String>,
	tx_id: String,
	seconds: i64,
	nanos: i32,
	is_delete: bool,
	/// Hex-encoded value bytes.
	value: String,
}

impl VersionRecord {
	fn from_modification(key: Option<&str>, modification: &KeyModification) -> Self {
		Self {
			key: key.map(str::to_string),
			tx_id: modification.tx_id.clone(),
			seconds: modification.timestamp.seconds,
			nanos: modification.timestamp.nanos,
			is_delete: modification.is_delete,
			value: hex::encode(&modification.value),
		}
	}

	fn into_modification(self) -> Result<KeyModification, LedgerError> {
		let value = hex::decode(&self.value)
			.map_err(|e| LedgerError::Backend(format!("corrupt version value: {}", e)))?;
		Ok(KeyModification {
			tx_id: self.tx_id,
			timestamp: LedgerTimestamp {
				seconds: self.seconds,
				nanos: self.nanos,
			},
			is_delete: self.is_delete,
			value,
		})
	}
}

/// File-based ledger implementation.
pub struct FileLedger {
	/// Directory holding one version log per key.
	base_path: PathBuf,
	/// Serializes log rewrites within this process.
	write_lock: Mutex<()>,
}

impl FileLedger {
	/// Creates a ledger rooted at `base_path`.
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			write_lock: Mutex::new(()),
		}
	}

	/// Whether `key` is stored under a hashed file name.
	fn is_hashed(key: &str) -> bool {
		key.len() * 2 > MAX_HEX_STEM
	}

	fn log_path(&self, key: &str) -> PathBuf {
		let stem = if Self::is_hashed(key) {
			format!("{}{}", HASHED_PREFIX, hex::encode(Sha3_256::digest(key.as_bytes())))
		} else {
			hex::encode(key.as_bytes())
		};
		self.base_path.join(format!("{}.{}", stem, LOG_EXTENSION))
	}

	/// Recovers the key a log file belongs to.
	async fn key_from_path(path: &Path) -> Result<Option<String>, LedgerError> {
		if path.extension().is_none_or(|ext| ext != LOG_EXTENSION) {
			return Ok(None);
		}
		let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
			return Ok(None);
		};
		if !stem.starts_with(HASHED_PREFIX) {
			return Ok(hex::decode(stem)
				.ok()
				.and_then(|bytes| String::from_utf8(bytes).ok()));
		}

		let content = fs::read_to_string(path)
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?;
		let Some(first) = content.lines().find(|line| !line.trim().is_empty()) else {
			return Ok(None);
		};
		let record: VersionRecord = serde_json::from_str(first).map_err(|e| {
			LedgerError::Backend(format!("corrupt version log {}: {}", path.display(), e))
		})?;
		Ok(record.key)
	}

	async fn read_log(&self, key: &str) -> Result<Vec<KeyModification>, LedgerError> {
		let content = match fs::read_to_string(self.log_path(key)).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(LedgerError::Backend(e.to_string())),
		};

		content
			.lines()
			.filter(|line| !line.trim().is_empty())
			.map(|line| {
				let record = serde_json::from_str::<VersionRecord>(line).map_err(|e| {
					LedgerError::Backend(format!("corrupt version log for '{}': {}", key, e))
				})?;
				if record.key.as_deref().is_some_and(|stored| stored != key) {
					return Err(LedgerError::Backend(format!(
						"version log for '{}' belongs to another key",
						key
					)));
				}
				record.into_modification()
			})
			.collect()
	}

	async fn latest_value(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
		Ok(self
			.read_log(key)
			.await?
			.pop()
			.filter(|latest| !latest.is_delete)
			.map(|latest| latest.value))
	}

	async fn append(&self, key: &str, value: Vec<u8>, is_delete: bool) -> Result<(), LedgerError> {
		let modification = KeyModification {
			tx_id: Uuid::new_v4().simple().to_string(),
			timestamp: LedgerTimestamp::now(),
			is_delete,
			value,
		};
		let record = VersionRecord::from_modification(Self::is_hashed(key).then_some(key), &modification);
		let mut line =
			serde_json::to_string(&record).map_err(|e| LedgerError::Serialization(e.to_string()))?;
		line.push('\n');

		let _guard = self.write_lock.lock().await;

		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?;

		let path = self.log_path(key);
		let mut content = match fs::read(&path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
			Err(e) => return Err(LedgerError::Backend(e.to_string())),
		};
		content.extend_from_slice(line.as_bytes());

		// Write atomically by writing to temp file then renaming
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, content)
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?;

		tracing::trace!(key, tx_id = %modification.tx_id, is_delete, "Committed version");
		Ok(())
	}

	/// Records a deletion of `key` as a new version.
	pub async fn delete_state(&self, key: &str) -> Result<(), LedgerError> {
		self.append(key, Vec::new(), true).await
	}

	/// Lists stored keys in ascending order.
	async fn keys(&self) -> Result<Vec<String>, LedgerError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(LedgerError::Backend(e.to_string())),
		};

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?
		{
			match Self::key_from_path(&entry.path()).await? {
				Some(key) => keys.push(key),
				None => tracing::debug!("Skipping file {:?}: not a version log", entry.path()),
			}
		}
		keys.sort();
		Ok(keys)
	}

	async fn current_values<F>(&self, in_range: F) -> Result<Vec<KeyValue>, LedgerError>
	where
		F: Fn(&str) -> bool,
	{
		let mut values = Vec::new();
		for key in self.keys().await? {
			if !in_range(&key) {
				continue;
			}
			if let Some(value) = self.latest_value(&key).await? {
				values.push(KeyValue { key, value });
			}
		}
		Ok(values)
	}
}

#[async_trait]
impl LedgerInterface for FileLedger {
	async fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
		self.latest_value(key).await
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
		self.append(key, value, false).await
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
			.current_values(|key| {
				(start_key.is_empty() || key >= start_key) && (end_key.is_empty() || key < end_key)
			})
			.await?;
		Ok(Box::new(BufferedIterator::new(items)))
	}

	async fn get_history_for_key(&self, key: &str) -> Result<HistoryIterator, LedgerError> {
		let items = self.read_log(key).await?;
		Ok(Box::new(BufferedIterator::new(items)))
	}

	async fn get_query_result_with_pagination(
		&self,
		query: &str,
		page_size: i32,
		bookmark: &str,
	) -> Result<(StateIterator, QueryResponseMetadata), LedgerError> {
		let query = RichQuery::parse(query)?;
		let records = self.current_values(|_| true).await?;
		let (page, metadata) = query.execute(records, page_size, bookmark)?;
		Ok((Box::new(BufferedIterator::new(page)), metadata))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileLedgerSchema)
	}
}

/// Configuration schema for FileLedger.
pub struct FileLedgerSchema;

impl ConfigSchema for FileLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), SchemaError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if path.trim().is_empty() => {
							Err("storage_path must not be empty".to_string())
						},
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file ledger from configuration.
///
/// Configuration parameters:
/// - `storage_path`: directory for version logs (default: "./data/ledger")
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	FileLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileLedger::new(PathBuf::from(storage_path))))
}

/// Registry for the file ledger implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
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
	use tempfile::TempDir;

	async fn drain<T: Send>(mut iter: ScopedIterator<T>) -> Vec<T> {
		let mut items = Vec::new();
		while let Some(item) = iter.next().await.unwrap() {
			items.push(item);
		}
		items
	}

	#[tokio::test]
	async fn test_basic_operations() {
		let dir = TempDir::new().unwrap();
		let ledger = FileLedger::new(dir.path().to_path_buf());

		assert_eq!(ledger.get_state("order:1").await.unwrap(), None);
		ledger.put_state("order:1", b"v1".to_vec()).await.unwrap();
		ledger.put_state("order:1", b"v2".to_vec()).await.unwrap();
		assert_eq!(ledger.get_state("order:1").await.unwrap(), Some(b"v2".to_vec()));

		ledger.delete_state("order:1").await.unwrap();
		assert_eq!(ledger.get_state("order:1").await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_versions_survive_reopen() {
		let dir = TempDir::new().unwrap();
		{
			let ledger = FileLedger::new(dir.path().to_path_buf());
			ledger.put_state("k", b"v1".to_vec()).await.unwrap();
			ledger.put_state("k", b"v2".to_vec()).await.unwrap();
		}

		let reopened = FileLedger::new(dir.path().to_path_buf());
		let history = drain(ScopedIterator::new(
			reopened.get_history_for_key("k").await.unwrap(),
		))
		.await;
		assert_eq!(history.len(), 2);
		assert_eq!(history[0].value, b"v1".to_vec());
		assert_eq!(history[1].value, b"v2".to_vec());
		assert!(!history[1].is_delete);
	}

	#[tokio::test]
	async fn test_range_scan_uses_key_order() {
		let dir = TempDir::new().unwrap();
		let ledger = FileLedger::new(dir.path().to_path_buf());
		for key in ["b", "a/x", "c", "a"] {
			ledger.put_state(key, key.as_bytes().to_vec()).await.unwrap();
		}
		std::fs::write(dir.path().join("README"), "not a log").unwrap();

		let all = drain(ScopedIterator::new(ledger.get_state_by_range("", "").await.unwrap())).await;
		let keys: Vec<_> = all.iter().map(|kv| kv.key.as_str()).collect();
		assert_eq!(keys, vec!["a", "a/x", "b", "c"]);

		let bounded =
			drain(ScopedIterator::new(ledger.get_state_by_range("a/", "c").await.unwrap())).await;
		let keys: Vec<_> = bounded.iter().map(|kv| kv.key.as_str()).collect();
		assert_eq!(keys, vec!["a/x", "b"]);
	}

	#[tokio::test]
	async fn test_missing_directory_is_empty_ledger() {
		let dir = TempDir::new().unwrap();
		let ledger = FileLedger::new(dir.path().join("not-created"));
		let all = drain(ScopedIterator::new(ledger.get_state_by_range("", "").await.unwrap())).await;
		assert!(all.is_empty());
	}

	#[tokio::test]
	async fn test_paginated_query() {
		let dir = TempDir::new().unwrap();
		let ledger = FileLedger::new(dir.path().to_path_buf());
		for (id, created) in [("o1", "2024-03"), ("o2", "2024-01"), ("o3", "2024-02")] {
			let doc = serde_json::json!({ "orderId": id, "createdAt": created });
			ledger
				.put_state(id, serde_json::to_vec(&doc).unwrap())
				.await
				.unwrap();
		}

		let query = r#"{"selector":{"orderId":{"$exists":true}},"sort":[{"createdAt":"desc"}]}"#;
		let (iter, metadata) = ledger
			.get_query_result_with_pagination(query, 2, "")
			.await
			.unwrap();
		let page = drain(ScopedIterator::new(iter)).await;
		let keys: Vec<_> = page.iter().map(|kv| kv.key.as_str()).collect();
		assert_eq!(keys, vec!["o1", "o3"]);

		let (iter, _) = ledger
			.get_query_result_with_pagination(query, 2, &metadata.bookmark)
			.await
			.unwrap();
		let page = drain(ScopedIterator::new(iter)).await;
		assert_eq!(page.len(), 1);
		assert_eq!(page[0].key, "o2");
	}

	#[tokio::test]
	async fn test_long_keys_use_hashed_names() {
		let dir = TempDir::new().unwrap();
		let ledger = FileLedger::new(dir.path().to_path_buf());
		let long_key = "o".repeat(200);

		ledger.put_state(&long_key, b"v1".to_vec()).await.unwrap();
		ledger.put_state(&long_key, b"v2".to_vec()).await.unwrap();
		ledger.put_state("short", b"s".to_vec()).await.unwrap();
		assert_eq!(ledger.get_state(&long_key).await.unwrap(), Some(b"v2".to_vec()));

		let names: Vec<_> = std::fs::read_dir(dir.path())
			.unwrap()
			.map(|entry| entry.unwrap().file_name().into_string().unwrap())
			.collect();
		assert!(names.iter().all(|name| name.len() < 255));
		assert!(names.iter().any(|name| name.starts_with(HASHED_PREFIX)));

		let all = drain(ScopedIterator::new(ledger.get_state_by_range("", "").await.unwrap())).await;
		let keys: Vec<_> = all.iter().map(|kv| kv.key.clone()).collect();
		assert_eq!(keys, vec![long_key.clone(), "short".to_string()]);

		let history = drain(ScopedIterator::new(
			ledger.get_history_for_key(&long_key).await.unwrap(),
		))
		.await;
		assert_eq!(history.len(), 2);
	}

	#[tokio::test]
	async fn test_corrupt_log_is_backend_error() {
		let dir = TempDir::new().unwrap();
		let ledger = FileLedger::new(dir.path().to_path_buf());
		ledger.put_state("o1", b"v1".to_vec()).await.unwrap();
		std::fs::write(ledger.log_path("o1"), "garbage\n").unwrap();

		assert!(matches!(
			ledger.get_state("o1").await,
			Err(LedgerError::Backend(msg)) if msg.contains("corrupt version log")
		));
	}

	#[test]
	fn test_factory_validates_config() {
		let config: toml::Value = toml::from_str("storage_path = \"/tmp/ledger\"").unwrap();
		assert!(create_ledger(&config).is_ok());

		let config: toml::Value = toml::from_str("storage_path = \"  \"").unwrap();
		assert!(matches!(
			create_ledger(&config),
			Err(LedgerError::Configuration(_))
		));

		let config: toml::Value = toml::from_str("ttl_orders = 5").unwrap();
		assert!(create_ledger(&config).is_err());
	}
}
