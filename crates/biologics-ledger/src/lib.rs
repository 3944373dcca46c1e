//! Ledger access port for the biologics order ledger.
//!
//! The lifecycle engine never talks to a concrete store. It consumes the
//! narrow [`LedgerInterface`] contract (point reads and writes, range scans,
//! per-key history scans and paginated rich queries) that any versioned
//! key-value ledger can provide. Scans hand back cursor resources which are
//! wrapped in a [`ScopedIterator`] so they are released on every exit path.

use async_trait::async_trait;
use biologics_types::{
	ConfigSchema, ImplementationRegistry, KeyModification, KeyValue, QueryResponseMetadata,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod iterator;
pub mod rich_query;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use iterator::{BufferedIterator, LedgerIterator, ScopedIterator};

/// Errors reported by a ledger backend.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the ledger backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs when a rich query or its bookmark is malformed.
	#[error("Query error: {0}")]
	Query(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Cursor over key/value pairs from range scans and rich queries.
pub type StateIterator = Box<dyn LedgerIterator<KeyValue>>;

/// Cursor over the versions of a single key.
pub type HistoryIterator = Box<dyn LedgerIterator<KeyModification>>;

/// Contract the order engine requires from the ledger collaborator.
///
/// Implementations must provide linearizable single-key reads and writes and
/// an immutable per-key version history. Every successful `put_state` is one
/// committed version of the key.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Returns the current value of a key, or `None` if it has no value.
	async fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

	/// Writes a new version of a key.
	async fn put_state(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError>;

	/// Scans current values with keys in `[start_key, end_key)`.
	///
	/// An empty bound leaves that side of the range open.
	async fn get_state_by_range(
		&self,
		start_key: &str,
		end_key: &str,
	) -> Result<StateIterator, LedgerError>;

	/// Scans every version of a key from oldest to newest.
	async fn get_history_for_key(&self, key: &str) -> Result<HistoryIterator, LedgerError>;

	/// Runs a JSON rich query and returns one page of results.
	///
	/// `bookmark` is the opaque cursor from a previous page, or empty to start
	/// from the beginning.
	async fn get_query_result_with_pagination(
		&self,
		query: &str,
		page_size: i32,
		bookmark: &str,
	) -> Result<(StateIterator, QueryResponseMetadata), LedgerError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for ledger factory functions.
pub type LedgerFactory = fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError>;

/// Registry trait for ledger implementations.
pub trait LedgerRegistry: ImplementationRegistry<Factory = LedgerFactory> {}

/// Get all registered ledger implementations.
///
/// Returns (name, factory) pairs for every backend shipped with this crate.
pub fn get_all_implementations() -> Vec<(&'static str, LedgerFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Ledger handle used by the engine.
///
/// Wraps a backend, scopes every cursor it opens, and offers typed JSON
/// helpers on top of the raw byte operations.
pub struct LedgerService {
	backend: Box<dyn LedgerInterface>,
}

impl LedgerService {
	/// Creates a new LedgerService with the specified backend.
	pub fn new(backend: Box<dyn LedgerInterface>) -> Self {
		Self { backend }
	}

	pub async fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
		self.backend.get_state(key).await
	}

	pub async fn put_state(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
		self.backend.put_state(key, value).await
	}

	/// Checks whether a key currently holds a non-empty value.
	pub async fn exists(&self, key: &str) -> Result<bool, LedgerError> {
		Ok(self
			.backend
			.get_state(key)
			.await?
			.is_some_and(|bytes| !bytes.is_empty()))
	}

	/// Serializes a value to JSON and writes it under `key`.
	pub async fn store<T: Serialize>(&self, key: &str, data: &T) -> Result<(), LedgerError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| LedgerError::Serialization(e.to_string()))?;
		self.backend.put_state(key, bytes).await
	}

	/// Reads `key` and deserializes it from JSON, `None` if absent.
	pub async fn retrieve<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, LedgerError> {
		match self.backend.get_state(key).await? {
			Some(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)
				.map(Some)
				.map_err(|e| LedgerError::Serialization(e.to_string())),
			_ => Ok(None),
		}
	}

	pub async fn range(
		&self,
		start_key: &str,
		end_key: &str,
	) -> Result<ScopedIterator<KeyValue>, LedgerError> {
		let inner = self.backend.get_state_by_range(start_key, end_key).await?;
		Ok(ScopedIterator::new(inner))
	}

	pub async fn history(&self, key: &str) -> Result<ScopedIterator<KeyModification>, LedgerError> {
		let inner = self.backend.get_history_for_key(key).await?;
		Ok(ScopedIterator::new(inner))
	}

	pub async fn query_page(
		&self,
		query: &str,
		page_size: i32,
		bookmark: &str,
	) -> Result<(ScopedIterator<KeyValue>, QueryResponseMetadata), LedgerError> {
		let (inner, metadata) = self
			.backend
			.get_query_result_with_pagination(query, page_size, bookmark)
			.await?;
		Ok((ScopedIterator::new(inner), metadata))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryLedger;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Sample {
		name: String,
	}

	#[tokio::test]
	async fn test_typed_store_and_retrieve() {
		let service = LedgerService::new(Box::new(MemoryLedger::new()));
		let sample = Sample {
			name: "a".to_string(),
		};

		service.store("k1", &sample).await.unwrap();
		let loaded: Option<Sample> = service.retrieve("k1").await.unwrap();
		assert_eq!(loaded, Some(sample));

		let missing: Option<Sample> = service.retrieve("k2").await.unwrap();
		assert!(missing.is_none());
		assert!(service.exists("k1").await.unwrap());
		assert!(!service.exists("k2").await.unwrap());
	}

	#[tokio::test]
	async fn test_retrieve_reports_malformed_bytes() {
		let service = LedgerService::new(Box::new(MemoryLedger::new()));
		service.put_state("k1", b"not json".to_vec()).await.unwrap();

		let result: Result<Option<Sample>, _> = service.retrieve("k1").await;
		assert!(matches!(result, Err(LedgerError::Serialization(_))));
	}

	#[test]
	fn test_all_implementations_registered() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["file", "memory"]);
	}
}
