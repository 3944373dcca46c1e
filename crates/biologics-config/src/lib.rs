//! Configuration for the biologics order ledger.
//!
//! Configuration is read from TOML. `${VAR}` and `${VAR:-default}`
//! placeholders are resolved from the environment before parsing, and a file
//! may pull in other files with `include = ["ledger.toml", ...]`, provided
//! every top-level section is defined only once across all of them.

mod loader;

use biologics_types::{CreateMode, CreateOrderRequest, SortOrder, TransitionPolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound accepted for `query.max_page_size`.
const PAGE_SIZE_CEILING: u32 = 10_000;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Ledger backend selection.
	pub ledger: LedgerConfig,
	/// Lifecycle engine policies.
	#[serde(default)]
	pub lifecycle: LifecycleConfig,
	/// Defaults and limits of the paginated query layer.
	#[serde(default)]
	pub query: QueryConfig,
	/// Orders written by `init_ledger`.
	#[serde(default)]
	pub seed: Vec<CreateOrderRequest>,
}

/// Identity of this service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier used in logs.
	pub id: String,
}

/// Configuration for the ledger backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of ledger implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Policies applied by the lifecycle engine.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LifecycleConfig {
	/// Mode used by create requests that do not name one.
	#[serde(default)]
	pub create_mode: CreateMode,
	/// Which status changes are accepted.
	#[serde(default)]
	pub transition_policy: TransitionPolicy,
}

/// Defaults and limits for paginated queries.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
	/// Sort field used when a request leaves it empty.
	#[serde(default = "default_sort_field")]
	pub default_sort_field: String,
	/// Sort direction used when a request leaves it empty.
	#[serde(default = "default_sort_order")]
	pub default_sort_order: SortOrder,
	/// Largest page a single request may ask for.
	#[serde(default = "default_max_page_size")]
	pub max_page_size: u32,
}

impl Default for QueryConfig {
	fn default() -> Self {
		Self {
			default_sort_field: default_sort_field(),
			default_sort_order: default_sort_order(),
			max_page_size: default_max_page_size(),
		}
	}
}

fn default_sort_field() -> String {
	"createdAt".to_string()
}

fn default_sort_order() -> SortOrder {
	SortOrder::Desc
}

fn default_max_page_size() -> u32 {
	1000
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(var_name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name.as_str()
				)))
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following its include directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Configuration table of the primary ledger implementation.
	pub fn primary_ledger_config(&self) -> Option<&toml::Value> {
		self.ledger.implementations.get(&self.ledger.primary)
	}

	/// Validates the configuration after parsing.
	///
	/// - Service ID must not be empty
	/// - The primary ledger must name a configured implementation
	/// - Query defaults must be usable and the page limit bounded
	/// - Seed orders need distinct, non-empty IDs
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.ledger.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one ledger implementation must be configured".into(),
			));
		}
		if self.ledger.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Ledger primary implementation cannot be empty".into(),
			));
		}
		if self.primary_ledger_config().is_none() {
			return Err(ConfigError::Validation(format!(
				"Primary ledger '{}' not found in implementations",
				self.ledger.primary
			)));
		}

		if self.query.default_sort_field.trim().is_empty() {
			return Err(ConfigError::Validation(
				"query.default_sort_field cannot be empty".into(),
			));
		}
		if self.query.max_page_size == 0 {
			return Err(ConfigError::Validation(
				"query.max_page_size must be greater than 0".into(),
			));
		}
		if self.query.max_page_size > PAGE_SIZE_CEILING {
			return Err(ConfigError::Validation(format!(
				"query.max_page_size cannot exceed {}",
				PAGE_SIZE_CEILING
			)));
		}

		let mut seen = HashSet::new();
		for (index, seed) in self.seed.iter().enumerate() {
			if seed.order_id.is_empty() {
				return Err(ConfigError::Validation(format!(
					"seed[{}] must have an orderId",
					index
				)));
			}
			if !seen.insert(seed.order_id.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate seed orderId '{}'",
					seed.order_id
				)));
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved first and the result is validated.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
