//! Multi-file configuration loading.
//!
//! A main file may name other files through a top-level `include` key. Every
//! top-level section must come from exactly one file; the merged document is
//! then parsed and validated like a single file.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a configuration file together with the files it includes.
pub struct ConfigLoader {
	/// Directory relative includes are resolved against.
	base_path: PathBuf,
	/// Canonical paths already read, used to reject include cycles.
	loaded_files: HashSet<PathBuf>,
	/// Which file defined each top-level section.
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads `config_path` and everything it includes into a validated `Config`.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let config_path = self.resolve_path(config_path)?;
		let main_content = self.load_file(&config_path).await?;
		let main_toml: toml::Value = toml::from_str(&main_content)?;

		let includes = extract_includes(&main_toml)?;
		if includes.is_empty() {
			return main_content.parse();
		}

		let combined = self.combine(main_toml, includes, config_path).await?;
		let combined_str = toml::to_string(&combined).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		combined_str.parse()
	}

	async fn load_file(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.loaded_files.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		resolve_env_vars(&content)
	}

	async fn combine(
		&mut self,
		mut main_toml: toml::Value,
		includes: Vec<PathBuf>,
		main_path: PathBuf,
	) -> Result<toml::Value, ConfigError> {
		let main_table = main_toml
			.as_table_mut()
			.ok_or_else(|| ConfigError::Parse("Configuration root must be a table".into()))?;
		main_table.remove("include");
		for key in main_table.keys() {
			self.section_sources.insert(key.clone(), main_path.clone());
		}

		for include in includes {
			let resolved = self.resolve_path(&include)?;
			let content = self.load_file(&resolved).await?;
			let include_toml: toml::Value = toml::from_str(&content)?;
			let Some(include_table) = include_toml.as_table() else {
				continue;
			};

			for (key, value) in include_table {
				if key == "include" {
					return Err(ConfigError::Validation(format!(
						"Nested include in {} is not supported",
						resolved.display()
					)));
				}
				if let Some(existing) = self.section_sources.get(key) {
					return Err(ConfigError::Validation(format!(
						"Duplicate section '{}' found in {} and {}. \
						Each top-level section must be unique across all configuration files.",
						key,
						existing.display(),
						resolved.display()
					)));
				}
				self.section_sources.insert(key.clone(), resolved.clone());
				main_table.insert(key.clone(), value.clone());
			}
		}

		Ok(main_toml)
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

/// Reads the `include` directive, which may be a string or a list of strings.
fn extract_includes(toml: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match toml.get("include") {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.iter()
			.map(|item| {
				item.as_str().map(PathBuf::from).ok_or_else(|| {
					ConfigError::Validation("Include array must contain only strings".into())
				})
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const LEDGER_SECTION: &str = r#"
[ledger]
primary = "file"
[ledger.implementations.file]
storage_path = "./data"
"#;

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let path = temp_dir.path().join("config.toml");
		fs::write(
			&path,
			format!("[service]\nid = \"single\"\n{}", LEDGER_SECTION),
		)
		.unwrap();

		let config = Config::from_file(path.to_str().unwrap()).await.unwrap();
		assert_eq!(config.service.id, "single");
		assert_eq!(config.ledger.primary, "file");
	}

	#[tokio::test]
	async fn test_includes_are_merged() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(temp_dir.path().join("ledger.toml"), LEDGER_SECTION).unwrap();
		fs::write(
			temp_dir.path().join("seed.toml"),
			"[[seed]]\norderId = \"orderid001\"\ncurrentStatus = \"draft\"\n",
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			"include = [\"ledger.toml\", \"seed.toml\"]\n\n[service]\nid = \"split\"\n",
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();
		assert_eq!(config.service.id, "split");
		assert_eq!(config.ledger.primary, "file");
		assert_eq!(config.seed.len(), 1);
		assert_eq!(config.seed[0].order_id, "orderid001");
	}

	#[tokio::test]
	async fn test_single_include_string() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(temp_dir.path().join("ledger.toml"), LEDGER_SECTION).unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			"include = \"ledger.toml\"\n[service]\nid = \"one\"\n",
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		assert!(loader.load_config("main.toml").await.is_ok());
	}

	#[tokio::test]
	async fn test_duplicate_section_rejected() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(temp_dir.path().join("ledger.toml"), LEDGER_SECTION).unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!(
				"include = [\"ledger.toml\"]\n[service]\nid = \"dup\"\n{}",
				LEDGER_SECTION
			),
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let err = loader.load_config("main.toml").await.unwrap_err();
		assert!(err.to_string().contains("Duplicate section 'ledger'"));
	}

	#[tokio::test]
	async fn test_missing_include_is_io_error() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			"include = [\"absent.toml\"]\n[service]\nid = \"x\"\n",
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		assert!(matches!(
			loader.load_config("main.toml").await,
			Err(ConfigError::Io(_))
		));
	}

	#[tokio::test]
	async fn test_self_include_rejected() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			"include = [\"main.toml\"]\n[service]\nid = \"loop\"\n",
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let err = loader.load_config("main.toml").await.unwrap_err();
		assert!(err.to_string().contains("Circular include"));
	}

	#[test]
	fn test_include_must_be_strings() {
		let value: toml::Value = toml::from_str("include = [1, 2]").unwrap();
		assert!(extract_includes(&value).is_err());
	}
}
