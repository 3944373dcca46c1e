//! Factory registry for ledger implementations.
//!
//! Collects every ledger backend the ledger crate registers so the engine
//! builder can instantiate whichever one the configuration names.

use biologics_config::Config;
use biologics_core::{EngineBuilder, EngineFactories, OrderEngine};
use biologics_ledger::LedgerFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Registry of ledger factories keyed by implementation name.
pub struct FactoryRegistry {
	pub ledger: HashMap<String, LedgerFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			ledger: HashMap::new(),
		}
	}

	/// Register a ledger implementation
	pub fn register_ledger(&mut self, name: impl Into<String>, factory: LedgerFactory) {
		self.ledger.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Initialize the global registry with all available implementations
pub fn initialize_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();
		for (name, factory) in biologics_ledger::get_all_implementations() {
			tracing::debug!("Registering ledger implementation: {}", name);
			registry.register_ledger(name, factory);
		}
		registry
	})
}

/// Builds the order engine from configuration using the registered factories.
pub fn build_engine_from_config(config: Config) -> Result<OrderEngine, Box<dyn std::error::Error>> {
	let registry = initialize_registry();
	let factories = EngineFactories {
		ledger_factories: registry.ledger.clone(),
	};
	Ok(EngineBuilder::new(config).build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_registry_has_all_backends() {
		let registry = initialize_registry();
		assert!(registry.ledger.contains_key("memory"));
		assert!(registry.ledger.contains_key("file"));
	}

	#[test]
	fn test_build_engine_rejects_unregistered_primary() {
		let config: Config = r#"
[service]
id = "registry-test"

[ledger]
primary = "couch"
[ledger.implementations.couch]
"#
		.parse()
		.unwrap();
		assert!(build_engine_from_config(config).is_err());
	}
}
