//! Builder for constructing order engines.
//!
//! Composes an [`OrderEngine`] from configuration and a set of ledger
//! factory functions, one per backend name. Every configured backend is
//! created and its table checked against the backend's own config schema,
//! so configuration mistakes surface at startup; only the primary is kept.

use crate::engine::OrderEngine;
use biologics_config::Config;
use biologics_ledger::{LedgerError, LedgerInterface, LedgerService};
use biologics_types::ConfigSchema;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions available to the builder, keyed by implementation name.
pub struct EngineFactories<LF> {
	pub ledger_factories: HashMap<String, LF>,
}

/// Builder for constructing an OrderEngine with a pluggable ledger.
pub struct EngineBuilder {
	config: Config,
}

impl EngineBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine using the factory registered for each backend.
	pub fn build<LF>(self, factories: EngineFactories<LF>) -> Result<OrderEngine, BuilderError>
	where
		LF: Fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError>,
	{
		let primary = self.config.ledger.primary.clone();
		let mut primary_backend = None;

		for (name, config) in &self.config.ledger.implementations {
			let Some(factory) = factories.ledger_factories.get(name) else {
				tracing::warn!(component = "ledger", implementation = %name, "No factory registered, ignoring");
				continue;
			};
			match factory(config) {
				Ok(backend) => {
					if let Err(e) = backend.config_schema().validate(config) {
						tracing::error!(
							component = "ledger",
							implementation = %name,
							error = %e,
							"Invalid configuration for ledger implementation"
						);
						return Err(BuilderError::Config(format!(
							"Invalid configuration for ledger implementation '{}': {}",
							name, e
						)));
					}
					let is_primary = *name == primary;
					tracing::info!(component = "ledger", implementation = %name, enabled = %is_primary, "Loaded");
					if is_primary {
						primary_backend = Some(backend);
					}
				},
				Err(e) => {
					tracing::error!(
						component = "ledger",
						implementation = %name,
						error = %e,
						"Failed to create ledger implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create ledger implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		let backend = primary_backend.ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"No ledger factory available for primary implementation '{}'",
				primary
			))
		})?;

		tracing::info!(
			service_id = %self.config.service.id,
			ledger = %primary,
			create_mode = %self.config.lifecycle.create_mode,
			transition_policy = %self.config.lifecycle.transition_policy,
			"Order engine ready"
		);
		Ok(OrderEngine::new(
			self.config,
			Arc::new(LedgerService::new(backend)),
		))
	}
}
