//! Main entry point for the biologics order ledger.
//!
//! Loads a configuration file, builds the order engine on the configured
//! ledger backend, runs a single operation and prints its result as JSON.

use biologics_config::Config;
use clap::Parser;
use std::path::PathBuf;

mod commands;
mod factory_registry;

use commands::Command;
use factory_registry::build_engine_from_config;

/// Command-line arguments for the biologics service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", env = "BIOLOGICS_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Seed the ledger from the configuration before running the command
	#[arg(long)]
	seed: bool,

	#[command(subcommand)]
	command: Command,
}

/// Main entry point for the biologics service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the order engine on the configured ledger
/// 5. Runs the requested operation and prints its JSON result
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	// Logs go to stderr so stdout carries only the JSON result
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	let config_path = args
		.config
		.to_str()
		.ok_or("configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = build_engine_from_config(config)?;

	if args.seed {
		let created = engine.init_ledger(&engine.config().seed).await?;
		tracing::info!(created, "Seeded ledger");
	}

	let result = commands::execute(&engine, args.command).await?;
	println!("{}", serde_json::to_string_pretty(&result)?);
	Ok(())
}
