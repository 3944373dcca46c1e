//! Subcommands of the `biologics` binary.
//!
//! Each subcommand maps onto one engine operation and yields the operation's
//! result as JSON, in the same camelCase shape the records are stored in.

use biologics_core::OrderEngine;
use biologics_types::CreateMode;
use clap::{Subcommand, ValueEnum};
use serde_json::{json, Value};

/// How a create request treats an existing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
	/// Replace any existing order with the same ID
	Upsert,
	/// Fail if an order with the same ID exists
	CreateIfAbsent,
}

impl From<ModeArg> for CreateMode {
	fn from(mode: ModeArg) -> Self {
		match mode {
			ModeArg::Upsert => CreateMode::Upsert,
			ModeArg::CreateIfAbsent => CreateMode::CreateIfAbsent,
		}
	}
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Seed the ledger with the orders listed in the configuration
	Init,
	/// Create an order from a JSON create request
	Create {
		/// Serialized create request
		input: String,
		/// Overrides the configured create mode
		#[arg(long, value_enum)]
		mode: Option<ModeArg>,
	},
	/// Apply a JSON status update to an order
	Update {
		/// Serialized status update
		input: String,
	},
	/// Print an order
	Get { order_id: String },
	/// Check whether an order exists
	Exists { order_id: String },
	/// List orders, optionally limited to a key range
	List {
		/// Inclusive start key
		#[arg(long, default_value = "")]
		start: String,
		/// Exclusive end key
		#[arg(long, default_value = "")]
		end: String,
	},
	/// Print every ledger version of an order
	History { order_id: String },
	/// Fetch one page of orders
	Page {
		#[arg(long, default_value = "10")]
		page_size: String,
		/// Bookmark returned by the previous page
		#[arg(long, default_value = "")]
		bookmark: String,
		/// Sort field, the configured default when empty
		#[arg(long, default_value = "")]
		sort_field: String,
		/// Sort direction (asc or desc), the configured default when empty
		#[arg(long, default_value = "")]
		sort_order: String,
	},
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, Box<dyn std::error::Error>> {
	Ok(serde_json::to_value(value)?)
}

/// Runs one subcommand against the engine.
pub async fn execute(
	engine: &OrderEngine,
	command: Command,
) -> Result<Value, Box<dyn std::error::Error>> {
	match command {
		Command::Init => {
			let created = engine.init_ledger(&engine.config().seed).await?;
			Ok(json!({ "created": created }))
		},
		Command::Create { input, mode } => {
			let order = match mode {
				Some(mode) => engine.create_order_with_mode(&input, mode.into()).await?,
				None => engine.create_order(&input).await?,
			};
			to_json(&order)
		},
		Command::Update { input } => to_json(&engine.update_order_status(&input).await?),
		Command::Get { order_id } => to_json(&engine.get_order(&order_id).await?),
		Command::Exists { order_id } => Ok(json!(engine.order_exists(&order_id).await?)),
		Command::List { start, end } => {
			to_json(&engine.get_orders_by_range(&start, &end).await?)
		},
		Command::History { order_id } => to_json(&engine.get_order_history(&order_id).await?),
		Command::Page {
			page_size,
			bookmark,
			sort_field,
			sort_order,
		} => to_json(
			&engine
				.get_all_orders_with_pagination(&page_size, &bookmark, &sort_field, &sort_order)
				.await?,
		),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::factory_registry::build_engine_from_config;
	use biologics_config::Config;
	use biologics_core::OrderError;

	fn engine() -> OrderEngine {
		let config: Config = r#"
[service]
id = "cli-test"

[ledger]
primary = "memory"
[ledger.implementations.memory]

[[seed]]
orderId = "orderid001"
therapyType = "blue"
currentStatus = "draft"
statusHistory = [{ updatedBy = "admin", timestamp = "2024-01-01T00:00:00Z" }]
"#
		.parse()
		.unwrap();
		build_engine_from_config(config).unwrap()
	}

	#[tokio::test]
	async fn test_init_then_read() {
		let engine = engine();
		let result = execute(&engine, Command::Init).await.unwrap();
		assert_eq!(result, json!({ "created": 1 }));

		let order = execute(
			&engine,
			Command::Get {
				order_id: "orderid001".into(),
			},
		)
		.await
		.unwrap();
		assert_eq!(order["currentStatus"], "draft");
		assert_eq!(order["statusHistory"][0]["updatedBy"], "admin");
	}

	#[tokio::test]
	async fn test_create_mode_override() {
		let engine = engine();
		execute(&engine, Command::Init).await.unwrap();

		let input = json!({
			"orderId": "orderid001",
			"currentStatus": "draft",
			"statusHistory": [{ "updatedBy": "x", "timestamp": "T" }],
		})
		.to_string();
		let err = execute(
			&engine,
			Command::Create {
				input: input.clone(),
				mode: Some(ModeArg::CreateIfAbsent),
			},
		)
		.await
		.unwrap_err();
		assert!(matches!(
			err.downcast_ref::<OrderError>(),
			Some(OrderError::AlreadyExists(_))
		));

		let created = execute(&engine, Command::Create { input, mode: None })
			.await
			.unwrap();
		assert_eq!(created["statusHistory"][0]["updatedBy"], "x");
	}

	#[tokio::test]
	async fn test_update_history_and_page() {
		let engine = engine();
		execute(&engine, Command::Init).await.unwrap();
		execute(
			&engine,
			Command::Update {
				input: json!({
					"orderId": "orderid001",
					"status": "therapy_requested",
					"updatedBy": "hospital",
					"timestamp": "T1",
				})
				.to_string(),
			},
		)
		.await
		.unwrap();

		let history = execute(
			&engine,
			Command::History {
				order_id: "orderid001".into(),
			},
		)
		.await
		.unwrap();
		assert_eq!(history.as_array().map(Vec::len), Some(2));
		assert_eq!(history[1]["value"]["currentStatus"], "therapy_requested");

		let page = execute(
			&engine,
			Command::Page {
				page_size: "5".into(),
				bookmark: String::new(),
				sort_field: String::new(),
				sort_order: String::new(),
			},
		)
		.await
		.unwrap();
		assert_eq!(page["metadata"]["fetchedRecordsCount"], 1);
		assert_eq!(page["data"][0]["Key"], "orderid001");

		let exists = execute(
			&engine,
			Command::Exists {
				order_id: "orderid001".into(),
			},
		)
		.await
		.unwrap();
		assert_eq!(exists, json!(true));
	}
}
