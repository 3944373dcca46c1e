//! The order engine and its public operations.
//!
//! Create and update requests arrive serialized as JSON, exactly as a
//! client submits them. Reads return typed records that serialize back to
//! the same camelCase wire shape.

use crate::history;
use crate::query::{self, PageRequest};
use crate::state::OrderStateMachine;
use crate::OrderError;
use biologics_config::Config;
use biologics_ledger::LedgerService;
use biologics_types::{
	truncate_id, CreateMode, CreateOrderRequest, HistoryQueryResult, Order,
	PaginatedQueryResponse, StatusUpdatePayload,
};
use std::sync::Arc;
use tracing::instrument;

pub mod lifecycle;

/// Entry point for every order operation.
///
/// The engine owns no scheduler and holds no state besides its ledger
/// handle; each call runs to completion or fails without side effects.
///
/// Status updates are read-modify-write with no version check, so two
/// concurrent updates to one order can race and the later write wins.
pub struct OrderEngine {
	/// Engine configuration.
	config: Config,
	/// Ledger handle shared with the state machine.
	ledger: Arc<LedgerService>,
	/// Validation and persistence of create and update requests.
	state: OrderStateMachine,
}

impl OrderEngine {
	pub fn new(config: Config, ledger: Arc<LedgerService>) -> Self {
		let state = OrderStateMachine::new(ledger.clone(), config.lifecycle.transition_policy);
		Self {
			config,
			ledger,
			state,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Creates an order using the configured create mode.
	pub async fn create_order(&self, input: &str) -> Result<Order, OrderError> {
		self.create_order_with_mode(input, self.config.lifecycle.create_mode)
			.await
	}

	/// Creates an order from a serialized `CreateOrderRequest`.
	///
	/// Under [`CreateMode::Upsert`] an existing order with the same ID is
	/// replaced; under [`CreateMode::CreateIfAbsent`] it is left untouched
	/// and `AlreadyExists` is returned.
	#[instrument(skip_all)]
	pub async fn create_order_with_mode(
		&self,
		input: &str,
		mode: CreateMode,
	) -> Result<Order, OrderError> {
		let request: CreateOrderRequest = serde_json::from_str(input).map_err(|e| {
			OrderError::Validation(format!("failed to decode create request: {}", e))
		})?;
		self.state.create_order(request, mode).await
	}

	/// Applies a serialized `StatusUpdatePayload` to its order.
	#[instrument(skip_all)]
	pub async fn update_order_status(&self, input: &str) -> Result<Order, OrderError> {
		let payload: StatusUpdatePayload = serde_json::from_str(input).map_err(|e| {
			OrderError::Validation(format!("failed to decode status update: {}", e))
		})?;
		self.state.transition_order_status(payload).await
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderError> {
		let order = self.state.get_order(order_id).await?;
		tracing::debug!(order_id = %truncate_id(order_id), status = %order.current_status, "Read order");
		Ok(order)
	}

	/// Checks whether an order is stored under `order_id`.
	pub async fn order_exists(&self, order_id: &str) -> Result<bool, OrderError> {
		Ok(self.ledger.exists(order_id).await?)
	}

	/// Every stored order, in key order.
	pub async fn get_all_orders(&self) -> Result<Vec<Order>, OrderError> {
		query::orders_in_range(&self.ledger, "", "").await
	}

	/// Orders with keys in `[start_key, end_key)`; an empty bound is open.
	pub async fn get_orders_by_range(
		&self,
		start_key: &str,
		end_key: &str,
	) -> Result<Vec<Order>, OrderError> {
		query::orders_in_range(&self.ledger, start_key, end_key).await
	}

	/// Every ledger version of an order, oldest first.
	pub async fn get_order_history(
		&self,
		order_id: &str,
	) -> Result<Vec<HistoryQueryResult>, OrderError> {
		let history = history::order_history(&self.ledger, order_id).await?;
		tracing::debug!(
			order_id = %truncate_id(order_id),
			versions = history.len(),
			"Read order history"
		);
		Ok(history)
	}

	/// One page of orders sorted by `sort_field`.
	///
	/// Pass the returned bookmark back unchanged to fetch the next page; an
	/// empty bookmark starts from the beginning.
	pub async fn get_all_orders_with_pagination(
		&self,
		page_size: &str,
		bookmark: &str,
		sort_field: &str,
		sort_order: &str,
	) -> Result<PaginatedQueryResponse, OrderError> {
		let request =
			PageRequest::parse(&self.config.query, page_size, bookmark, sort_field, sort_order)?;
		query::orders_page(&self.ledger, &request).await
	}
}
