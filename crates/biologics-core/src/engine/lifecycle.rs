//! Ledger initialization for the order engine.

use super::OrderEngine;
use crate::OrderError;
use biologics_types::{CreateMode, CreateOrderRequest};

impl OrderEngine {
	/// Seeds the ledger with the given orders.
	///
	/// Seeds are written with [`CreateMode::CreateIfAbsent`], so orders that
	/// already exist are kept as they are. Returns how many orders were
	/// created; any failure other than an existing key aborts the run.
	pub async fn init_ledger(&self, seeds: &[CreateOrderRequest]) -> Result<usize, OrderError> {
		tracing::info!(seeds = seeds.len(), "Initializing ledger");

		let mut created = 0;
		for seed in seeds {
			match self
				.state
				.create_order(seed.clone(), CreateMode::CreateIfAbsent)
				.await
			{
				Ok(_) => created += 1,
				Err(OrderError::AlreadyExists(order_id)) => {
					tracing::info!(order_id = %order_id, "Seed order already present, skipping");
				},
				Err(e) => return Err(e),
			}
		}

		tracing::info!(created, skipped = seeds.len() - created, "Ledger initialized");
		Ok(created)
	}
}
