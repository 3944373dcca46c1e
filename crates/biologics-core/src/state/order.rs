//! Order state machine implementation.
//!
//! Validates create and status-update requests, applies the configured
//! transition policy and persists the resulting record. Every accepted
//! request is exactly one ledger write; a rejected one writes nothing.

use crate::OrderError;
use biologics_ledger::LedgerService;
use biologics_types::{
	truncate_id, CreateMode, CreateOrderRequest, Order, OrderStatus, StatusHistoryEntry,
	StatusUpdatePayload, TransitionPolicy, UnknownStatus,
};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Status changes allowed under [`TransitionPolicy::Strict`].
static STRICT_TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	OrderStatus::all()
		.map(|from| {
			let mut allowed = HashSet::new();
			if let Some(next) = from.successor() {
				allowed.insert(next);
			}
			if !from.is_terminal() {
				allowed.insert(OrderStatus::TherapyCancelled);
			}
			if from != OrderStatus::EnteredInError {
				allowed.insert(OrderStatus::EnteredInError);
			}
			(from, allowed)
		})
		.collect()
});

/// Manages order creation, status transitions and persistence.
pub struct OrderStateMachine {
	ledger: Arc<LedgerService>,
	policy: TransitionPolicy,
}

impl OrderStateMachine {
	pub fn new(ledger: Arc<LedgerService>, policy: TransitionPolicy) -> Self {
		Self { ledger, policy }
	}

	pub fn policy(&self) -> TransitionPolicy {
		self.policy
	}

	/// Checks whether `policy` lets an order move from `from` to `to`.
	pub fn is_valid_transition(policy: TransitionPolicy, from: OrderStatus, to: OrderStatus) -> bool {
		match policy {
			TransitionPolicy::Lax => true,
			TransitionPolicy::Strict => STRICT_TRANSITIONS
				.get(&from)
				.is_some_and(|allowed| allowed.contains(&to)),
		}
	}

	/// Builds a fresh order from a create request.
	///
	/// The history is fixed to a single entry carrying `currentStatus` and
	/// the author and time of the first supplied history element.
	pub fn build_order(request: CreateOrderRequest) -> Result<Order, OrderError> {
		if request.order_id.is_empty() || request.current_status.is_empty() {
			return Err(OrderError::Validation(
				"orderId and status must not be empty".into(),
			));
		}
		let status: OrderStatus = request
			.current_status
			.parse()
			.map_err(|e: UnknownStatus| OrderError::Validation(e.to_string()))?;
		let seed = request
			.status_history
			.into_iter()
			.next()
			.ok_or_else(|| OrderError::Validation("missing initial history entry".into()))?;

		Ok(Order {
			order_id: request.order_id,
			therapy_type: request.therapy_type,
			manufacturer_id: request.manufacturer_id,
			hospital_id: request.hospital_id,
			logistics_id: request.logistics_id,
			slot_id: request.slot_id,
			current_status: status,
			status_history: vec![StatusHistoryEntry {
				status,
				updated_by: seed.updated_by,
				timestamp: seed.timestamp,
			}],
			created_at: request.created_at,
			ccn_code: request.ccn_code,
			cms_cert_number: request.cms_cert_number,
		})
	}

	/// Validates a create request and persists the new order.
	pub async fn create_order(
		&self,
		request: CreateOrderRequest,
		mode: CreateMode,
	) -> Result<Order, OrderError> {
		let order = Self::build_order(request)?;

		if mode == CreateMode::CreateIfAbsent && self.ledger.exists(&order.order_id).await? {
			tracing::warn!(
				order_id = %truncate_id(&order.order_id),
				"Rejected create for existing order"
			);
			return Err(OrderError::AlreadyExists(order.order_id));
		}

		self.store_order(&order).await?;
		tracing::info!(
			order_id = %truncate_id(&order.order_id),
			status = %order.current_status,
			mode = %mode,
			"Order created"
		);
		Ok(order)
	}

	/// Gets an order by ID.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderError> {
		self.ledger
			.retrieve::<Order>(order_id)
			.await
			.map_err(|e| match OrderError::from(e) {
				OrderError::Decode(msg) => {
					OrderError::Decode(format!("failed to decode order '{}': {}", order_id, msg))
				},
				other => other,
			})?
			.ok_or_else(|| OrderError::NotFound(order_id.to_string()))
	}

	/// Appends a status change to an order and persists it.
	pub async fn transition_order_status(
		&self,
		payload: StatusUpdatePayload,
	) -> Result<Order, OrderError> {
		let new_status: OrderStatus = payload
			.status
			.parse()
			.map_err(|e: UnknownStatus| OrderError::Validation(e.to_string()))?;

		let mut order = self.get_order(&payload.order_id).await?;

		if !Self::is_valid_transition(self.policy, order.current_status, new_status) {
			tracing::warn!(
				order_id = %truncate_id(&order.order_id),
				from = %order.current_status,
				to = %new_status,
				"Rejected status transition"
			);
			return Err(OrderError::InvalidTransition {
				from: order.current_status,
				to: new_status,
			});
		}

		let from = order.current_status;
		order.record_status(StatusHistoryEntry {
			status: new_status,
			updated_by: payload.updated_by,
			timestamp: payload.timestamp,
		});
		self.store_order(&order).await?;

		tracing::info!(
			order_id = %truncate_id(&order.order_id),
			from = %from,
			to = %new_status,
			history_len = order.status_history.len(),
			"Order status updated"
		);
		Ok(order)
	}

	async fn store_order(&self, order: &Order) -> Result<(), OrderError> {
		self.ledger
			.store(&order.order_id, order)
			.await
			.map_err(|e| OrderError::Store(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use biologics_ledger::implementations::memory::MemoryLedger;
	use biologics_types::HistorySeed;

	fn request(order_id: &str, status: &str) -> CreateOrderRequest {
		CreateOrderRequest {
			order_id: order_id.to_string(),
			therapy_type: "car-t".to_string(),
			current_status: status.to_string(),
			status_history: vec![HistorySeed {
				status: Some("ignored".to_string()),
				updated_by: "admin".to_string(),
				timestamp: "2024-01-01T00:00:00Z".to_string(),
			}],
			..Default::default()
		}
	}

	fn update(order_id: &str, status: &str) -> StatusUpdatePayload {
		StatusUpdatePayload {
			order_id: order_id.to_string(),
			status: status.to_string(),
			updated_by: "hospital".to_string(),
			timestamp: "2024-01-02T00:00:00Z".to_string(),
		}
	}

	fn machine(policy: TransitionPolicy) -> (OrderStateMachine, MemoryLedger) {
		let backend = MemoryLedger::new();
		let ledger = Arc::new(LedgerService::new(Box::new(backend.clone())));
		(OrderStateMachine::new(ledger, policy), backend)
	}

	#[test]
	fn test_build_order_seeds_single_entry() {
		let order = OrderStateMachine::build_order(request("o1", "draft")).unwrap();
		assert_eq!(order.current_status, OrderStatus::Draft);
		assert_eq!(order.status_history.len(), 1);
		assert_eq!(order.status_history[0].status, OrderStatus::Draft);
		assert_eq!(order.status_history[0].updated_by, "admin");
	}

	#[test]
	fn test_build_order_rejects_bad_input() {
		let err = OrderStateMachine::build_order(request("", "draft")).unwrap_err();
		assert!(matches!(err, OrderError::Validation(msg) if msg.contains("orderId")));

		let err = OrderStateMachine::build_order(request("o1", "")).unwrap_err();
		assert!(matches!(err, OrderError::Validation(_)));

		let err = OrderStateMachine::build_order(request("o1", "lost")).unwrap_err();
		assert!(matches!(err, OrderError::Validation(msg) if msg.contains("entered-in-error")));

		let mut no_history = request("o1", "draft");
		no_history.status_history.clear();
		let err = OrderStateMachine::build_order(no_history).unwrap_err();
		assert!(matches!(err, OrderError::Validation(msg) if msg == "missing initial history entry"));
	}

	#[test]
	fn test_lax_policy_allows_any_move() {
		for from in OrderStatus::all() {
			for to in OrderStatus::all() {
				assert!(OrderStateMachine::is_valid_transition(
					TransitionPolicy::Lax,
					from,
					to
				));
			}
		}
	}

	#[test]
	fn test_strict_policy_table() {
		let strict = |from, to| OrderStateMachine::is_valid_transition(TransitionPolicy::Strict, from, to);

		assert!(strict(OrderStatus::Draft, OrderStatus::TherapyRequested));
		assert!(strict(OrderStatus::DeliveredToHospital, OrderStatus::Completed));
		assert!(strict(OrderStatus::ProcessingStarted, OrderStatus::TherapyCancelled));
		assert!(strict(OrderStatus::Completed, OrderStatus::EnteredInError));
		assert!(strict(OrderStatus::TherapyCancelled, OrderStatus::EnteredInError));

		assert!(!strict(OrderStatus::Draft, OrderStatus::Completed));
		assert!(!strict(OrderStatus::Draft, OrderStatus::Draft));
		assert!(!strict(OrderStatus::Completed, OrderStatus::TherapyCancelled));
		assert!(!strict(OrderStatus::TherapyCancelled, OrderStatus::Draft));
		for to in OrderStatus::all() {
			assert!(!strict(OrderStatus::EnteredInError, to));
		}
	}

	#[tokio::test]
	async fn test_create_if_absent_conflict_writes_nothing() {
		let (machine, backend) = machine(TransitionPolicy::Lax);
		machine
			.create_order(request("o1", "draft"), CreateMode::CreateIfAbsent)
			.await
			.unwrap();

		let err = machine
			.create_order(request("o1", "therapy_requested"), CreateMode::CreateIfAbsent)
			.await
			.unwrap_err();
		assert!(matches!(err, OrderError::AlreadyExists(id) if id == "o1"));

		let versions = backend.versions_of("o1").await;
		assert_eq!(versions, 1);
		let stored = machine.get_order("o1").await.unwrap();
		assert_eq!(stored.current_status, OrderStatus::Draft);
	}

	#[tokio::test]
	async fn test_upsert_overwrites() {
		let (machine, _) = machine(TransitionPolicy::Lax);
		machine
			.create_order(request("o1", "draft"), CreateMode::Upsert)
			.await
			.unwrap();
		machine
			.create_order(request("o1", "completed"), CreateMode::Upsert)
			.await
			.unwrap();

		let stored = machine.get_order("o1").await.unwrap();
		assert_eq!(stored.current_status, OrderStatus::Completed);
		assert_eq!(stored.status_history.len(), 1);
	}

	#[tokio::test]
	async fn test_transition_appends_history() {
		let (machine, _) = machine(TransitionPolicy::Lax);
		machine
			.create_order(request("o1", "draft"), CreateMode::Upsert)
			.await
			.unwrap();

		let order = machine
			.transition_order_status(update("o1", "therapy_requested"))
			.await
			.unwrap();
		assert_eq!(order.current_status, OrderStatus::TherapyRequested);
		assert_eq!(order.status_history.len(), 2);
		assert_eq!(order.last_recorded_status(), Some(order.current_status));
		assert_eq!(order.status_history[1].updated_by, "hospital");
	}

	#[tokio::test]
	async fn test_strict_rejection_writes_nothing() {
		let (machine, backend) = machine(TransitionPolicy::Strict);
		machine
			.create_order(request("o1", "draft"), CreateMode::Upsert)
			.await
			.unwrap();

		let err = machine
			.transition_order_status(update("o1", "shipped_to_hospital"))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			OrderError::InvalidTransition {
				from: OrderStatus::Draft,
				to: OrderStatus::ShippedToHospital
			}
		));
		assert_eq!(backend.versions_of("o1").await, 1);
	}

	#[tokio::test]
	async fn test_transition_errors() {
		let (machine, _) = machine(TransitionPolicy::Lax);

		let err = machine
			.transition_order_status(update("missing", "draft"))
			.await
			.unwrap_err();
		assert!(matches!(err, OrderError::NotFound(id) if id == "missing"));

		let err = machine
			.transition_order_status(update("missing", "bogus"))
			.await
			.unwrap_err();
		assert!(matches!(err, OrderError::Validation(msg) if msg.contains("invalid status 'bogus'")));
	}

	#[tokio::test]
	async fn test_get_order_decode_error() {
		let (machine, backend) = machine(TransitionPolicy::Lax);
		use biologics_ledger::LedgerInterface;
		backend.put_state("junk", b"not json".to_vec()).await.unwrap();

		let err = machine.get_order("junk").await.unwrap_err();
		assert!(matches!(err, OrderError::Decode(msg) if msg.contains("junk")));
	}
}
