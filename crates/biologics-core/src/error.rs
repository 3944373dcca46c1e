//! Errors reported by the order engine.

use biologics_ledger::LedgerError;
use biologics_types::OrderStatus;
use thiserror::Error;

/// Errors that can occur while creating, updating or reading orders.
///
/// A failed create or update never leaves a partial write behind.
#[derive(Debug, Error)]
pub enum OrderError {
	/// The request was malformed or carried an unacceptable value.
	#[error("Validation error: {0}")]
	Validation(String),
	/// No order is stored under the key.
	#[error("order with ID {0} does not exist")]
	NotFound(String),
	/// Stored or historical bytes are not a valid order.
	#[error("Decode error: {0}")]
	Decode(String),
	/// The ledger collaborator failed.
	#[error("Store error: {0}")]
	Store(String),
	/// A create-if-absent request hit an existing key.
	#[error("order with ID {0} already exists")]
	AlreadyExists(String),
	/// The strict transition policy does not allow this status change.
	#[error("Invalid status transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
}

impl From<LedgerError> for OrderError {
	fn from(err: LedgerError) -> Self {
		match err {
			LedgerError::Serialization(msg) => OrderError::Decode(msg),
			other => OrderError::Store(other.to_string()),
		}
	}
}
