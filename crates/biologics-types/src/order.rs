//! Order record types for the biologics order ledger.
//!
//! This module defines the closed status vocabulary, the persisted order
//! record with its append-only status history, and the request shapes that
//! callers submit to create orders or move them through their lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle stage of a therapy order.
///
/// The vocabulary is closed: every status that is ever stored as an order's
/// current status or inside its history is one of these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Order is being drafted by the requester.
	Draft,
	/// Therapy has been requested from the manufacturer.
	TherapyRequested,
	/// Manufacturer has confirmed the therapy slot.
	TherapyConfirmed,
	/// Patient material is ready to be collected.
	MaterialReadyForPickup,
	/// Material is in transit to the manufacturer.
	ShippedToManufacturer,
	/// Material has arrived at the manufacturer.
	DeliveredToManufacturer,
	/// Manufacturing has started.
	ProcessingStarted,
	/// Finished product is ready to leave the manufacturer.
	ReadyForDispatch,
	/// Product is in transit to the hospital.
	ShippedToHospital,
	/// Product has arrived at the hospital.
	DeliveredToHospital,
	/// Therapy was cancelled.
	TherapyCancelled,
	/// Order is complete.
	Completed,
	/// Order was recorded by mistake.
	#[serde(rename = "entered-in-error")]
	EnteredInError,
}

impl OrderStatus {
	/// Every status in canonical order.
	pub const ALL: [OrderStatus; 13] = [
		OrderStatus::Draft,
		OrderStatus::TherapyRequested,
		OrderStatus::TherapyConfirmed,
		OrderStatus::MaterialReadyForPickup,
		OrderStatus::ShippedToManufacturer,
		OrderStatus::DeliveredToManufacturer,
		OrderStatus::ProcessingStarted,
		OrderStatus::ReadyForDispatch,
		OrderStatus::ShippedToHospital,
		OrderStatus::DeliveredToHospital,
		OrderStatus::TherapyCancelled,
		OrderStatus::Completed,
		OrderStatus::EnteredInError,
	];

	/// Returns the wire token for this status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Draft => "draft",
			OrderStatus::TherapyRequested => "therapy_requested",
			OrderStatus::TherapyConfirmed => "therapy_confirmed",
			OrderStatus::MaterialReadyForPickup => "material_ready_for_pickup",
			OrderStatus::ShippedToManufacturer => "shipped_to_manufacturer",
			OrderStatus::DeliveredToManufacturer => "delivered_to_manufacturer",
			OrderStatus::ProcessingStarted => "processing_started",
			OrderStatus::ReadyForDispatch => "ready_for_dispatch",
			OrderStatus::ShippedToHospital => "shipped_to_hospital",
			OrderStatus::DeliveredToHospital => "delivered_to_hospital",
			OrderStatus::TherapyCancelled => "therapy_cancelled",
			OrderStatus::Completed => "completed",
			OrderStatus::EnteredInError => "entered-in-error",
		}
	}

	/// Returns an iterator over all statuses in canonical order.
	pub fn all() -> impl Iterator<Item = Self> {
		Self::ALL.into_iter()
	}

	/// Checks whether a raw token belongs to the vocabulary.
	pub fn is_valid(token: &str) -> bool {
		token.parse::<OrderStatus>().is_ok()
	}

	/// Comma separated list of every valid token, used in error messages.
	pub fn valid_tokens() -> String {
		Self::all()
			.map(|s| s.as_str())
			.collect::<Vec<_>>()
			.join(", ")
	}

	/// The next stage on the main fulfillment line, if any.
	///
	/// Side states and `completed` have no successor.
	pub fn successor(&self) -> Option<OrderStatus> {
		match self {
			OrderStatus::Draft => Some(OrderStatus::TherapyRequested),
			OrderStatus::TherapyRequested => Some(OrderStatus::TherapyConfirmed),
			OrderStatus::TherapyConfirmed => Some(OrderStatus::MaterialReadyForPickup),
			OrderStatus::MaterialReadyForPickup => Some(OrderStatus::ShippedToManufacturer),
			OrderStatus::ShippedToManufacturer => Some(OrderStatus::DeliveredToManufacturer),
			OrderStatus::DeliveredToManufacturer => Some(OrderStatus::ProcessingStarted),
			OrderStatus::ProcessingStarted => Some(OrderStatus::ReadyForDispatch),
			OrderStatus::ReadyForDispatch => Some(OrderStatus::ShippedToHospital),
			OrderStatus::ShippedToHospital => Some(OrderStatus::DeliveredToHospital),
			OrderStatus::DeliveredToHospital => Some(OrderStatus::Completed),
			OrderStatus::TherapyCancelled | OrderStatus::Completed | OrderStatus::EnteredInError => {
				None
			},
		}
	}

	/// Whether the workflow ends at this status.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			OrderStatus::TherapyCancelled | OrderStatus::Completed | OrderStatus::EnteredInError
		)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when a token is not part of the status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status '{0}'. Must be one of: {valid}", valid = OrderStatus::valid_tokens())]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"draft" => Ok(Self::Draft),
			"therapy_requested" => Ok(Self::TherapyRequested),
			"therapy_confirmed" => Ok(Self::TherapyConfirmed),
			"material_ready_for_pickup" => Ok(Self::MaterialReadyForPickup),
			"shipped_to_manufacturer" => Ok(Self::ShippedToManufacturer),
			"delivered_to_manufacturer" => Ok(Self::DeliveredToManufacturer),
			"processing_started" => Ok(Self::ProcessingStarted),
			"ready_for_dispatch" => Ok(Self::ReadyForDispatch),
			"shipped_to_hospital" => Ok(Self::ShippedToHospital),
			"delivered_to_hospital" => Ok(Self::DeliveredToHospital),
			"therapy_cancelled" => Ok(Self::TherapyCancelled),
			"completed" => Ok(Self::Completed),
			"entered-in-error" => Ok(Self::EnteredInError),
			other => Err(UnknownStatus(other.to_string())),
		}
	}
}

/// One immutable entry in an order's status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatusHistoryEntry {
	/// Status the order moved into.
	pub status: OrderStatus,
	/// Party that recorded the change.
	pub updated_by: String,
	/// Caller supplied time of the change.
	pub timestamp: String,
}

/// A therapy order as persisted on the ledger under its `orderId`.
///
/// `current_status` always mirrors the status of the last history entry;
/// use [`Order::record_status`] to keep the two in step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Order {
	/// Primary key, immutable after creation.
	pub order_id: String,
	pub therapy_type: String,
	pub manufacturer_id: String,
	pub hospital_id: String,
	pub logistics_id: String,
	pub slot_id: String,
	/// Status of the last history entry.
	pub current_status: OrderStatus,
	/// Append-only status log, never empty once persisted.
	pub status_history: Vec<StatusHistoryEntry>,
	pub created_at: String,
	pub ccn_code: String,
	pub cms_cert_number: String,
}

impl Order {
	/// Appends a status change and moves the current status along with it.
	pub fn record_status(&mut self, entry: StatusHistoryEntry) {
		self.current_status = entry.status;
		self.status_history.push(entry);
	}

	/// Status of the most recent history entry.
	pub fn last_recorded_status(&self) -> Option<OrderStatus> {
		self.status_history.last().map(|entry| entry.status)
	}
}

/// Seed element of a create request's `statusHistory`.
///
/// Only `updatedBy` and `timestamp` are used; the seed status is always the
/// request's `currentStatus`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct HistorySeed {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	pub updated_by: String,
	pub timestamp: String,
}

/// Order shape submitted by callers to create an order.
///
/// Every field is optional on the wire so that missing values surface as
/// validation failures naming the field rather than as decode errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CreateOrderRequest {
	pub order_id: String,
	pub therapy_type: String,
	pub manufacturer_id: String,
	pub hospital_id: String,
	pub logistics_id: String,
	pub slot_id: String,
	pub current_status: String,
	pub status_history: Vec<HistorySeed>,
	pub created_at: String,
	pub ccn_code: String,
	pub cms_cert_number: String,
}

/// Payload of a status update request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct StatusUpdatePayload {
	pub order_id: String,
	pub status: String,
	pub updated_by: String,
	pub timestamp: String,
}
