//! Policies that shape how the lifecycle engine applies requests.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a create request treats a key that already holds an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
	/// Overwrite whatever is stored under the key.
	#[default]
	Upsert,
	/// Refuse to write when the key already holds a value.
	CreateIfAbsent,
}

impl fmt::Display for CreateMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CreateMode::Upsert => write!(f, "upsert"),
			CreateMode::CreateIfAbsent => write!(f, "create_if_absent"),
		}
	}
}

/// Which status changes the lifecycle engine accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
	/// Any status of the vocabulary may follow any other.
	#[default]
	Lax,
	/// Only moves listed in the workflow transition table are accepted.
	Strict,
}

impl fmt::Display for TransitionPolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransitionPolicy::Lax => write!(f, "lax"),
			TransitionPolicy::Strict => write!(f, "strict"),
		}
	}
}
