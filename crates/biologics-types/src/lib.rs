//! Common types for the biologics order ledger.
//!
//! This crate defines the order record and its status vocabulary, the
//! request and response shapes of the public operations, the records
//! exchanged with the ledger collaborator, and the schema framework used to
//! validate backend configuration.

/// Response shapes for history and paginated queries.
pub mod api;
/// Records exchanged with the ledger collaborator.
pub mod ledger;
/// Create modes and transition policies.
pub mod lifecycle;
/// Order record, status vocabulary and request payloads.
pub mod order;
/// Registration of pluggable implementations.
pub mod registry;
/// Formatting helpers.
pub mod utils;
/// Configuration schema validation.
pub mod validation;

pub use api::*;
pub use ledger::*;
pub use lifecycle::*;
pub use order::*;
pub use registry::*;
pub use utils::truncate_id;
pub use validation::*;
