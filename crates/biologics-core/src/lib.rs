//! Order lifecycle engine for the biologics order ledger.
//!
//! Tracks therapy orders as they move between requester, manufacturer,
//! logistics and hospital. Orders live in a versioned key-value ledger
//! reached through [`biologics_ledger::LedgerInterface`]; this crate provides
//! the state machine over order statuses, the reconstruction of an order's
//! version history, and the paginated query layer over the order set.

pub mod builder;
pub mod engine;
pub mod error;
pub mod history;
pub mod query;
pub mod state;

pub use builder::{BuilderError, EngineBuilder, EngineFactories};
pub use engine::OrderEngine;
pub use error::OrderError;
