//! State management for orders.
//!
//! This module provides the state machine that validates requests, enforces
//! the configured transition policy and persists order records.

pub mod order;

pub use order::OrderStateMachine;
