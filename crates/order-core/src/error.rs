//! Errors reported by the order lifecycle.

use order_types::OrderStatus;
use std::fmt;
use thiserror::Error;

/// Kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
	Order,
	OrderItem,
}

impl fmt::Display for Entity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Entity::Order => f.write_str("Order"),
			Entity::OrderItem => f.write_str("Order item"),
		}
	}
}

/// Errors that can occur during order lifecycle operations.
#[derive(Debug, Error)]
pub enum OrderError {
	#[error("{entity} {id} not found")]
	NotFound { entity: Entity, id: u64 },
	#[error("Validation failed: {0}")]
	Validation(String),
	#[error("Invalid status transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Cannot {operation} an order in status {status}")]
	InvalidState {
		status: OrderStatus,
		operation: &'static str,
	},
	/// The store failed or did not answer within the configured deadline.
	#[error("Order store unavailable: {0}")]
	StoreUnavailable(String),
}
