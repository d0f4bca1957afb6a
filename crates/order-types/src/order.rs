//! Order types for the order management system.
//!
//! This module defines the order record, its line items and the lifecycle
//! status enum shared by the store, the lifecycle manager and the API layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of an order. `0` marks an order that has not been persisted yet.
pub type OrderId = u64;
/// Identifier of an order item. `0` marks an item that has not been persisted yet.
pub type ItemId = u64;
/// Identifier of the user owning an order.
pub type OwnerId = u64;
/// Opaque identifier of an external product.
pub type ProductId = u64;

/// A purchase record for one owner.
///
/// The order exclusively owns its items; an item never outlives its order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier, assigned by the store on first save.
	pub id: OrderId,
	/// User who placed the order.
	pub owner_id: OwnerId,
	/// Line items in insertion order.
	pub items: Vec<OrderItem>,
	/// Timestamp when this order was created.
	pub created_at: DateTime<Utc>,
	/// Timestamp when this order was last persisted.
	pub updated_at: DateTime<Utc>,
	/// Sum of `price * quantity` over the items present at creation.
	pub total_amount: Decimal,
	/// Current lifecycle status.
	pub status: OrderStatus,
}

impl Order {
	/// Builds a fresh, not yet persisted order in the `Created` state.
	///
	/// The total is computed from the given items and fails with
	/// [`AmountOverflow`] if it does not fit a `Decimal`. Item identifiers and
	/// back-references are filled in by the store when the order is saved.
	pub fn new(
		owner_id: OwnerId,
		items: Vec<NewOrderItem>,
		now: DateTime<Utc>,
	) -> Result<Self, AmountOverflow> {
		let items: Vec<OrderItem> = items
			.into_iter()
			.map(|item| OrderItem {
				id: 0,
				order_id: 0,
				product_id: item.product_id,
				quantity: item.quantity,
				price: item.price,
			})
			.collect();
		let total_amount = items.iter().try_fold(Decimal::ZERO, |total, item| {
			item.line_total()
				.and_then(|line| total.checked_add(line))
				.ok_or(AmountOverflow)
		})?;

		Ok(Self {
			id: 0,
			owner_id,
			items,
			created_at: now,
			updated_at: now,
			total_amount,
			status: OrderStatus::Created,
		})
	}
}

/// Error returned when an order total does not fit a `Decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("order total overflows")]
pub struct AmountOverflow;

/// One product line within an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
	/// Unique identifier, assigned by the store on first save.
	pub id: ItemId,
	/// Back-reference to the owning order.
	pub order_id: OrderId,
	/// External product identifier.
	pub product_id: ProductId,
	/// Number of units, always positive.
	pub quantity: u32,
	/// Unit price at the time of ordering.
	pub price: Decimal,
}

impl OrderItem {
	/// Returns `price * quantity`, or `None` on overflow.
	pub fn line_total(&self) -> Option<Decimal> {
		self.price.checked_mul(Decimal::from(self.quantity))
	}
}

/// Input for one line of a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
	pub product_id: ProductId,
	pub quantity: u32,
	pub price: Decimal,
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	/// Order has been placed but not paid.
	Created,
	/// Payment has been accepted.
	Paid,
	/// Order has left the warehouse.
	Shipped,
	/// Order has reached the customer. Terminal.
	Delivered,
	/// Order has been canceled. Terminal.
	Canceled,
}

impl OrderStatus {
	/// Returns the canonical upper-case name of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Created => "CREATED",
			OrderStatus::Paid => "PAID",
			OrderStatus::Shipped => "SHIPPED",
			OrderStatus::Delivered => "DELIVERED",
			OrderStatus::Canceled => "CANCELED",
		}
	}

	/// Returns an iterator over all statuses.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Created,
			Self::Paid,
			Self::Shipped,
			Self::Delivered,
			Self::Canceled,
		]
		.into_iter()
	}

	/// Whether no further transition is possible from this status.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Delivered | OrderStatus::Canceled)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when a string does not name an order status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid order status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for OrderStatus {
	type Err = ParseStatusError;

	/// Parses a status name, ignoring ASCII case.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all()
			.find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
			.ok_or_else(|| ParseStatusError(s.to_string()))
	}
}
