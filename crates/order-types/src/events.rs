//! Event types for inter-service communication.
//!
//! Payment events arrive from the external payment system and drive status
//! updates. Order events are published by the lifecycle manager after each
//! persisted change so other components can react.

use crate::{ItemId, OrderId, OrderStatus, OwnerId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main event type broadcast on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceEvent {
	/// Events from the order lifecycle manager.
	Order(OrderEvent),
}

/// Events received from the external payment system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PaymentEvent {
	/// The payment system reports an outcome for an order.
	///
	/// `status` is the raw value sent by the payment system; only `"PAID"`
	/// (any case) is acted upon.
	Confirmed { order_id: OrderId, status: String },
}

/// Events describing persisted order changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A new order has been stored.
	Created {
		order_id: OrderId,
		owner_id: OwnerId,
		total_amount: Decimal,
	},
	/// The status of an order has changed.
	StatusChanged {
		order_id: OrderId,
		from: OrderStatus,
		to: OrderStatus,
	},
	/// An item has been removed from an order.
	ItemRemoved { order_id: OrderId, item_id: ItemId },
	/// A refund was accepted for a paid order.
	RefundRequested {
		order_id: OrderId,
		amount: Decimal,
		reason: Option<String>,
	},
}

/// Wire format of a payment confirmation as delivered by the payment system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmedEvent {
	pub order_id: OrderId,
	pub status: String,
}

impl From<PaymentConfirmedEvent> for PaymentEvent {
	fn from(event: PaymentConfirmedEvent) -> Self {
		PaymentEvent::Confirmed {
			order_id: event.order_id,
			status: event.status,
		}
	}
}
