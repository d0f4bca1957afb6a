//! Order lifecycle manager.
//!
//! Enforces the business rules around creating, paying, refunding, canceling
//! and editing orders. It is the only component that writes orders; the HTTP
//! layer and the payment event handler both go through it.

use crate::engine::event_bus::EventBus;
use crate::error::OrderError;
use crate::state::{OrderStateMachine, OrderUpdate};
use chrono::Utc;
use order_storage::OrderStore;
use order_types::{
	ItemId, NewOrderItem, Order, OrderEvent, OrderId, OrderItem, OrderStatus, OwnerId,
	ServiceEvent,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Lifecycle operations over persisted orders.
pub struct OrderManager {
	state_machine: OrderStateMachine,
	event_bus: EventBus,
}

impl OrderManager {
	pub fn new(store: Arc<OrderStore>, event_bus: EventBus, store_timeout: Duration) -> Self {
		Self {
			state_machine: OrderStateMachine::new(store, store_timeout),
			event_bus,
		}
	}

	/// Creates and persists a new order in status `Created`.
	///
	/// Fails with `Validation` if `items` is empty, an item has zero quantity
	/// or a negative price, or the total does not fit a `Decimal`.
	#[instrument(skip_all, fields(owner_id = owner_id, items = items.len()))]
	pub async fn create_order(
		&self,
		owner_id: OwnerId,
		items: Vec<NewOrderItem>,
	) -> Result<Order, OrderError> {
		if items.is_empty() {
			return Err(OrderError::Validation(
				"Order must contain at least one item".into(),
			));
		}
		if let Some(item) = items.iter().find(|item| item.quantity == 0) {
			return Err(OrderError::Validation(format!(
				"Quantity of product {} must be positive",
				item.product_id
			)));
		}
		if let Some(item) = items.iter().find(|item| item.price < Decimal::ZERO) {
			return Err(OrderError::Validation(format!(
				"Price of product {} cannot be negative",
				item.product_id
			)));
		}

		let order = Order::new(owner_id, items, Utc::now())
			.map_err(|e| OrderError::Validation(e.to_string()))?;
		let order = self.state_machine.store_order(order).await?;

		tracing::info!(order_id = order.id, total = %order.total_amount, "Order created");
		self.event_bus
			.publish(ServiceEvent::Order(OrderEvent::Created {
				order_id: order.id,
				owner_id,
				total_amount: order.total_amount,
			}))
			.ok();

		Ok(order)
	}

	pub async fn get_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
		self.state_machine.get_order(order_id).await
	}

	/// Orders placed by `owner_id`, sorted by id.
	pub async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Order>, OrderError> {
		self.state_machine.orders_by_owner(owner_id).await
	}

	/// Orders currently in `status`, sorted by id.
	pub async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, OrderError> {
		self.state_machine.orders_by_status(status).await
	}

	/// Cancels an order that has not shipped yet.
	///
	/// Canceling an already canceled order is rejected as well.
	#[instrument(skip_all, fields(order_id = order_id))]
	pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
		let update = self
			.state_machine
			.transition_order_status(order_id, OrderStatus::Canceled)
			.await?;
		tracing::info!("Order canceled");
		Ok(self.status_changed(update))
	}

	/// Overwrites the status without checking the transition graph.
	///
	/// Used by trusted internal triggers such as payment confirmations, where
	/// re-applying the current status must be harmless.
	#[instrument(skip_all, fields(order_id = order_id, status = %new_status))]
	pub async fn set_status(
		&self,
		order_id: OrderId,
		new_status: OrderStatus,
	) -> Result<Order, OrderError> {
		let update = self
			.state_machine
			.set_order_status(order_id, new_status)
			.await?;
		Ok(self.status_changed(update))
	}

	/// Moves an order to `new_status` if the transition graph allows it.
	#[instrument(skip_all, fields(order_id = order_id, status = %new_status))]
	pub async fn transition(
		&self,
		order_id: OrderId,
		new_status: OrderStatus,
	) -> Result<Order, OrderError> {
		let update = self
			.state_machine
			.transition_order_status(order_id, new_status)
			.await?;
		Ok(self.status_changed(update))
	}

	/// Accepts a payment for a `Created` order and marks it `Paid`.
	///
	/// The amount must cover the order total; overpayment is accepted and not
	/// tracked.
	#[instrument(skip_all, fields(order_id = order_id, amount = %amount))]
	pub async fn process_payment(
		&self,
		order_id: OrderId,
		amount: Decimal,
		payment_method: Option<&str>,
	) -> Result<Order, OrderError> {
		let update = self
			.state_machine
			.update_order_with(order_id, |order| {
				if order.status != OrderStatus::Created {
					return Err(OrderError::InvalidState {
						status: order.status,
						operation: "pay for",
					});
				}
				if amount < order.total_amount {
					return Err(OrderError::Validation("Insufficient payment amount".into()));
				}
				order.status = OrderStatus::Paid;
				Ok(())
			})
			.await?;

		tracing::info!(
			payment_method = payment_method.unwrap_or("unspecified"),
			"Payment accepted"
		);
		Ok(self.status_changed(update))
	}

	/// Accepts a refund request for a `Paid` order.
	///
	/// No state changes and no money moves; the request is published as
	/// [`OrderEvent::RefundRequested`].
	#[instrument(skip_all, fields(order_id = order_id, amount = %amount))]
	pub async fn process_refund(
		&self,
		order_id: OrderId,
		amount: Decimal,
		reason: Option<String>,
	) -> Result<(), OrderError> {
		self.state_machine
			.inspect_order_with(order_id, |order| {
				if order.status != OrderStatus::Paid {
					return Err(OrderError::InvalidState {
						status: order.status,
						operation: "refund",
					});
				}
				Ok(())
			})
			.await?;

		tracing::info!(reason = reason.as_deref().unwrap_or(""), "Refund requested");
		self.event_bus
			.publish(ServiceEvent::Order(OrderEvent::RefundRequested {
				order_id,
				amount,
				reason,
			}))
			.ok();
		Ok(())
	}

	/// Items of an order; empty when the order does not exist.
	pub async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, OrderError> {
		self.state_machine.items_of(order_id).await
	}

	/// Deletes one item of an order.
	///
	/// The order's `total_amount` is left unchanged.
	#[instrument(skip_all, fields(order_id = order_id, item_id = item_id))]
	pub async fn remove_order_item(
		&self,
		order_id: OrderId,
		item_id: ItemId,
	) -> Result<(), OrderError> {
		self.state_machine.remove_item(order_id, item_id).await?;

		tracing::info!("Order item removed");
		self.event_bus
			.publish(ServiceEvent::Order(OrderEvent::ItemRemoved { order_id, item_id }))
			.ok();
		Ok(())
	}

	pub async fn order_exists(&self, order_id: OrderId) -> Result<bool, OrderError> {
		self.state_machine.order_exists(order_id).await
	}

	/// Whether `owner_id` placed the order. A missing order is owned by nobody.
	pub async fn is_order_owned_by_user(
		&self,
		order_id: OrderId,
		owner_id: OwnerId,
	) -> Result<bool, OrderError> {
		match self.state_machine.get_order(order_id).await {
			Ok(order) => Ok(order.owner_id == owner_id),
			Err(OrderError::NotFound { .. }) => Ok(false),
			Err(e) => Err(e),
		}
	}

	/// Publishes a status change if the status actually changed.
	fn status_changed(&self, update: OrderUpdate) -> Order {
		let OrderUpdate {
			previous_status,
			order,
		} = update;

		if previous_status != order.status {
			tracing::info!(from = %previous_status, to = %order.status, "Order status changed");
			self.event_bus
				.publish(ServiceEvent::Order(OrderEvent::StatusChanged {
					order_id: order.id,
					from: previous_status,
					to: order.status,
				}))
				.ok();
		}
		order
	}
}
