//! Order state machine implementation.
//!
//! Orders move through `Created -> Paid -> Shipped -> Delivered`, and may be
//! canceled while `Created` or `Paid`. All store access of the lifecycle goes
//! through this type, which applies the per-order lock and the store deadline.

use crate::error::{Entity, OrderError};
use crate::locks::OrderLocks;
use chrono::Utc;
use once_cell::sync::Lazy;
use order_storage::{OrderStore, StorageError};
use order_types::{ItemId, Order, OrderId, OrderItem, OrderStatus, OwnerId};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Allowed next statuses for each status.
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		OrderStatus::Created,
		HashSet::from([OrderStatus::Paid, OrderStatus::Canceled]),
	);
	m.insert(
		OrderStatus::Paid,
		HashSet::from([OrderStatus::Shipped, OrderStatus::Canceled]),
	);
	m.insert(OrderStatus::Shipped, HashSet::from([OrderStatus::Delivered]));
	m.insert(OrderStatus::Delivered, HashSet::new()); // terminal
	m.insert(OrderStatus::Canceled, HashSet::new()); // terminal
	m
});

/// Result of a guarded update: the status before the update and the
/// persisted order after it.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
	pub previous_status: OrderStatus,
	pub order: Order,
}

/// Manages order state transitions and persistence
pub struct OrderStateMachine {
	store: Arc<OrderStore>,
	locks: OrderLocks,
	store_timeout: Duration,
}

impl OrderStateMachine {
	pub fn new(store: Arc<OrderStore>, store_timeout: Duration) -> Self {
		Self {
			store,
			locks: OrderLocks::new(),
			store_timeout,
		}
	}

	/// Checks if a state transition is valid.
	pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
		TRANSITIONS
			.get(&from)
			.is_some_and(|allowed| allowed.contains(&to))
	}

	/// Runs a store call under the configured deadline.
	///
	/// `NotFound` from the store is reported for `entity`/`id`; every other
	/// failure, including the deadline expiring, becomes `StoreUnavailable`.
	async fn bounded<T, F>(&self, entity: Entity, id: u64, call: F) -> Result<T, OrderError>
	where
		F: Future<Output = Result<T, StorageError>>,
	{
		match tokio::time::timeout(self.store_timeout, call).await {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(StorageError::NotFound)) => Err(OrderError::NotFound { entity, id }),
			Ok(Err(e)) => Err(OrderError::StoreUnavailable(e.to_string())),
			Err(_) => Err(OrderError::StoreUnavailable(format!(
				"store call did not complete within {} ms",
				self.store_timeout.as_millis()
			))),
		}
	}

	/// Persists a new order, assigning its identifiers.
	pub async fn store_order(&self, order: Order) -> Result<Order, OrderError> {
		let id = order.id;
		self.bounded(Entity::Order, id, self.store.save(order))
			.await
	}

	/// Gets an order by ID
	pub async fn get_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
		self.bounded(Entity::Order, order_id, self.store.find_by_id(order_id))
			.await
	}

	pub async fn orders_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Order>, OrderError> {
		self.bounded(Entity::Order, owner_id, self.store.find_by_owner(owner_id))
			.await
	}

	pub async fn orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, OrderError> {
		self.bounded(Entity::Order, 0, self.store.find_by_status(status))
			.await
	}

	pub async fn order_exists(&self, order_id: OrderId) -> Result<bool, OrderError> {
		self.bounded(Entity::Order, order_id, self.store.exists(order_id))
			.await
	}

	pub async fn items_of(&self, order_id: OrderId) -> Result<Vec<OrderItem>, OrderError> {
		self.bounded(
			Entity::Order,
			order_id,
			self.store.find_items_by_order(order_id),
		)
		.await
	}

	/// Loads an order under its lock and lets `check` inspect it without
	/// persisting anything.
	pub async fn inspect_order_with<F>(&self, order_id: OrderId, check: F) -> Result<Order, OrderError>
	where
		F: FnOnce(&Order) -> Result<(), OrderError>,
	{
		let _guard = self.locks.acquire(order_id).await;
		let order = self.get_order(order_id).await?;
		check(&order)?;
		Ok(order)
	}

	/// Updates an order with a closure and persists it.
	///
	/// The load, the update and the save happen while holding the order's
	/// lock. If `updater` fails nothing is written.
	pub async fn update_order_with<F>(
		&self,
		order_id: OrderId,
		updater: F,
	) -> Result<OrderUpdate, OrderError>
	where
		F: FnOnce(&mut Order) -> Result<(), OrderError>,
	{
		let _guard = self.locks.acquire(order_id).await;

		let mut order = self.get_order(order_id).await?;
		let previous_status = order.status;
		updater(&mut order)?;
		order.updated_at = Utc::now();

		let order = self
			.bounded(Entity::Order, order_id, self.store.save(order))
			.await?;
		Ok(OrderUpdate {
			previous_status,
			order,
		})
	}

	/// Transitions an order to a new status with validation
	pub async fn transition_order_status(
		&self,
		order_id: OrderId,
		new_status: OrderStatus,
	) -> Result<OrderUpdate, OrderError> {
		self.update_order_with(order_id, |order| {
			if !Self::is_valid_transition(order.status, new_status) {
				return Err(OrderError::InvalidTransition {
					from: order.status,
					to: new_status,
				});
			}
			order.status = new_status;
			Ok(())
		})
		.await
	}

	/// Overwrites the status without consulting the transition table.
	pub async fn set_order_status(
		&self,
		order_id: OrderId,
		new_status: OrderStatus,
	) -> Result<OrderUpdate, OrderError> {
		self.update_order_with(order_id, |order| {
			order.status = new_status;
			Ok(())
		})
		.await
	}

	/// Deletes `item_id` after checking it belongs to `order_id`.
	///
	/// `NotFound` for a missing order or item, `Validation` for an item of
	/// another order.
	pub async fn remove_item(&self, order_id: OrderId, item_id: ItemId) -> Result<(), OrderError> {
		let _guard = self.locks.acquire(order_id).await;

		let order = self.get_order(order_id).await?;
		if !order.items.iter().any(|item| item.id == item_id) {
			let item = self
				.bounded(Entity::OrderItem, item_id, self.store.find_item(item_id))
				.await?;
			return Err(OrderError::Validation(format!(
				"Item {} belongs to order {}, not {}",
				item_id, item.order_id, order_id
			)));
		}

		self.bounded(Entity::OrderItem, item_id, self.store.delete_item(item_id))
			.await
	}
}
