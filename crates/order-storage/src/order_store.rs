//! Order repository on top of the typed storage service.
//!
//! Orders are stored with their items embedded. Each item is additionally
//! indexed under its own id so it can be found without knowing its order.
//!
//! The order record is authoritative. Writing it is the commit point of every
//! mutation, and an index entry only counts while the order it points to still
//! lists the item. Index entries left behind by an interrupted write are
//! therefore never visible.

use crate::{StorageError, StorageService};
use order_types::{ItemId, Order, OrderId, OrderItem, OrderStatus, OwnerId, StorageKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage id of the identifier counters inside the `sequences` namespace.
const SEQUENCE_ID: &str = "ids";

/// Last identifiers handed out. Persisted so ids are never reused after restart.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Sequences {
	last_order_id: OrderId,
	last_item_id: ItemId,
}

/// Durable keyed persistence for orders and their items.
pub struct OrderStore {
	storage: Arc<StorageService>,
	/// Serializes identifier allocation.
	sequence_lock: Mutex<()>,
}

impl OrderStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			sequence_lock: Mutex::new(()),
		}
	}

	/// Upserts an order and cascades its current items.
	///
	/// The order and any item carrying id `0` receive fresh identifiers, and
	/// every item's `order_id` is set to the order's id. Index entries of new
	/// items are written before the order record; if that write fails they are
	/// removed again. Items that were part of the previously stored version
	/// but are absent now lose their index entry. Returns the persisted
	/// representation.
	pub async fn save(&self, mut order: Order) -> Result<Order, StorageError> {
		self.assign_ids(&mut order).await?;

		let order_key = order.id.to_string();
		let previous: Option<Order> = match self
			.storage
			.retrieve(StorageKey::Orders.as_str(), &order_key)
			.await
		{
			Ok(previous) => Some(previous),
			Err(StorageError::NotFound) => None,
			Err(e) => return Err(e),
		};
		let known: HashSet<ItemId> = previous
			.iter()
			.flat_map(|previous| previous.items.iter().map(|item| item.id))
			.collect();

		let mut indexed = Vec::new();
		for item in order.items.iter().filter(|item| !known.contains(&item.id)) {
			if let Err(e) = self
				.storage
				.store(StorageKey::OrderItems.as_str(), &item.id.to_string(), item)
				.await
			{
				self.discard_index(&indexed).await;
				return Err(e);
			}
			indexed.push(item.id);
		}
		if let Err(e) = self
			.storage
			.store(StorageKey::Orders.as_str(), &order_key, &order)
			.await
		{
			self.discard_index(&indexed).await;
			return Err(e);
		}

		if let Some(previous) = previous {
			let current: HashSet<ItemId> = order.items.iter().map(|item| item.id).collect();
			let stale: Vec<ItemId> = previous
				.items
				.iter()
				.map(|item| item.id)
				.filter(|id| !current.contains(id))
				.collect();
			self.discard_index(&stale).await;
		}

		tracing::debug!(order_id = order.id, items = order.items.len(), "Saved order");
		Ok(order)
	}

	pub async fn find_by_id(&self, id: OrderId) -> Result<Order, StorageError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), &id.to_string())
			.await
	}

	/// All orders placed by `owner_id`, sorted by id.
	pub async fn find_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Order>, StorageError> {
		self.find_where(|order| order.owner_id == owner_id).await
	}

	/// All orders currently in `status`, sorted by id.
	pub async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, StorageError> {
		self.find_where(|order| order.status == status).await
	}

	pub async fn exists(&self, id: OrderId) -> Result<bool, StorageError> {
		self.storage
			.exists(StorageKey::Orders.as_str(), &id.to_string())
			.await
	}

	/// Looks an item up through the index and its owning order.
	///
	/// `NotFound` unless the order exists and still lists the item.
	pub async fn find_item(&self, item_id: ItemId) -> Result<OrderItem, StorageError> {
		let (_, item) = self.locate_item(item_id).await?;
		Ok(item)
	}

	/// Items of an order in insertion order; empty when the order is missing.
	pub async fn find_items_by_order(
		&self,
		order_id: OrderId,
	) -> Result<Vec<OrderItem>, StorageError> {
		match self.find_by_id(order_id).await {
			Ok(order) => Ok(order.items),
			Err(StorageError::NotFound) => Ok(Vec::new()),
			Err(e) => Err(e),
		}
	}

	/// Removes one item from its order and from the item index.
	///
	/// Fails with `NotFound` if the item does not exist. Once the order record
	/// is written the item is gone; a failure to drop its index entry is only
	/// logged.
	pub async fn delete_item(&self, item_id: ItemId) -> Result<(), StorageError> {
		let (mut order, _) = self.locate_item(item_id).await?;

		order.items.retain(|existing| existing.id != item_id);
		self.storage
			.store(StorageKey::Orders.as_str(), &order.id.to_string(), &order)
			.await?;

		self.discard_index(&[item_id]).await;
		Ok(())
	}

	async fn locate_item(&self, item_id: ItemId) -> Result<(Order, OrderItem), StorageError> {
		let indexed: OrderItem = self
			.storage
			.retrieve(StorageKey::OrderItems.as_str(), &item_id.to_string())
			.await?;

		let order = match self.find_by_id(indexed.order_id).await {
			Ok(order) => order,
			Err(StorageError::NotFound) => {
				tracing::debug!(item_id, order_id = indexed.order_id, "Ignoring orphaned item index entry");
				return Err(StorageError::NotFound);
			},
			Err(e) => return Err(e),
		};
		let item = order
			.items
			.iter()
			.find(|item| item.id == item_id)
			.cloned()
			.ok_or(StorageError::NotFound)?;
		Ok((order, item))
	}

	/// Drops index entries, logging failures.
	async fn discard_index(&self, item_ids: &[ItemId]) {
		for item_id in item_ids {
			if let Err(e) = self
				.storage
				.remove(StorageKey::OrderItems.as_str(), &item_id.to_string())
				.await
			{
				tracing::warn!(item_id, error = %e, "Failed to drop item index entry");
			}
		}
	}

	async fn find_where<F>(&self, predicate: F) -> Result<Vec<Order>, StorageError>
	where
		F: Fn(&Order) -> bool,
	{
		let mut orders: Vec<Order> = self
			.storage
			.list::<Order>(StorageKey::Orders.as_str())
			.await?
			.into_iter()
			.map(|(_, order)| order)
			.filter(|order| predicate(order))
			.collect();
		orders.sort_by_key(|order| order.id);
		Ok(orders)
	}

	async fn assign_ids(&self, order: &mut Order) -> Result<(), StorageError> {
		let needs_order_id = order.id == 0;
		let new_items = order.items.iter().filter(|item| item.id == 0).count() as u64;

		if needs_order_id || new_items > 0 {
			let _guard = self.sequence_lock.lock().await;
			let mut sequences: Sequences = match self
				.storage
				.retrieve(StorageKey::Sequences.as_str(), SEQUENCE_ID)
				.await
			{
				Ok(sequences) => sequences,
				Err(StorageError::NotFound) => Sequences::default(),
				Err(e) => return Err(e),
			};

			if needs_order_id {
				sequences.last_order_id += 1;
				order.id = sequences.last_order_id;
			}
			for item in order.items.iter_mut().filter(|item| item.id == 0) {
				sequences.last_item_id += 1;
				item.id = sequences.last_item_id;
			}

			self.storage
				.store(StorageKey::Sequences.as_str(), SEQUENCE_ID, &sequences)
				.await?;
		}

		for item in order.items.iter_mut() {
			item.order_id = order.id;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::{file::FileStorage, memory::MemoryStorage};
	use crate::StorageInterface;
	use async_trait::async_trait;
	use chrono::Utc;
	use order_types::{ConfigSchema, NewOrderItem};
	use rust_decimal::Decimal;
	use std::sync::atomic::{AtomicBool, Ordering};

	/// Memory backend whose writes to keys under `prefix` fail while `failing`
	/// is set.
	struct FailingWrites {
		inner: MemoryStorage,
		prefix: &'static str,
		failing: Arc<AtomicBool>,
	}

	impl FailingWrites {
		fn check(&self, key: &str) -> Result<(), StorageError> {
			if self.failing.load(Ordering::SeqCst) && key.starts_with(self.prefix) {
				return Err(StorageError::Backend("disk full".into()));
			}
			Ok(())
		}
	}

	#[async_trait]
	impl StorageInterface for FailingWrites {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.inner.get_bytes(key).await
		}
		async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
			self.check(key)?;
			self.inner.set_bytes(key, value).await
		}
		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.check(key)?;
			self.inner.delete(key).await
		}
		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.exists(key).await
		}
		async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
			self.inner.list_keys(namespace).await
		}
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.inner.config_schema()
		}
	}

	fn failing_store(prefix: &'static str) -> (OrderStore, Arc<StorageService>, Arc<AtomicBool>) {
		let failing = Arc::new(AtomicBool::new(false));
		let storage = Arc::new(StorageService::new(Box::new(FailingWrites {
			inner: MemoryStorage::new(),
			prefix,
			failing: failing.clone(),
		})));
		(OrderStore::new(storage.clone()), storage, failing)
	}

	fn store() -> OrderStore {
		OrderStore::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	fn order(owner_id: OwnerId, lines: &[(u64, u32, &str)]) -> Order {
		let items = lines
			.iter()
			.map(|(product_id, quantity, price)| NewOrderItem {
				product_id: *product_id,
				quantity: *quantity,
				price: price.parse::<Decimal>().unwrap(),
			})
			.collect();
		Order::new(owner_id, items, Utc::now()).unwrap()
	}

	#[tokio::test]
	async fn test_save_assigns_ids_and_back_references() {
		let store = store();
		let saved = store
			.save(order(7, &[(1, 2, "10.00"), (2, 1, "5.00")]))
			.await
			.unwrap();

		assert_eq!(saved.id, 1);
		assert_eq!(
			saved.items.iter().map(|i| i.id).collect::<Vec<_>>(),
			vec![1, 2]
		);
		assert!(saved.items.iter().all(|i| i.order_id == saved.id));

		let second = store.save(order(7, &[(3, 1, "1.00")])).await.unwrap();
		assert_eq!(second.id, 2);
		assert_eq!(second.items[0].id, 3);
	}

	#[tokio::test]
	async fn test_save_is_upsert() {
		let store = store();
		let mut saved = store.save(order(1, &[(1, 1, "3.00")])).await.unwrap();
		saved.status = OrderStatus::Paid;
		let resaved = store.save(saved.clone()).await.unwrap();

		assert_eq!(resaved.id, saved.id);
		assert_eq!(
			store.find_by_id(saved.id).await.unwrap().status,
			OrderStatus::Paid
		);
	}

	#[tokio::test]
	async fn test_find_by_owner_and_status_sorted() {
		let store = store();
		let a = store.save(order(1, &[(1, 1, "1.00")])).await.unwrap();
		let _b = store.save(order(2, &[(1, 1, "1.00")])).await.unwrap();
		let mut c = store.save(order(1, &[(1, 1, "1.00")])).await.unwrap();
		c.status = OrderStatus::Canceled;
		store.save(c.clone()).await.unwrap();

		let owned: Vec<_> = store
			.find_by_owner(1)
			.await
			.unwrap()
			.into_iter()
			.map(|o| o.id)
			.collect();
		assert_eq!(owned, vec![a.id, c.id]);

		let created = store.find_by_status(OrderStatus::Created).await.unwrap();
		assert_eq!(created.len(), 2);
		assert!(store.find_by_owner(99).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_delete_item_updates_order_and_index() {
		let store = store();
		let saved = store
			.save(order(1, &[(1, 2, "10.00"), (2, 1, "5.00")]))
			.await
			.unwrap();
		let removed = saved.items[0].id;

		store.delete_item(removed).await.unwrap();

		let reloaded = store.find_by_id(saved.id).await.unwrap();
		assert_eq!(reloaded.items.len(), 1);
		assert_eq!(reloaded.total_amount, "25.00".parse::<Decimal>().unwrap());
		assert!(matches!(
			store.find_item(removed).await,
			Err(StorageError::NotFound)
		));
		assert!(matches!(
			store.delete_item(removed).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_resave_without_item_drops_index_entry() {
		let store = store();
		let mut saved = store
			.save(order(1, &[(1, 1, "1.00"), (2, 1, "2.00")]))
			.await
			.unwrap();
		let dropped = saved.items.pop().unwrap();
		store.save(saved).await.unwrap();

		assert!(matches!(
			store.find_item(dropped.id).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_find_items_by_missing_order_is_empty() {
		let store = store();
		assert!(store.find_items_by_order(42).await.unwrap().is_empty());
		assert!(!store.exists(42).await.unwrap());
	}

	#[tokio::test]
	async fn test_file_backend_survives_reopen() {
		let dir = tempfile::TempDir::new().unwrap();
		let open = || {
			OrderStore::new(Arc::new(StorageService::new(Box::new(FileStorage::new(
				dir.path().to_path_buf(),
			)))))
		};

		let first = open().save(order(5, &[(1, 1, "9.99")])).await.unwrap();

		let reopened = open();
		let loaded = reopened.find_by_id(first.id).await.unwrap();
		assert_eq!(loaded, first);

		let next = reopened.save(order(5, &[(2, 1, "1.00")])).await.unwrap();
		assert_eq!(next.id, first.id + 1);
		assert_eq!(next.items[0].id, first.items[0].id + 1);
	}

	#[tokio::test]
	async fn test_failed_order_write_drops_new_index_entries() {
		let (store, storage, failing) = failing_store("orders:");
		failing.store(true, Ordering::SeqCst);

		let result = store.save(order(1, &[(1, 1, "1.00"), (2, 1, "2.00")])).await;
		assert!(matches!(result, Err(StorageError::Backend(_))));
		failing.store(false, Ordering::SeqCst);

		assert!(!store.exists(1).await.unwrap());
		for item_id in [1, 2] {
			assert!(!storage
				.exists(StorageKey::OrderItems.as_str(), &item_id.to_string())
				.await
				.unwrap());
		}

		let saved = store.save(order(1, &[(1, 1, "1.00")])).await.unwrap();
		assert_eq!(saved.id, 2);
		assert_eq!(store.find_item(saved.items[0].id).await.unwrap().order_id, 2);
	}

	#[tokio::test]
	async fn test_failed_update_keeps_existing_index() {
		let (store, _, failing) = failing_store("orders:");
		let mut saved = store.save(order(1, &[(1, 1, "1.00")])).await.unwrap();

		failing.store(true, Ordering::SeqCst);
		saved.status = OrderStatus::Paid;
		assert!(store.save(saved.clone()).await.is_err());
		failing.store(false, Ordering::SeqCst);

		assert_eq!(
			store.find_by_id(saved.id).await.unwrap().status,
			OrderStatus::Created
		);
		assert_eq!(store.find_item(saved.items[0].id).await.unwrap().order_id, saved.id);
	}

	#[tokio::test]
	async fn test_orphaned_index_entry_is_invisible() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let store = OrderStore::new(storage.clone());
		let orphan = OrderItem {
			id: 9,
			order_id: 5,
			product_id: 1,
			quantity: 1,
			price: Decimal::ONE,
		};
		storage
			.store(StorageKey::OrderItems.as_str(), "9", &orphan)
			.await
			.unwrap();

		assert!(matches!(store.find_item(9).await, Err(StorageError::NotFound)));
		assert!(matches!(store.delete_item(9).await, Err(StorageError::NotFound)));
	}

	#[tokio::test]
	async fn test_delete_item_commits_on_order_write() {
		let (store, _, failing) = failing_store("order_items:");
		let saved = store
			.save(order(1, &[(1, 1, "1.00"), (2, 1, "2.00")]))
			.await
			.unwrap();
		let removed = saved.items[0].id;

		failing.store(true, Ordering::SeqCst);
		store.delete_item(removed).await.unwrap();
		failing.store(false, Ordering::SeqCst);

		assert_eq!(store.find_by_id(saved.id).await.unwrap().items.len(), 1);
		assert!(matches!(
			store.find_item(removed).await,
			Err(StorageError::NotFound)
		));
	}
}
