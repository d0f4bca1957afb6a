//! Per-order mutual exclusion.
//!
//! Every read-modify-write of an order runs while holding the lock for its id,
//! so two concurrent updates of the same order are applied one after the other.
//! Different orders never contend.

use dashmap::DashMap;
use order_types::OrderId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Number of tracked ids above which idle locks are dropped.
const PRUNE_THRESHOLD: usize = 1024;

/// Registry of async mutexes keyed by order id.
#[derive(Clone, Default)]
pub struct OrderLocks {
	locks: Arc<DashMap<OrderId, Arc<Mutex<()>>>>,
}

impl OrderLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Waits for exclusive access to `order_id`.
	///
	/// The lock is held until the returned guard is dropped.
	pub async fn acquire(&self, order_id: OrderId) -> OwnedMutexGuard<()> {
		if self.locks.len() > PRUNE_THRESHOLD {
			self.prune();
		}

		let lock = self.locks.entry(order_id).or_default().clone();
		lock.lock_owned().await
	}

	/// Drops locks that nobody holds or waits on.
	pub fn prune(&self) {
		self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
	}

	/// Number of ids currently tracked.
	pub fn len(&self) -> usize {
		self.locks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.locks.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	#[tokio::test]
	async fn test_same_order_is_serialized() {
		let locks = OrderLocks::new();
		let active = Arc::new(AtomicUsize::new(0));
		let max_seen = Arc::new(AtomicUsize::new(0));

		let mut handles = Vec::new();
		for _ in 0..8 {
			let locks = locks.clone();
			let active = active.clone();
			let max_seen = max_seen.clone();
			handles.push(tokio::spawn(async move {
				let _guard = locks.acquire(1).await;
				let now = active.fetch_add(1, Ordering::SeqCst) + 1;
				max_seen.fetch_max(now, Ordering::SeqCst);
				tokio::time::sleep(Duration::from_millis(2)).await;
				active.fetch_sub(1, Ordering::SeqCst);
			}));
		}
		for handle in handles {
			handle.await.unwrap();
		}

		assert_eq!(max_seen.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_different_orders_do_not_block() {
		let locks = OrderLocks::new();
		let _first = locks.acquire(1).await;
		let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire(2)).await;
		assert!(second.is_ok());
	}

	#[tokio::test]
	async fn test_prune_keeps_held_locks() {
		let locks = OrderLocks::new();
		let held = locks.acquire(1).await;
		drop(locks.acquire(2).await);

		locks.prune();
		assert_eq!(locks.len(), 1);

		drop(held);
		locks.prune();
		assert!(locks.is_empty());
	}
}
