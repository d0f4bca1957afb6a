//! Payment confirmation handler.
//!
//! Reacts to confirmations coming from the external payment system by marking
//! the order as paid. Confirmations may be redelivered; applying `PAID` twice
//! leaves the order unchanged.

use crate::error::OrderError;
use crate::manager::OrderManager;
use order_types::{OrderId, OrderStatus};
use std::sync::Arc;
use tracing::instrument;

/// Status value the payment system sends for a successful payment.
const PAID_STATUS: &str = "PAID";

/// Handler for payment confirmation events.
pub struct PaymentHandler {
	manager: Arc<OrderManager>,
}

impl PaymentHandler {
	pub fn new(manager: Arc<OrderManager>) -> Self {
		Self { manager }
	}

	/// Applies a confirmation to its order.
	///
	/// Only `"PAID"` (any case) is acted upon. Any other status is logged and
	/// dropped. Errors are returned to the caller, which logs them; nothing is
	/// retried.
	#[instrument(skip_all, fields(order_id = order_id, status = %status))]
	pub async fn handle_confirmed(&self, order_id: OrderId, status: &str) -> Result<(), OrderError> {
		if !status.trim().eq_ignore_ascii_case(PAID_STATUS) {
			tracing::warn!("Ignoring payment confirmation with unsupported status");
			return Ok(());
		}

		self.manager.set_status(order_id, OrderStatus::Paid).await?;
		tracing::info!("Payment confirmation applied");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::event_bus::EventBus;
	use order_storage::{implementations::memory::MemoryStorage, OrderStore, StorageService};
	use order_types::NewOrderItem;
	use std::time::Duration;

	async fn setup() -> (PaymentHandler, Arc<OrderManager>, OrderId) {
		let store = Arc::new(OrderStore::new(Arc::new(StorageService::new(Box::new(
			MemoryStorage::new(),
		)))));
		let manager = Arc::new(OrderManager::new(
			store,
			EventBus::new(16),
			Duration::from_secs(5),
		));
		let order = manager
			.create_order(
				3,
				vec![NewOrderItem {
					product_id: 1,
					quantity: 1,
					price: "12.50".parse().unwrap(),
				}],
			)
			.await
			.unwrap();
		(PaymentHandler::new(manager.clone()), manager, order.id)
	}

	#[tokio::test]
	async fn test_paid_in_any_case_marks_order_paid() {
		for status in ["PAID", "paid", "Paid"] {
			let (handler, manager, order_id) = setup().await;
			handler.handle_confirmed(order_id, status).await.unwrap();
			assert_eq!(
				manager.get_order(order_id).await.unwrap().status,
				OrderStatus::Paid
			);
		}
	}

	#[tokio::test]
	async fn test_other_status_is_dropped() {
		let (handler, manager, order_id) = setup().await;
		handler.handle_confirmed(order_id, "FAILED").await.unwrap();
		assert_eq!(
			manager.get_order(order_id).await.unwrap().status,
			OrderStatus::Created
		);
	}

	#[tokio::test]
	async fn test_redelivery_is_harmless() {
		let (handler, manager, order_id) = setup().await;
		handler.handle_confirmed(order_id, "PAID").await.unwrap();
		handler.handle_confirmed(order_id, "PAID").await.unwrap();
		assert_eq!(
			manager.get_order(order_id).await.unwrap().status,
			OrderStatus::Paid
		);
	}

	#[tokio::test]
	async fn test_unknown_order_reports_not_found() {
		let (handler, _, _) = setup().await;
		assert!(matches!(
			handler.handle_confirmed(404, "PAID").await,
			Err(OrderError::NotFound { .. })
		));
	}
}
