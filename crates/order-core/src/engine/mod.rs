//! Core engine that drives background event processing.
//!
//! The engine owns the lifecycle manager and the event bus. Its run loop
//! drains the payment queue into the payment handler and logs the order
//! events published by the manager.

pub mod event_bus;
pub mod lifecycle;

use crate::handlers::PaymentHandler;
use crate::manager::OrderManager;
use order_config::Config;
use order_types::{OrderEvent, PaymentEvent, ServiceEvent};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, Semaphore};

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
	#[error("Handler error: {0}")]
	Handler(String),
}

/// Main engine of the order service.
#[derive(Clone)]
pub struct OrderEngine {
	pub(crate) config: Config,
	pub(crate) manager: Arc<OrderManager>,
	pub(crate) event_bus: event_bus::EventBus,
	pub(crate) payment_handler: Arc<PaymentHandler>,
	pub(crate) shutdown: Arc<Notify>,
}

impl OrderEngine {
	pub fn new(config: Config, manager: Arc<OrderManager>, event_bus: event_bus::EventBus) -> Self {
		let payment_handler = Arc::new(PaymentHandler::new(manager.clone()));

		Self {
			config,
			manager,
			event_bus,
			payment_handler,
			shutdown: Arc::new(Notify::new()),
		}
	}

	/// Main event loop.
	///
	/// Runs until Ctrl+C is received or [`shutdown`](Self::shutdown) is called,
	/// then waits for in-flight handlers to finish.
	pub async fn run(&self) -> Result<(), EngineError> {
		let mut payments = self.event_bus.claim_payments().await;
		let mut event_receiver = self.event_bus.subscribe();

		let max_handlers = self.config.events.max_concurrent_handlers;
		let permits = u32::try_from(max_handlers).map_err(|_| {
			EngineError::Config(format!("max_concurrent_handlers too large: {}", max_handlers))
		})?;
		let semaphore = Arc::new(Semaphore::new(max_handlers));

		tracing::info!(service_id = %self.config.service.id, "Order engine started");

		loop {
			tokio::select! {
				Some(PaymentEvent::Confirmed { order_id, status }) = payments.recv() => {
					self.spawn_handler(&semaphore, move |engine| async move {
						engine
							.payment_handler
							.handle_confirmed(order_id, &status)
							.await
							.map_err(|e| EngineError::Handler(format!(
								"Failed to apply payment confirmation for order {}: {}",
								order_id, e
							)))
					})
					.await;
				}

				event = event_receiver.recv() => {
					match event {
						Ok(ServiceEvent::Order(event)) => log_order_event(&event),
						Err(RecvError::Lagged(skipped)) => {
							tracing::warn!(skipped, "Event receiver lagged, events were dropped");
						}
						Err(RecvError::Closed) => break,
					}
				}

				_ = self.shutdown.notified() => {
					break;
				}

				_ = tokio::signal::ctrl_c() => {
					break;
				}
			}
		}

		drop(payments);

		// Wait for running handlers
		let _drained = semaphore
			.acquire_many(permits)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;

		tracing::info!("Order engine stopped");
		Ok(())
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns the lifecycle manager.
	pub fn manager(&self) -> &Arc<OrderManager> {
		&self.manager
	}

	/// Spawns a handler task once a semaphore permit is available.
	///
	/// Errors returned by the handler are logged and dropped.
	async fn spawn_handler<F, Fut>(&self, semaphore: &Arc<Semaphore>, handler: F)
	where
		F: FnOnce(OrderEngine) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), EngineError>> + Send,
	{
		let engine = self.clone();
		match semaphore.clone().acquire_owned().await {
			Ok(permit) => {
				tokio::spawn(async move {
					let _permit = permit;
					if let Err(e) = handler(engine).await {
						tracing::error!("Handler error: {}", e);
					}
				});
			},
			Err(e) => {
				tracing::error!("Failed to acquire semaphore permit: {}", e);
			},
		}
	}
}

fn log_order_event(event: &OrderEvent) {
	match event {
		OrderEvent::Created {
			order_id,
			owner_id,
			total_amount,
		} => {
			tracing::debug!(order_id, owner_id, total = %total_amount, "Order created event");
		},
		OrderEvent::StatusChanged { order_id, from, to } => {
			tracing::debug!(order_id, from = %from, to = %to, "Order status changed event");
		},
		OrderEvent::ItemRemoved { order_id, item_id } => {
			tracing::debug!(order_id, item_id, "Order item removed event");
		},
		OrderEvent::RefundRequested {
			order_id,
			amount,
			reason,
		} => {
			tracing::info!(
				order_id,
				amount = %amount,
				reason = reason.as_deref().unwrap_or(""),
				"Refund requested event"
			);
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use order_config::builders::ConfigBuilder;
	use order_storage::{implementations::memory::MemoryStorage, OrderStore, StorageService};
	use order_types::{NewOrderItem, OrderStatus, PaymentConfirmedEvent};
	use std::time::Duration;

	fn engine() -> OrderEngine {
		let config = ConfigBuilder::new().build();
		let store = Arc::new(OrderStore::new(Arc::new(StorageService::new(Box::new(
			MemoryStorage::new(),
		)))));
		let event_bus = event_bus::EventBus::new(config.events.channel_capacity);
		let manager = Arc::new(OrderManager::new(
			store,
			event_bus.clone(),
			config.service.store_timeout(),
		));
		OrderEngine::new(config, manager, event_bus)
	}

	async fn wait_for_status(engine: &OrderEngine, order_id: u64, status: OrderStatus) -> bool {
		for _ in 0..100 {
			if engine.manager().get_order(order_id).await.unwrap().status == status {
				return true;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		false
	}

	#[tokio::test]
	async fn test_payment_event_marks_order_paid() {
		let engine = engine();
		let order = engine
			.manager()
			.create_order(
				1,
				vec![NewOrderItem {
					product_id: 1,
					quantity: 1,
					price: "4.00".parse().unwrap(),
				}],
			)
			.await
			.unwrap();

		let runner = engine.clone();
		let handle = tokio::spawn(async move { runner.run().await });
		while !engine.event_bus().payment_processor_running() {
			tokio::task::yield_now().await;
		}

		engine
			.event_bus()
			.publish_payment(
				PaymentConfirmedEvent {
					order_id: order.id,
					status: "paid".into(),
				}
				.into(),
			)
			.unwrap();

		assert!(wait_for_status(&engine, order.id, OrderStatus::Paid).await);

		engine.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_failed_handler_does_not_stop_engine() {
		let engine = engine();
		let runner = engine.clone();
		let handle = tokio::spawn(async move { runner.run().await });
		while !engine.event_bus().payment_processor_running() {
			tokio::task::yield_now().await;
		}

		engine
			.event_bus()
			.publish_payment(
				PaymentConfirmedEvent {
					order_id: 404,
					status: "PAID".into(),
				}
				.into(),
			)
			.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(!handle.is_finished());

		engine.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}
}
