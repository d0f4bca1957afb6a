//! Event bus for communication between the HTTP layer, the lifecycle manager
//! and background handlers.
//!
//! Order events go out on a tokio broadcast channel: every subscriber sees
//! every event published after it subscribed, and a slow subscriber may lag
//! and skip some. Payment confirmations have been acknowledged to the payment
//! system by the time they are queued, so they travel on their own bounded
//! queue that is never overwritten. A full queue is reported to the publisher
//! instead.

use order_types::{PaymentEvent, ServiceEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex, OwnedMutexGuard};

/// Reasons a payment event could not be queued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaymentQueueError {
	#[error("no payment processor is running")]
	NotRunning,
	#[error("payment queue is full")]
	Full,
}

/// Broadcast channel for [`ServiceEvent`]s plus the inbound payment queue.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<ServiceEvent>,
	payments: mpsc::Sender<PaymentEvent>,
	payment_queue: Arc<Mutex<mpsc::Receiver<PaymentEvent>>>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per slow subscriber and
	/// up to `capacity` unprocessed payment events.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		let (payments, payment_queue) = mpsc::channel(capacity);
		Self {
			sender,
			payments,
			payment_queue: Arc::new(Mutex::new(payment_queue)),
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Fails only when nobody is subscribed; callers that do not care use `.ok()`.
	pub fn publish(
		&self,
		event: ServiceEvent,
	) -> Result<(), broadcast::error::SendError<ServiceEvent>> {
		self.sender.send(event).map(|_| ())
	}

	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}

	/// Queues a payment event for the payment processor.
	///
	/// Refused while no processor holds the queue, or when it is full.
	pub fn publish_payment(&self, event: PaymentEvent) -> Result<(), PaymentQueueError> {
		if !self.payment_processor_running() {
			return Err(PaymentQueueError::NotRunning);
		}
		self.payments.try_send(event).map_err(|e| match e {
			mpsc::error::TrySendError::Full(_) => PaymentQueueError::Full,
			mpsc::error::TrySendError::Closed(_) => PaymentQueueError::NotRunning,
		})
	}

	/// Takes exclusive ownership of the payment queue until the guard drops.
	///
	/// Waits while another processor holds it. Events left in the queue when
	/// the guard drops are delivered to the next claimant.
	pub async fn claim_payments(&self) -> OwnedMutexGuard<mpsc::Receiver<PaymentEvent>> {
		self.payment_queue.clone().lock_owned().await
	}

	pub fn payment_processor_running(&self) -> bool {
		self.payment_queue.try_lock().is_err()
	}
}
