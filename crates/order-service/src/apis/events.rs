//! Inbound events from external systems.

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use order_types::{APIError, PaymentConfirmedEvent};

/// Handles POST /api/events/payment-confirmed.
///
/// The event is queued for the engine and processed asynchronously, so
/// acceptance says nothing about the outcome. A queued event is never
/// dropped; when it cannot be queued the payment system gets a 503 and is
/// expected to retry.
pub async fn payment_confirmed(
	State(state): State<AppState>,
	Json(event): Json<PaymentConfirmedEvent>,
) -> Result<StatusCode, APIError> {
	let order_id = event.order_id;
	state
		.engine
		.event_bus()
		.publish_payment(event.into())
		.map_err(|e| {
			tracing::warn!(order_id, error = %e, "Refusing payment confirmation");
			APIError::ServiceUnavailable {
				message: format!("Payment confirmation not queued: {}", e),
			}
		})?;

	tracing::debug!(order_id, "Payment confirmation queued");
	Ok(StatusCode::ACCEPTED)
}
