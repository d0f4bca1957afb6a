//! Handlers for the `/api/orders` routes.
//!
//! Each handler translates the request into one lifecycle operation and the
//! outcome into an order projection or an [`APIError`].

use super::{api_error, Caller};
use crate::server::AppState;
use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::Json,
};
use order_core::OrderManager;
use order_types::{
	APIError, CreateOrderQuery, ItemId, NewOrderItem, OrderId, OrderItemResponse, OrderResponse,
	OrderStatus, OwnerId, PaymentRequest, RefundRequest, StatusUpdateRequest,
};
use serde_json::{json, Value};

fn parse_status(raw: &str) -> Result<OrderStatus, APIError> {
	raw.parse::<OrderStatus>()
		.map_err(|e| APIError::BadRequest {
			error_type: "INVALID_STATUS".to_string(),
			message: e.to_string(),
		})
}

/// Lets admins through; everybody else must own the order.
///
/// A non-admin asking about a missing order is refused like any other
/// non-owner.
async fn authorize_owner(
	manager: &OrderManager,
	order_id: OrderId,
	caller: Caller,
) -> Result<(), APIError> {
	if caller.is_admin {
		return Ok(());
	}
	if manager
		.is_order_owned_by_user(order_id, caller.user_id)
		.await
		.map_err(api_error)?
	{
		Ok(())
	} else {
		tracing::warn!(order_id, user_id = caller.user_id, "Caller does not own order");
		Err(APIError::Forbidden {
			message: format!("Order {} does not belong to the caller", order_id),
		})
	}
}

/// Handles POST /api/orders?userId={id}.
pub async fn create_order(
	State(state): State<AppState>,
	Query(query): Query<CreateOrderQuery>,
	Json(items): Json<Vec<NewOrderItem>>,
) -> Result<Json<OrderResponse>, APIError> {
	let order = state
		.engine
		.manager()
		.create_order(query.user_id, items)
		.await
		.map_err(api_error)?;
	Ok(Json(OrderResponse::from(&order)))
}

/// Handles GET /api/orders/{id}.
pub async fn get_order(
	State(state): State<AppState>,
	Path(order_id): Path<OrderId>,
) -> Result<Json<OrderResponse>, APIError> {
	let order = state
		.engine
		.manager()
		.get_order(order_id)
		.await
		.map_err(api_error)?;
	Ok(Json(OrderResponse::from(&order)))
}

/// Handles GET /api/orders/user/{userId}.
pub async fn list_by_owner(
	State(state): State<AppState>,
	Path(user_id): Path<OwnerId>,
) -> Result<Json<Vec<OrderResponse>>, APIError> {
	let orders = state
		.engine
		.manager()
		.list_by_owner(user_id)
		.await
		.map_err(api_error)?;
	Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// Handles GET /api/orders/status/{status}.
pub async fn list_by_status(
	State(state): State<AppState>,
	Path(status): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, APIError> {
	let status = parse_status(&status)?;
	let orders = state
		.engine
		.manager()
		.list_by_status(status)
		.await
		.map_err(api_error)?;
	Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// Handles PATCH /api/orders/{id}/cancel.
pub async fn cancel_order(
	State(state): State<AppState>,
	Path(order_id): Path<OrderId>,
	caller: Caller,
) -> Result<StatusCode, APIError> {
	let manager = state.engine.manager();
	authorize_owner(manager, order_id, caller).await?;
	manager.cancel_order(order_id).await.map_err(api_error)?;
	Ok(StatusCode::NO_CONTENT)
}

/// Handles PATCH /api/orders/{id}/status.
pub async fn update_status(
	State(state): State<AppState>,
	Path(order_id): Path<OrderId>,
	Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<OrderResponse>, APIError> {
	let status = parse_status(&request.status)?;
	let order = state
		.engine
		.manager()
		.transition(order_id, status)
		.await
		.map_err(api_error)?;
	Ok(Json(OrderResponse::from(&order)))
}

/// Handles POST /api/orders/{id}/pay.
pub async fn pay(
	State(state): State<AppState>,
	Path(order_id): Path<OrderId>,
	Json(request): Json<PaymentRequest>,
) -> Result<Json<OrderResponse>, APIError> {
	if request.order_id.is_some_and(|body_id| body_id != order_id) {
		tracing::debug!(order_id, body_order_id = ?request.order_id, "Ignoring order id in payment body");
	}
	let order = state
		.engine
		.manager()
		.process_payment(order_id, request.amount, request.payment_method.as_deref())
		.await
		.map_err(api_error)?;
	Ok(Json(OrderResponse::from(&order)))
}

/// Handles POST /api/orders/{id}/refund.
pub async fn refund(
	State(state): State<AppState>,
	Path(order_id): Path<OrderId>,
	caller: Caller,
	Json(request): Json<RefundRequest>,
) -> Result<Json<Value>, APIError> {
	let manager = state.engine.manager();
	authorize_owner(manager, order_id, caller).await?;
	manager
		.process_refund(order_id, request.refund_amount, request.reason)
		.await
		.map_err(api_error)?;
	Ok(Json(json!({
		"orderId": order_id,
		"refundAmount": request.refund_amount,
		"message": "Refund request accepted",
	})))
}

/// Handles GET /api/orders/{id}/items.
pub async fn get_items(
	State(state): State<AppState>,
	Path(order_id): Path<OrderId>,
) -> Result<Json<Vec<OrderItemResponse>>, APIError> {
	let items = state
		.engine
		.manager()
		.get_order_items(order_id)
		.await
		.map_err(api_error)?;
	Ok(Json(items.iter().map(OrderItemResponse::from).collect()))
}

/// Handles DELETE /api/orders/{id}/items/{itemId}.
pub async fn delete_item(
	State(state): State<AppState>,
	Path((order_id, item_id)): Path<(OrderId, ItemId)>,
) -> Result<StatusCode, APIError> {
	state
		.engine
		.manager()
		.remove_order_item(order_id, item_id)
		.await
		.map_err(api_error)?;
	Ok(StatusCode::NO_CONTENT)
}
