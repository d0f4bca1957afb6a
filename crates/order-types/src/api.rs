//! API types for the order service HTTP API.
//!
//! Request bodies, response projections and the structured error type that
//! maps failures onto HTTP status codes.

use crate::{ItemId, Order, OrderId, OrderItem, OrderStatus, OwnerId, ProductId};
use axum::{
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Query string of `POST /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderQuery {
	pub user_id: OwnerId,
}

/// Body of `POST /api/orders/{id}/pay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
	/// Order being paid for. Informational, the path id is authoritative.
	#[serde(default)]
	pub order_id: Option<OrderId>,
	/// Amount being paid.
	pub amount: Decimal,
	/// e.g. "Credit Card", "PayPal".
	#[serde(default)]
	pub payment_method: Option<String>,
}

/// Body of `POST /api/orders/{id}/refund`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
	pub refund_amount: Decimal,
	#[serde(default)]
	pub reason: Option<String>,
}

/// Body of `PATCH /api/orders/{id}/status`.
///
/// The status name is matched case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
	pub status: String,
}

/// Order projection returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
	pub order_id: OrderId,
	pub user_id: OwnerId,
	pub order_date: DateTime<Utc>,
	pub total_amount: Decimal,
	pub order_status: OrderStatus,
	pub order_items: Vec<OrderItemResponse>,
}

/// Item projection returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
	pub order_item_id: ItemId,
	pub product_id: ProductId,
	pub quantity: u32,
	pub price: Decimal,
}

impl From<&OrderItem> for OrderItemResponse {
	fn from(item: &OrderItem) -> Self {
		Self {
			order_item_id: item.id,
			product_id: item.product_id,
			quantity: item.quantity,
			price: item.price,
		}
	}
}

impl From<&Order> for OrderResponse {
	fn from(order: &Order) -> Self {
		Self {
			order_id: order.id,
			user_id: order.owner_id,
			order_date: order.created_at,
			total_amount: order.total_amount,
			order_status: order.status,
			order_items: order.items.iter().map(OrderItemResponse::from).collect(),
		}
	}
}

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<serde_json::Value>,
	/// When the error was produced
	pub timestamp: DateTime<Utc>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed input or a rejected business rule (400)
	BadRequest { error_type: String, message: String },
	/// No caller identity (401)
	Unauthorized { message: String },
	/// Caller is neither owner nor admin (403)
	Forbidden { message: String },
	/// Entity absent (404)
	NotFound { error_type: String, message: String },
	/// Persistence layer unavailable (503)
	ServiceUnavailable { message: String },
	/// Anything else (500)
	InternalServerError { message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> StatusCode {
		match self {
			APIError::BadRequest { .. } => StatusCode::BAD_REQUEST,
			APIError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
			APIError::Forbidden { .. } => StatusCode::FORBIDDEN,
			APIError::NotFound { .. } => StatusCode::NOT_FOUND,
			APIError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
			APIError::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message) = match self {
			APIError::BadRequest {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			} => (error_type.clone(), message.clone()),
			APIError::Unauthorized { message } => ("UNAUTHORIZED".to_string(), message.clone()),
			APIError::Forbidden { message } => ("FORBIDDEN".to_string(), message.clone()),
			APIError::ServiceUnavailable { message } => {
				("STORE_UNAVAILABLE".to_string(), message.clone())
			},
			APIError::InternalServerError { message } => {
				("INTERNAL_ERROR".to_string(), message.clone())
			},
		};

		ErrorResponse {
			error,
			message,
			details: None,
			timestamp: Utc::now(),
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::Unauthorized { message } => write!(f, "Unauthorized: {}", message),
			APIError::Forbidden { message } => write!(f, "Forbidden: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::ServiceUnavailable { message } => {
				write!(f, "Service Unavailable: {}", message)
			},
			APIError::InternalServerError { message } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl IntoResponse for APIError {
	fn into_response(self) -> Response {
		(self.status_code(), Json(self.to_error_response())).into_response()
	}
}
