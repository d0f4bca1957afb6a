//! HTTP handlers of the order API.

pub mod events;
pub mod orders;

use axum::{extract::FromRequestParts, http::request::Parts};
use order_core::{Entity, OrderError};
use order_types::{APIError, OwnerId};

/// Header carrying the authenticated user id, set by the gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's role. `admin` grants admin rights.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Identity of the caller as asserted by the upstream gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
	pub user_id: OwnerId,
	pub is_admin: bool,
}

impl<S> FromRequestParts<S> for Caller
where
	S: Send + Sync,
{
	type Rejection = APIError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let raw = parts
			.headers
			.get(USER_ID_HEADER)
			.ok_or_else(|| APIError::Unauthorized {
				message: "Missing caller identity".to_string(),
			})?;
		let user_id = raw
			.to_str()
			.ok()
			.and_then(|value| value.trim().parse::<OwnerId>().ok())
			.ok_or_else(|| APIError::Unauthorized {
				message: format!("Invalid {} header", USER_ID_HEADER),
			})?;

		let is_admin = parts
			.headers
			.get(USER_ROLE_HEADER)
			.and_then(|value| value.to_str().ok())
			.is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));

		Ok(Caller { user_id, is_admin })
	}
}

/// Maps a lifecycle error onto its HTTP representation.
pub fn api_error(err: OrderError) -> APIError {
	match err {
		OrderError::NotFound { entity, .. } => {
			let error_type = match entity {
				Entity::Order => "ORDER_NOT_FOUND",
				Entity::OrderItem => "ORDER_ITEM_NOT_FOUND",
			};
			APIError::NotFound {
				error_type: error_type.to_string(),
				message: err.to_string(),
			}
		},
		OrderError::Validation(_) => APIError::BadRequest {
			error_type: "VALIDATION_ERROR".to_string(),
			message: err.to_string(),
		},
		OrderError::InvalidTransition { .. } => APIError::BadRequest {
			error_type: "INVALID_TRANSITION".to_string(),
			message: err.to_string(),
		},
		OrderError::InvalidState { .. } => APIError::BadRequest {
			error_type: "INVALID_STATE".to_string(),
			message: err.to_string(),
		},
		OrderError::StoreUnavailable(_) => {
			tracing::error!(error = %err, "Order store unavailable");
			APIError::ServiceUnavailable {
				message: err.to_string(),
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::{Request, StatusCode};
	use order_types::OrderStatus;

	async fn caller_from(headers: &[(&str, &str)]) -> Result<Caller, APIError> {
		let mut builder = Request::builder().uri("/");
		for (name, value) in headers {
			builder = builder.header(*name, *value);
		}
		let (mut parts, _) = builder.body(()).unwrap().into_parts();
		Caller::from_request_parts(&mut parts, &()).await
	}

	#[tokio::test]
	async fn test_caller_from_headers() {
		let caller = caller_from(&[("x-user-id", "7"), ("x-user-role", "Admin")])
			.await
			.unwrap();
		assert_eq!(
			caller,
			Caller {
				user_id: 7,
				is_admin: true
			}
		);

		let caller = caller_from(&[("x-user-id", "8")]).await.unwrap();
		assert!(!caller.is_admin);
	}

	#[tokio::test]
	async fn test_missing_or_bad_identity_is_unauthorized() {
		let err = caller_from(&[]).await.unwrap_err();
		assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

		let err = caller_from(&[("x-user-id", "abc")]).await.unwrap_err();
		assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
	}

	#[test]
	fn test_error_mapping() {
		let cases = [
			(
				OrderError::NotFound {
					entity: Entity::Order,
					id: 1,
				},
				StatusCode::NOT_FOUND,
			),
			(
				OrderError::Validation("bad".into()),
				StatusCode::BAD_REQUEST,
			),
			(
				OrderError::InvalidTransition {
					from: OrderStatus::Shipped,
					to: OrderStatus::Canceled,
				},
				StatusCode::BAD_REQUEST,
			),
			(
				OrderError::InvalidState {
					status: OrderStatus::Paid,
					operation: "pay for",
				},
				StatusCode::BAD_REQUEST,
			),
			(
				OrderError::StoreUnavailable("timeout".into()),
				StatusCode::SERVICE_UNAVAILABLE,
			),
		];

		for (err, status) in cases {
			assert_eq!(api_error(err).status_code(), status);
		}
	}

	#[test]
	fn test_item_not_found_error_type() {
		let err = api_error(OrderError::NotFound {
			entity: Entity::OrderItem,
			id: 3,
		});
		assert_eq!(err.to_error_response().error, "ORDER_ITEM_NOT_FOUND");
		assert_eq!(err.to_error_response().message, "Order item 3 not found");
	}
}
