//! HTTP server for the order API.
//!
//! Builds the axum router over the engine's lifecycle manager and serves it
//! on the configured address.

use crate::apis::{events, orders};
use axum::{
	extract::DefaultBodyLimit,
	http::{HeaderName, HeaderValue, Method},
	response::Json,
	routing::{delete, get, patch, post},
	Router,
};
use order_config::{ApiConfig, CorsConfig};
use order_core::OrderEngine;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Engine whose manager and event bus serve the requests.
	pub engine: Arc<OrderEngine>,
}

/// Routes under `/api`, without middleware.
pub fn build_router(state: AppState) -> Router {
	let api = Router::new()
		.route("/orders", post(orders::create_order))
		.route("/orders/{id}", get(orders::get_order))
		.route("/orders/user/{user_id}", get(orders::list_by_owner))
		.route("/orders/status/{status}", get(orders::list_by_status))
		.route("/orders/{id}/cancel", patch(orders::cancel_order))
		.route("/orders/{id}/status", patch(orders::update_status))
		.route("/orders/{id}/pay", post(orders::pay))
		.route("/orders/{id}/refund", post(orders::refund))
		.route("/orders/{id}/items", get(orders::get_items))
		.route("/orders/{id}/items/{item_id}", delete(orders::delete_item))
		.route("/events/payment-confirmed", post(events::payment_confirmed));

	Router::new()
		.route("/health", get(health))
		.nest("/api", api)
		.with_state(state)
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<OrderEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = build_router(AppState { engine }).layer(
		ServiceBuilder::new()
			.layer(TraceLayer::new_for_http())
			.layer(cors_layer(api_config.cors.as_ref()))
			.layer(TimeoutLayer::new(Duration::from_secs(api_config.timeout_seconds)))
			.layer(DefaultBodyLimit::max(api_config.max_request_size)),
	);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Order API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

async fn health() -> Json<Value> {
	Json(json!({ "status": "ok" }))
}

/// Permissive CORS unless origins, methods or headers are configured.
///
/// Entries that do not parse are skipped with a warning.
fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};

	let origins: Vec<HeaderValue> = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| match origin.parse() {
			Ok(value) => Some(value),
			Err(_) => {
				tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
				None
			},
		})
		.collect();
	let methods: Vec<Method> = cors
		.allowed_methods
		.iter()
		.filter_map(|method| method.parse().ok())
		.collect();
	let headers: Vec<HeaderName> = cors
		.allowed_headers
		.iter()
		.filter_map(|header| header.parse().ok())
		.collect();

	CorsLayer::new()
		.allow_origin(origins)
		.allow_methods(methods)
		.allow_headers(headers)
}
