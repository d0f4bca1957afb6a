//! Configuration builder for creating test and development configurations.

use crate::{ApiConfig, Config, EventsConfig, ServiceConfig, StorageConfig};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
///
/// The default configuration uses the in-memory store and no HTTP server.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	store_timeout_ms: u64,
	storage_primary: String,
	storage_implementations: HashMap<String, toml::Value>,
	channel_capacity: usize,
	max_concurrent_handlers: usize,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		let mut storage_implementations = HashMap::new();
		storage_implementations.insert(
			"memory".to_string(),
			toml::Value::Table(toml::Table::new()),
		);

		Self {
			service_id: "test-order-service".to_string(),
			store_timeout_ms: 5000,
			storage_primary: "memory".to_string(),
			storage_implementations,
			channel_capacity: 64,
			max_concurrent_handlers: 8,
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Sets the per-call store deadline.
	pub fn store_timeout_ms(mut self, timeout: u64) -> Self {
		self.store_timeout_ms = timeout;
		self
	}

	pub fn storage_primary(mut self, primary: impl Into<String>) -> Self {
		self.storage_primary = primary.into();
		self
	}

	/// Adds or replaces a storage implementation table.
	pub fn storage_implementation(mut self, name: impl Into<String>, config: toml::Value) -> Self {
		self.storage_implementations.insert(name.into(), config);
		self
	}

	pub fn channel_capacity(mut self, capacity: usize) -> Self {
		self.channel_capacity = capacity;
		self
	}

	pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
		self.max_concurrent_handlers = limit;
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
				store_timeout_ms: self.store_timeout_ms,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: self.storage_implementations,
			},
			events: EventsConfig {
				channel_capacity: self.channel_capacity,
				max_concurrent_handlers: self.max_concurrent_handlers,
			},
			api: self.api,
		}
	}
}
