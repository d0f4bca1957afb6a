//! Builder pattern for constructing order engines.
//!
//! Creates the configured storage backends through their factory functions,
//! picks the primary one and wires store, manager and event bus together.

use crate::engine::{event_bus::EventBus, OrderEngine};
use crate::manager::OrderManager;
use order_config::Config;
use order_storage::{OrderStore, StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions needed to build an [`OrderEngine`], keyed by the
/// implementation name used in configuration.
pub struct OrderFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

/// Builder for constructing an OrderEngine with pluggable storage.
pub struct OrderEngineBuilder {
	config: Config,
}

impl OrderEngineBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine.
	///
	/// Every configured storage implementation with a known factory is
	/// created; a failing one aborts the build. The `primary` implementation
	/// backs the order store.
	pub fn build<SF>(self, factories: OrderFactories<SF>) -> Result<OrderEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			let Some(factory) = factories.storage_factories.get(name) else {
				tracing::warn!(
					component = "storage",
					implementation = %name,
					"No factory registered, skipping"
				);
				continue;
			};

			match factory(config) {
				Ok(implementation) => {
					let is_primary = &self.config.storage.primary == name;
					tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					storage_impls.insert(name.clone(), implementation);
				},
				Err(e) => {
					tracing::error!(
						component = "storage",
						implementation = %name,
						error = %e,
						"Failed to create storage implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create storage implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		if storage_impls.is_empty() {
			return Err(BuilderError::Config(
				"No valid storage implementations available".into(),
			));
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary storage '{}' is not available",
				primary_storage
			))
		})?;

		let storage = Arc::new(StorageService::new(storage_backend));
		let store = Arc::new(OrderStore::new(storage));
		let event_bus = EventBus::new(self.config.events.channel_capacity);
		let manager = Arc::new(OrderManager::new(
			store,
			event_bus.clone(),
			self.config.service.store_timeout(),
		));

		Ok(OrderEngine::new(self.config, manager, event_bus))
	}
}
