//! Registry of the storage implementations compiled into the service.
//!
//! Configuration names implementations by string; this module resolves those
//! names to factory functions and assembles the engine from them.

use order_config::Config;
use order_core::{OrderEngine, OrderEngineBuilder, OrderFactories};
use order_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Factories known to the service, keyed by implementation name.
#[derive(Default)]
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a storage implementation
	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the global registry, filling it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();
		for (name, factory) in order_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}
		registry
	})
}

/// Picks the factory for every implementation named in `implementations`.
///
/// An unknown name is an error listing what is available.
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Builds the order engine from configuration using the global registry.
pub fn build_engine_from_config(config: Config) -> Result<OrderEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();
	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");

	let engine = OrderEngineBuilder::new(config).build(OrderFactories { storage_factories })?;
	Ok(engine)
}
