//! Lifecycle management for the order engine.

use super::{EngineError, OrderEngine};

impl OrderEngine {
	/// Performs any initialization required before running
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(
			service_id = %self.config.service.id,
			storage = %self.config.storage.primary,
			"Initializing order engine"
		);
		Ok(())
	}

	/// Asks a running [`run`](OrderEngine::run) loop to stop.
	///
	/// The request is remembered if the loop is not waiting yet.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down order engine");
		self.shutdown.notify_one();
		Ok(())
	}
}
