//! Lifecycle management for the fulfillment engine.
//!
//! Startup hydrates the checklist mirror from storage and starts the live view
//! of the configured default window; shutdown stops every live view.

use super::{EngineError, FulfillmentEngine};
use crate::live_view::LiveViewAggregator;
use crate::state::TransitionError;

impl FulfillmentEngine {
	/// Performs any initialization required before serving requests.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(service = %self.config.service.id, "Initializing fulfillment engine");

		let orders = self.store.list().await.map_err(TransitionError::from)?;
		self.checklist.hydrate(&orders);

		let window = self.config.live_view.default_window;
		let view = LiveViewAggregator::spawn(self.store.clone(), &self.event_bus, window)
			.await
			.map_err(TransitionError::from)?;
		self.live_views.lock().await.insert(window, view);

		tracing::info!(orders = orders.len(), window = %window, "Fulfillment engine ready");
		Ok(())
	}

	/// Performs cleanup operations.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down fulfillment engine");

		let mut views = self.live_views.lock().await;
		for (_, view) in views.drain() {
			view.stop();
		}
		Ok(())
	}
}
