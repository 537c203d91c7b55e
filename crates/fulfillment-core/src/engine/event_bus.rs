//! Event bus for in-process communication between fulfillment components.
//!
//! A thin wrapper around a tokio broadcast channel. Publishing never blocks;
//! slow subscribers observe `RecvError::Lagged` and must resynchronize from
//! storage.

use fulfillment_types::FulfillmentEvent;
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast bus carrying [`FulfillmentEvent`]s.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<FulfillmentEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event to all current subscribers.
	///
	/// Having no subscribers is not an error.
	pub fn publish(&self, event: FulfillmentEvent) {
		if let Err(e) = self.sender.send(event) {
			tracing::trace!("Event dropped, no subscribers: {:?}", e.0);
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<FulfillmentEvent> {
		self.sender.subscribe()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}
