//! Customer notification module for the fulfillment system.
//!
//! Side effects reach customers through a [`NotificationInterface`]
//! implementation selected by configuration. The [`NotificationService`]
//! bounds every call with its own timeout so a slow transport can never hold
//! up the caller longer than configured.

use async_trait::async_trait;
use fulfillment_types::{truncate_id, ConfigSchema, Notification};
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod log;
	pub mod webhook;
}

/// Errors that can occur while sending a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
	/// The transport could not be reached.
	#[error("Network error: {0}")]
	Network(String),
	/// The transport answered but refused the notification.
	#[error("Delivery rejected: {0}")]
	Rejected(String),
	/// The call did not finish within the configured timeout.
	#[error("Notification timed out after {0:?}")]
	Timeout(Duration),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait implemented by every notification transport.
#[async_trait]
pub trait NotificationInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Delivers one notification to its recipient address.
	async fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Factory signature every notification implementation provides.
pub type NotificationFactory =
	fn(&toml::Value) -> Result<Box<dyn NotificationInterface>, NotificationError>;

/// Returns every built-in notification implementation as `(name, factory)`.
pub fn get_all_implementations() -> Vec<(&'static str, NotificationFactory)> {
	use fulfillment_types::ImplementationRegistry;
	use implementations::{log, webhook};

	vec![
		(log::Registry::NAME, log::Registry::factory()),
		(webhook::Registry::NAME, webhook::Registry::factory()),
	]
}

/// Sends notifications through the configured transport.
pub struct NotificationService {
	backend: Box<dyn NotificationInterface>,
	timeout: Duration,
}

impl NotificationService {
	pub fn new(backend: Box<dyn NotificationInterface>, timeout: Duration) -> Self {
		Self { backend, timeout }
	}

	/// Sends `notification`, failing with [`NotificationError::Timeout`] when
	/// the transport takes longer than the service timeout.
	pub async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
		tracing::debug!(
			order_id = %truncate_id(&notification.order_id),
			notification_type = %notification.notification_type(),
			"Sending notification"
		);
		match tokio::time::timeout(self.timeout, self.backend.notify(notification)).await {
			Ok(result) => result,
			Err(_) => Err(NotificationError::Timeout(self.timeout)),
		}
	}
}
