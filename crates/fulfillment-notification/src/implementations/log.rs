//! Notification transport that only writes a structured log line.
//!
//! Useful for development and for deployments where customer messaging is
//! handled elsewhere.

use crate::{NotificationError, NotificationFactory, NotificationInterface};
use async_trait::async_trait;
use fulfillment_types::{
	truncate_id, ConfigSchema, ImplementationRegistry, Notification, Schema, ValidationError,
};

/// Logs notifications instead of sending them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationInterface for LogNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogNotifierSchema)
	}

	async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
		let payload = serde_json::to_string(&notification.payload)
			.map_err(|e| NotificationError::Rejected(e.to_string()))?;
		tracing::info!(
			order_id = %truncate_id(&notification.order_id),
			recipient = %truncate_id(&notification.recipient),
			notification_type = %notification.notification_type(),
			payload = %payload,
			"Customer notification"
		);
		Ok(())
	}
}

/// The log transport takes no settings.
pub struct LogNotifierSchema;

impl ConfigSchema for LogNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotificationInterface>, NotificationError> {
	LogNotifierSchema
		.validate(config)
		.map_err(|e| NotificationError::Configuration(e.to_string()))?;
	Ok(Box::new(LogNotifier))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}
