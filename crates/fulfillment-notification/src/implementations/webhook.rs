//! Notification transport that posts JSON to an HTTP endpoint.
//!
//! The endpoint receives `{ orderId, recipient, type, payload }` and is
//! expected to answer with a 2xx status once it has accepted the message.

use crate::{NotificationError, NotificationFactory, NotificationInterface};
use async_trait::async_trait;
use fulfillment_types::{
	http_url, ConfigSchema, Field, FieldType, ImplementationRegistry, Notification, Schema,
	ValidationError,
};
use serde::Serialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

/// Request body sent to the webhook.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookRequest<'a> {
	order_id: &'a str,
	recipient: &'a str,
	#[serde(rename = "type")]
	notification_type: &'static str,
	payload: &'a fulfillment_types::NotificationPayload,
}

impl<'a> From<&'a Notification> for WebhookRequest<'a> {
	fn from(notification: &'a Notification) -> Self {
		Self {
			order_id: &notification.order_id,
			recipient: &notification.recipient,
			notification_type: notification.notification_type().as_str(),
			payload: &notification.payload,
		}
	}
}

/// Posts notifications to a push gateway or messaging relay.
pub struct WebhookNotifier {
	client: reqwest::Client,
	url: String,
}

impl WebhookNotifier {
	pub fn new(url: String, timeout: Duration) -> Result<Self, NotificationError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| NotificationError::Configuration(e.to_string()))?;
		Ok(Self { client, url })
	}
}

#[async_trait]
impl NotificationInterface for WebhookNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(WebhookNotifierSchema)
	}

	async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
		let response = self
			.client
			.post(&self.url)
			.json(&WebhookRequest::from(notification))
			.send()
			.await
			.map_err(|e| NotificationError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(NotificationError::Rejected(format!(
				"HTTP {}: {}",
				status.as_u16(),
				body
			)));
		}
		Ok(())
	}
}

/// Configuration schema for the webhook transport.
pub struct WebhookNotifierSchema;

impl ConfigSchema for WebhookNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(http_url)],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(60),
				},
			)],
		)
		.validate(config)
	}
}

/// Creates the webhook transport.
///
/// Configuration parameters:
/// - `url`: endpoint receiving the notifications (required)
/// - `timeout_seconds`: HTTP timeout (default: 5)
pub fn create_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotificationInterface>, NotificationError> {
	WebhookNotifierSchema
		.validate(config)
		.map_err(|e| NotificationError::Configuration(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| NotificationError::Configuration("url is required".into()))?;
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|s| s as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(WebhookNotifier::new(
		url.to_string(),
		Duration::from_secs(timeout),
	)?))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "webhook";
	type Factory = NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_types::{NotificationPayload, UnavailableItem};
	use rust_decimal::Decimal;

	#[test]
	fn test_request_body_shape() {
		let notification = Notification::new(
			"order-9",
			"token-9",
			NotificationPayload::OrderAcceptedWithUnavailable {
				items: vec![UnavailableItem {
					position: 2,
					product_id: "p2".into(),
					name: "Bread".into(),
					quantity: 1,
					price: Decimal::new(200, 2),
				}],
				refund_amount: Decimal::ZERO,
				business_name: "Corner Butcher".into(),
			},
		);

		let body = serde_json::to_value(WebhookRequest::from(&notification)).unwrap();
		assert_eq!(body["orderId"], "order-9");
		assert_eq!(body["type"], "order_accepted_with_unavailable");
		assert_eq!(body["payload"]["items"][0]["position"], 2);
	}

	#[test]
	fn test_config_requires_http_url() {
		let config: toml::Value = toml::from_str("timeout_seconds = 3").unwrap();
		assert!(create_notifier(&config).is_err());

		let config: toml::Value = toml::from_str("url = \"push.example\"").unwrap();
		assert!(create_notifier(&config).is_err());

		let config: toml::Value = toml::from_str("url = \"https://push.example/notify\"").unwrap();
		assert!(create_notifier(&config).is_ok());
	}
}
