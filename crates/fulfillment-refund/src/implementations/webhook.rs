//! Refund provider backed by an HTTP payments endpoint.
//!
//! Sends `{ orderId, items, amount }` and expects
//! `{ refunded: bool, refundAmount: number|string }` back.

use crate::{RefundError, RefundFactory, RefundInterface};
use async_trait::async_trait;
use fulfillment_types::{
	http_url, shortfall_amount, ConfigSchema, Field, FieldType, ImplementationRegistry,
	RefundOutcome, Schema, UnavailableItem, ValidationError,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundRequest<'a> {
	order_id: &'a str,
	items: &'a [UnavailableItem],
	amount: Decimal,
}

/// Forwards refund requests to the payments service.
pub struct WebhookRefunds {
	client: reqwest::Client,
	url: String,
}

impl WebhookRefunds {
	pub fn new(url: String, timeout: Duration) -> Result<Self, RefundError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| RefundError::Configuration(e.to_string()))?;
		Ok(Self { client, url })
	}
}

#[async_trait]
impl RefundInterface for WebhookRefunds {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(WebhookRefundsSchema)
	}

	async fn request_partial_refund(
		&self,
		order_id: &str,
		items: &[UnavailableItem],
	) -> Result<RefundOutcome, RefundError> {
		let request = RefundRequest {
			order_id,
			items,
			amount: shortfall_amount(items),
		};
		let response = self
			.client
			.post(&self.url)
			.json(&request)
			.send()
			.await
			.map_err(|e| RefundError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(RefundError::Rejected(format!(
				"HTTP {}: {}",
				status.as_u16(),
				body
			)));
		}

		response
			.json::<RefundOutcome>()
			.await
			.map_err(|e| RefundError::InvalidResponse(e.to_string()))
	}
}

/// Configuration schema for the webhook provider.
pub struct WebhookRefundsSchema;

impl ConfigSchema for WebhookRefundsSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(http_url)],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(120),
				},
			)],
		)
		.validate(config)
	}
}

/// Creates the webhook provider.
///
/// Configuration parameters:
/// - `url`: refund endpoint (required)
/// - `timeout_seconds`: HTTP timeout (default: 10)
pub fn create_refunds(config: &toml::Value) -> Result<Box<dyn RefundInterface>, RefundError> {
	WebhookRefundsSchema
		.validate(config)
		.map_err(|e| RefundError::Configuration(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| RefundError::Configuration("url is required".into()))?;
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|s| s as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(WebhookRefunds::new(
		url.to_string(),
		Duration::from_secs(timeout),
	)?))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "webhook";
	type Factory = RefundFactory;

	fn factory() -> Self::Factory {
		create_refunds
	}
}
