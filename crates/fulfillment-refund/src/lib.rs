//! Partial refund module for the fulfillment system.
//!
//! When an order is accepted with unavailable items, the customer is owed the
//! value of those items. This crate holds the seam to the payment provider
//! ([`RefundInterface`]) and the [`RefundService`] that decides which orders
//! qualify (card-equivalent payment methods only) and bounds each call with a
//! timeout.

use async_trait::async_trait;
use fulfillment_types::{truncate_id, ConfigSchema, RefundOutcome, UnavailableItem};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod simulated;
	pub mod webhook;
}

/// Errors that can occur while requesting a refund.
#[derive(Debug, Error)]
pub enum RefundError {
	#[error("Network error: {0}")]
	Network(String),
	/// The payment provider declined the refund.
	#[error("Refund rejected: {0}")]
	Rejected(String),
	/// The provider answered with something that is not a refund result.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	#[error("Refund request timed out after {0:?}")]
	Timeout(Duration),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait implemented by every refund provider.
#[async_trait]
pub trait RefundInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Requests a refund of `Σ price × quantity` over `items` for the order.
	async fn request_partial_refund(
		&self,
		order_id: &str,
		items: &[UnavailableItem],
	) -> Result<RefundOutcome, RefundError>;
}

/// Factory signature every refund implementation provides.
pub type RefundFactory = fn(&toml::Value) -> Result<Box<dyn RefundInterface>, RefundError>;

/// Returns every built-in refund implementation as `(name, factory)`.
pub fn get_all_implementations() -> Vec<(&'static str, RefundFactory)> {
	use fulfillment_types::ImplementationRegistry;
	use implementations::{simulated, webhook};

	vec![
		(simulated::Registry::NAME, simulated::Registry::factory()),
		(webhook::Registry::NAME, webhook::Registry::factory()),
	]
}

/// Normalizes a payment method token for comparison: lowercase, with spaces
/// and dashes folded to underscores.
fn normalize_method(method: &str) -> String {
	method
		.trim()
		.to_lowercase()
		.chars()
		.map(|c| if c == ' ' || c == '-' { '_' } else { c })
		.collect()
}

/// Requests partial refunds through the configured provider.
pub struct RefundService {
	backend: Box<dyn RefundInterface>,
	timeout: Duration,
	card_methods: HashSet<String>,
}

impl RefundService {
	pub fn new(backend: Box<dyn RefundInterface>, timeout: Duration, card_methods: &[String]) -> Self {
		Self {
			backend,
			timeout,
			card_methods: card_methods.iter().map(|m| normalize_method(m)).collect(),
		}
	}

	/// Whether an order paid with `payment_method` can be refunded.
	pub fn is_card_payment(&self, payment_method: &str) -> bool {
		self.card_methods.contains(&normalize_method(payment_method))
	}

	/// Requests the refund, failing with [`RefundError::Timeout`] when the
	/// provider takes longer than the service timeout.
	pub async fn request_partial_refund(
		&self,
		order_id: &str,
		items: &[UnavailableItem],
	) -> Result<RefundOutcome, RefundError> {
		tracing::debug!(
			order_id = %truncate_id(order_id),
			items = items.len(),
			"Requesting partial refund"
		);
		match tokio::time::timeout(
			self.timeout,
			self.backend.request_partial_refund(order_id, items),
		)
		.await
		{
			Ok(result) => result,
			Err(_) => Err(RefundError::Timeout(self.timeout)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::simulated::SimulatedRefunds;

	fn service(methods: &[&str]) -> RefundService {
		let methods: Vec<String> = methods.iter().map(|m| m.to_string()).collect();
		RefundService::new(
			Box::new(SimulatedRefunds::default()),
			Duration::from_secs(1),
			&methods,
		)
	}

	#[test]
	fn test_card_equivalence() {
		let service = service(&["card", "credit_card", "apple_pay"]);
		assert!(service.is_card_payment("Card"));
		assert!(service.is_card_payment("credit-card"));
		assert!(service.is_card_payment(" Apple Pay "));
		assert!(!service.is_card_payment("cash"));
		assert!(!service.is_card_payment(""));
	}
}
