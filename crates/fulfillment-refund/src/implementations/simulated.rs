//! Refund provider that approves every request without contacting anyone.
//!
//! Stands in for a payment provider during development and in tests.

use crate::{RefundError, RefundFactory, RefundInterface};
use async_trait::async_trait;
use fulfillment_types::{
	shortfall_amount, truncate_id, ConfigSchema, ImplementationRegistry, RefundOutcome, Schema,
	UnavailableItem, ValidationError,
};
use rust_decimal::Decimal;

/// Always refunds the full shortfall amount.
#[derive(Debug, Default)]
pub struct SimulatedRefunds;

#[async_trait]
impl RefundInterface for SimulatedRefunds {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedRefundsSchema)
	}

	async fn request_partial_refund(
		&self,
		order_id: &str,
		items: &[UnavailableItem],
	) -> Result<RefundOutcome, RefundError> {
		let amount = shortfall_amount(items);
		if amount <= Decimal::ZERO {
			return Ok(RefundOutcome::none());
		}

		tracing::info!(
			order_id = %truncate_id(order_id),
			amount = %amount,
			"Simulated partial refund"
		);
		Ok(RefundOutcome {
			refunded: true,
			refund_amount: amount,
		})
	}
}

/// The simulated provider takes no settings.
pub struct SimulatedRefundsSchema;

impl ConfigSchema for SimulatedRefundsSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_refunds(config: &toml::Value) -> Result<Box<dyn RefundInterface>, RefundError> {
	SimulatedRefundsSchema
		.validate(config)
		.map_err(|e| RefundError::Configuration(e.to_string()))?;
	Ok(Box::new(SimulatedRefunds))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "simulated";
	type Factory = RefundFactory;

	fn factory() -> Self::Factory {
		create_refunds
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn unavailable(position: usize, quantity: u32, price: Decimal) -> UnavailableItem {
		UnavailableItem {
			position,
			product_id: String::new(),
			name: format!("item {}", position),
			quantity,
			price,
		}
	}

	#[tokio::test]
	async fn test_refunds_full_shortfall() {
		let items = vec![
			unavailable(1, 2, Decimal::new(950, 2)),
			unavailable(3, 1, Decimal::new(200, 2)),
		];
		let outcome = SimulatedRefunds
			.request_partial_refund("order-1", &items)
			.await
			.unwrap();
		assert!(outcome.refunded);
		assert_eq!(outcome.refund_amount, Decimal::new(2100, 2));
	}

	#[tokio::test]
	async fn test_nothing_to_refund() {
		let outcome = SimulatedRefunds
			.request_partial_refund("order-1", &[])
			.await
			.unwrap();
		assert_eq!(outcome, RefundOutcome::none());
	}
}
