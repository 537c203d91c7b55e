//! Refund result type.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the refund service reported for a partial-refund request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundOutcome {
	pub refunded: bool,
	pub refund_amount: Decimal,
}

impl RefundOutcome {
	/// Outcome used when no refund was issued.
	pub fn none() -> Self {
		Self {
			refunded: false,
			refund_amount: Decimal::ZERO,
		}
	}
}
