//! Canonical order model for the fulfillment system.
//!
//! Every stored order document, whatever historical field names it was written
//! with, is reconstructed into the [`Order`] shape defined here before any
//! other component looks at it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One unit of commerce between a customer and a business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	/// Opaque, stable identifier.
	pub id: String,
	/// Short human-facing code, derived from the id when the source has none.
	pub order_number: String,
	pub business_id: String,
	#[serde(default)]
	pub business_name: String,
	pub customer_id: String,
	#[serde(default)]
	pub customer_name: String,
	#[serde(default)]
	pub customer_phone: String,
	/// Line items in order of entry. Positions are referenced by the checklist
	/// and must never be reordered after creation.
	#[serde(default)]
	pub items: Vec<OrderItem>,
	pub subtotal: Decimal,
	pub delivery_fee: Decimal,
	/// Stored total. Never recomputed; refunds are tracked as side payments.
	pub total: Decimal,
	pub status: OrderStatus,
	#[serde(rename = "type")]
	pub order_type: OrderType,
	/// Creation timestamp (Unix seconds). Immutable.
	pub created_at: u64,
	/// Timestamp of the last committed write (Unix seconds).
	#[serde(default)]
	pub updated_at: u64,
	/// Payment method token as recorded by the ordering channel ("card", "cash", ...).
	#[serde(default)]
	pub payment_method: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payment_status: Option<PaymentStatus>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub table_number: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub waiter_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub table_session_id: Option<String>,
	/// Courier claim on a delivery order. Absent means the order is waiting for a courier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub courier: Option<CourierAssignment>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub served_by_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub served_by_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub served_at: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cancellation_reason: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cancelled_by: Option<String>,
	/// Items struck from the order at acceptance, with 1-based positions.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub unavailable_items: Vec<UnavailableItem>,
	/// Timestamp at which each status was first reached.
	#[serde(default)]
	pub status_history: BTreeMap<OrderStatus, u64>,
	/// Sparse item position (0-based) to "confirmed in stock".
	#[serde(default)]
	pub checked_items: BTreeMap<usize, bool>,
}

impl Order {
	/// Returns true for orders served at a table.
	pub fn is_dine_in(&self) -> bool {
		self.order_type == OrderType::DineIn
	}

	/// Records the first arrival at `status`. Later entries never overwrite it.
	///
	/// Returns true when a new entry was written.
	pub fn record_status_entry(&mut self, status: OrderStatus, at: u64) -> bool {
		if self.status_history.contains_key(&status) {
			return false;
		}
		self.status_history.insert(status, at);
		true
	}

	/// Removes any courier claim so the order re-enters the dispatch pool.
	pub fn clear_courier(&mut self) {
		self.courier = None;
	}
}

/// A single line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
	#[serde(default)]
	pub product_id: String,
	pub name: String,
	/// Always at least 1.
	pub quantity: u32,
	/// Unit price at the time of ordering.
	pub price: Decimal,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unit: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub modifiers: Vec<Modifier>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

impl OrderItem {
	/// Unit price times quantity, saturating at the decimal bounds.
	pub fn line_total(&self) -> Decimal {
		self.price.saturating_mul(Decimal::from(self.quantity))
	}
}

/// A selected option on an item, with its own price delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modifier {
	pub name: String,
	#[serde(default)]
	pub price_delta: Decimal,
}

/// An item that could not be fulfilled, recorded at acceptance time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableItem {
	/// 1-based position of the item within [`Order::items`].
	pub position: usize,
	#[serde(default)]
	pub product_id: String,
	pub name: String,
	pub quantity: u32,
	pub price: Decimal,
}

impl UnavailableItem {
	/// Builds the record for the item at 0-based `index`.
	pub fn from_item(index: usize, item: &OrderItem) -> Self {
		Self {
			position: index + 1,
			product_id: item.product_id.clone(),
			name: item.name.clone(),
			quantity: item.quantity,
			price: item.price,
		}
	}

	pub fn line_total(&self) -> Decimal {
		self.price.saturating_mul(Decimal::from(self.quantity))
	}
}

/// Saturating sum of a sequence of amounts.
pub fn sum_amounts(amounts: impl IntoIterator<Item = Decimal>) -> Decimal {
	amounts
		.into_iter()
		.fold(Decimal::ZERO, |acc, amount| acc.saturating_add(amount))
}

/// Sum of `price * quantity` over a shortfall set.
pub fn shortfall_amount(items: &[UnavailableItem]) -> Decimal {
	sum_amounts(items.iter().map(UnavailableItem::line_total))
}

/// The courier currently holding a delivery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierAssignment {
	pub courier_id: String,
	#[serde(default)]
	pub courier_name: String,
	#[serde(default)]
	pub courier_phone: String,
	#[serde(default)]
	pub claimed_at: u64,
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
	Pending,
	Accepted,
	Preparing,
	Ready,
	Served,
	OnTheWay,
	Delivered,
	Completed,
	Cancelled,
}

impl OrderStatus {
	pub const ALL: [OrderStatus; 9] = [
		OrderStatus::Pending,
		OrderStatus::Accepted,
		OrderStatus::Preparing,
		OrderStatus::Ready,
		OrderStatus::Served,
		OrderStatus::OnTheWay,
		OrderStatus::Delivered,
		OrderStatus::Completed,
		OrderStatus::Cancelled,
	];

	/// Wire token of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Accepted => "accepted",
			OrderStatus::Preparing => "preparing",
			OrderStatus::Ready => "ready",
			OrderStatus::Served => "served",
			OrderStatus::OnTheWay => "onTheWay",
			OrderStatus::Delivered => "delivered",
			OrderStatus::Completed => "completed",
			OrderStatus::Cancelled => "cancelled",
		}
	}

	/// Successful terminal states. `served` and `delivered` are equivalent.
	pub fn is_done(&self) -> bool {
		matches!(
			self,
			OrderStatus::Served | OrderStatus::Delivered | OrderStatus::Completed
		)
	}

	pub fn is_terminal(&self) -> bool {
		self.is_done() || *self == OrderStatus::Cancelled
	}

	/// Entering one of these states releases any courier claim.
	pub fn clears_courier(&self) -> bool {
		matches!(
			self,
			OrderStatus::Pending | OrderStatus::Preparing | OrderStatus::Ready
		)
	}

	/// Entering one of these states stamps who completed the order.
	pub fn stamps_completion(&self) -> bool {
		matches!(self, OrderStatus::Served | OrderStatus::Delivered)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	/// Accepts the canonical tokens plus the legacy spellings seen in stored documents.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let token: String = s
			.trim()
			.chars()
			.filter(|c| *c != '_' && *c != '-' && *c != ' ')
			.collect::<String>()
			.to_lowercase();
		match token.as_str() {
			"pending" | "new" => Ok(OrderStatus::Pending),
			"accepted" | "confirmed" => Ok(OrderStatus::Accepted),
			"preparing" | "inpreparation" => Ok(OrderStatus::Preparing),
			"ready" => Ok(OrderStatus::Ready),
			"served" => Ok(OrderStatus::Served),
			"ontheway" | "intransit" => Ok(OrderStatus::OnTheWay),
			"delivered" => Ok(OrderStatus::Delivered),
			"completed" => Ok(OrderStatus::Completed),
			"cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
			_ => Err(format!("Unknown order status: {}", s)),
		}
	}
}

/// How the order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
	Pickup,
	Delivery,
	DineIn,
}

impl OrderType {
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderType::Pickup => "pickup",
			OrderType::Delivery => "delivery",
			OrderType::DineIn => "dine_in",
		}
	}
}

impl FromStr for OrderType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let token: String = s
			.trim()
			.chars()
			.filter(|c| *c != '_' && *c != '-' && *c != ' ')
			.collect::<String>()
			.to_lowercase();
		match token.as_str() {
			"pickup" | "takeaway" | "collection" => Ok(OrderType::Pickup),
			"delivery" => Ok(OrderType::Delivery),
			"dinein" | "table" | "eatin" => Ok(OrderType::DineIn),
			_ => Err(format!("Unknown order type: {}", s)),
		}
	}
}

/// Payment state of a dine-in tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	Paid,
	Unpaid,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn item(name: &str, quantity: u32, price: Decimal) -> OrderItem {
		OrderItem {
			product_id: String::new(),
			name: name.to_string(),
			quantity,
			price,
			unit: None,
			modifiers: Vec::new(),
			note: None,
		}
	}

	#[test]
	fn test_shortfall_amount() {
		let lamb = item("Lamb Chops", 2, Decimal::new(950, 2));
		let bread = item("Bread", 1, Decimal::new(200, 2));
		let shortfall = vec![
			UnavailableItem::from_item(0, &lamb),
			UnavailableItem::from_item(3, &bread),
		];

		assert_eq!(shortfall[1].position, 4);
		assert_eq!(shortfall_amount(&shortfall), Decimal::new(2100, 2));
	}

	#[test]
	fn test_status_tokens() {
		assert_eq!("onTheWay".parse::<OrderStatus>().unwrap(), OrderStatus::OnTheWay);
		assert_eq!("on_the_way".parse::<OrderStatus>().unwrap(), OrderStatus::OnTheWay);
		assert_eq!("Canceled".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
		assert!("shipped".parse::<OrderStatus>().is_err());

		let json = serde_json::to_string(&OrderStatus::OnTheWay).unwrap();
		assert_eq!(json, "\"onTheWay\"");
	}

	#[test]
	fn test_dine_in_synonyms() {
		assert_eq!("dine-in".parse::<OrderType>().unwrap(), OrderType::DineIn);
		assert_eq!("dineIn".parse::<OrderType>().unwrap(), OrderType::DineIn);
		assert_eq!(
			serde_json::to_string(&OrderType::DineIn).unwrap(),
			"\"dine_in\""
		);
	}

	#[test]
	fn test_status_history_first_write_wins() {
		let mut history = BTreeMap::new();
		history.insert(OrderStatus::Pending, 10);
		let mut order = Order {
			id: "o1".into(),
			order_number: "O1".into(),
			business_id: "b1".into(),
			business_name: String::new(),
			customer_id: "c1".into(),
			customer_name: String::new(),
			customer_phone: String::new(),
			items: vec![],
			subtotal: Decimal::ZERO,
			delivery_fee: Decimal::ZERO,
			total: Decimal::ZERO,
			status: OrderStatus::Pending,
			order_type: OrderType::Pickup,
			created_at: 10,
			updated_at: 10,
			payment_method: String::new(),
			payment_status: None,
			table_number: None,
			waiter_name: None,
			table_session_id: None,
			courier: None,
			served_by_name: None,
			served_by_id: None,
			served_at: None,
			cancellation_reason: None,
			cancelled_by: None,
			unavailable_items: vec![],
			status_history: history,
			checked_items: BTreeMap::new(),
		};

		assert!(!order.record_status_entry(OrderStatus::Pending, 99));
		assert!(order.record_status_entry(OrderStatus::Accepted, 20));
		assert_eq!(order.status_history[&OrderStatus::Pending], 10);
		assert_eq!(order.status_history[&OrderStatus::Accepted], 20);
	}
}
