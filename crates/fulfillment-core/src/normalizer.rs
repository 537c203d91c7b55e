//! Order record normalizer.
//!
//! Stored order documents were written over time by several ordering channels
//! that did not agree on field names (`businessId` vs `storeId`, `type` vs
//! `orderType`, `dine-in` vs `dine_in`, nested vs flat customer data, ...).
//! [`normalize`] maps any of those shapes onto the canonical [`Order`]. It is a
//! total function: unknown or malformed values fall back to defaults instead
//! of failing, so the rest of the core never sees schema drift.
//!
//! A canonical document (as written by this crate) normalizes to itself.

use chrono::DateTime;
use fulfillment_types::{
	short_code, sum_amounts, CourierAssignment, Modifier, Order, OrderItem, OrderStatus,
	OrderType, PaymentStatus, UnavailableItem,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;

/// Alias table: for each canonical field, the JSON pointers it may be stored
/// under, canonical name first. The first pointer holding a non-null value wins.
mod aliases {
	pub const ID: &[&str] = &["/id", "/_id", "/orderId", "/order_id"];
	pub const ORDER_NUMBER: &[&str] = &["/orderNumber", "/order_number", "/orderNo", "/number"];
	pub const BUSINESS_ID: &[&str] = &[
		"/businessId",
		"/business_id",
		"/storeId",
		"/restaurantId",
		"/shopId",
		"/merchantId",
		"/business/id",
	];
	pub const BUSINESS_NAME: &[&str] = &[
		"/businessName",
		"/business_name",
		"/storeName",
		"/restaurantName",
		"/shopName",
		"/business/name",
	];
	pub const CUSTOMER_ID: &[&str] = &[
		"/customerId",
		"/customer_id",
		"/userId",
		"/clientId",
		"/customer/id",
	];
	pub const CUSTOMER_NAME: &[&str] = &[
		"/customerName",
		"/customer_name",
		"/clientName",
		"/userName",
		"/customer/name",
	];
	pub const CUSTOMER_PHONE: &[&str] = &[
		"/customerPhone",
		"/customer_phone",
		"/phone",
		"/phoneNumber",
		"/customer/phone",
	];
	pub const ITEMS: &[&str] = &["/items", "/lineItems", "/products", "/cart"];
	pub const SUBTOTAL: &[&str] = &["/subtotal", "/subTotal", "/sub_total", "/itemsTotal"];
	pub const DELIVERY_FEE: &[&str] = &[
		"/deliveryFee",
		"/delivery_fee",
		"/shippingFee",
		"/deliveryCost",
	];
	pub const TOTAL: &[&str] = &["/total", "/totalAmount", "/total_amount", "/grandTotal"];
	pub const STATUS: &[&str] = &["/status", "/orderStatus", "/state"];
	pub const ORDER_TYPE: &[&str] = &[
		"/type",
		"/orderType",
		"/order_type",
		"/deliveryType",
		"/fulfillmentType",
	];
	pub const CREATED_AT: &[&str] = &["/createdAt", "/created_at", "/orderDate", "/timestamp"];
	pub const UPDATED_AT: &[&str] = &["/updatedAt", "/updated_at"];
	pub const PAYMENT_METHOD: &[&str] = &[
		"/paymentMethod",
		"/payment_method",
		"/paymentType",
		"/payment/method",
	];
	pub const PAYMENT_STATUS: &[&str] = &["/paymentStatus", "/payment_status", "/payment/status"];
	pub const TABLE_NUMBER: &[&str] = &["/tableNumber", "/table_number", "/table"];
	pub const WAITER_NAME: &[&str] = &["/waiterName", "/waiter_name", "/waiter"];
	pub const TABLE_SESSION_ID: &[&str] = &["/tableSessionId", "/table_session_id", "/sessionId"];
	pub const COURIER_ID: &[&str] = &["/courier/courierId", "/courierId", "/driverId", "/courier/id"];
	pub const COURIER_NAME: &[&str] = &[
		"/courier/courierName",
		"/courierName",
		"/driverName",
		"/courier/name",
	];
	pub const COURIER_PHONE: &[&str] = &[
		"/courier/courierPhone",
		"/courierPhone",
		"/driverPhone",
		"/courier/phone",
	];
	pub const COURIER_CLAIMED_AT: &[&str] = &["/courier/claimedAt", "/claimedAt", "/courierClaimedAt"];
	pub const SERVED_BY_NAME: &[&str] = &["/servedByName", "/served_by_name", "/servedBy"];
	pub const SERVED_BY_ID: &[&str] = &["/servedById", "/served_by_id"];
	pub const SERVED_AT: &[&str] = &["/servedAt", "/served_at"];
	pub const CANCELLATION_REASON: &[&str] = &[
		"/cancellationReason",
		"/cancellation_reason",
		"/cancelReason",
	];
	pub const CANCELLED_BY: &[&str] = &["/cancelledBy", "/cancelled_by"];
	pub const UNAVAILABLE_ITEMS: &[&str] = &["/unavailableItems", "/unavailable_items"];
	pub const STATUS_HISTORY: &[&str] = &["/statusHistory", "/status_history"];
	pub const CHECKED_ITEMS: &[&str] = &["/checkedItems", "/checked_items", "/checklist"];

	pub const ITEM_PRODUCT_ID: &[&str] = &["/productId", "/product_id", "/sku", "/id"];
	pub const ITEM_NAME: &[&str] = &["/name", "/title", "/productName"];
	pub const ITEM_QUANTITY: &[&str] = &["/quantity", "/qty", "/count"];
	pub const ITEM_PRICE: &[&str] = &["/price", "/unitPrice", "/unit_price"];
	pub const ITEM_UNIT: &[&str] = &["/unit", "/unitName"];
	pub const ITEM_MODIFIERS: &[&str] = &["/modifiers", "/options", "/extras"];
	pub const ITEM_NOTE: &[&str] = &["/note", "/notes", "/comment", "/instructions"];
	pub const MODIFIER_PRICE: &[&str] = &["/priceDelta", "/price_delta", "/price"];
	pub const POSITION: &[&str] = &["/position", "/index"];
}

/// Timestamps above this are taken to be milliseconds.
const MILLIS_THRESHOLD: u64 = 100_000_000_000;

fn lookup<'a>(raw: &'a Value, pointers: &[&str]) -> Option<&'a Value> {
	pointers
		.iter()
		.filter_map(|p| raw.pointer(p))
		.find(|v| !v.is_null())
}

fn as_text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

fn text(raw: &Value, pointers: &[&str]) -> Option<String> {
	lookup(raw, pointers).and_then(as_text)
}

fn as_money(value: &Value) -> Option<Decimal> {
	let repr = match value {
		Value::Number(n) => n.to_string(),
		Value::String(s) => s.trim().to_string(),
		_ => return None,
	};
	repr.parse::<Decimal>()
		.or_else(|_| Decimal::from_scientific(&repr))
		.ok()
}

fn money(raw: &Value, pointers: &[&str]) -> Option<Decimal> {
	lookup(raw, pointers).and_then(as_money)
}

fn seconds(n: u64) -> u64 {
	if n > MILLIS_THRESHOLD {
		n / 1000
	} else {
		n
	}
}

/// Accepts Unix seconds or milliseconds (number or digit string), RFC 3339
/// strings and `{ "seconds": n }` / `{ "_seconds": n }` objects.
fn as_timestamp(value: &Value) -> Option<u64> {
	match value {
		Value::Number(n) => n
			.as_u64()
			.or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
			.map(seconds),
		Value::String(s) => {
			let s = s.trim();
			if let Ok(n) = s.parse::<u64>() {
				return Some(seconds(n));
			}
			DateTime::parse_from_rfc3339(s)
				.ok()
				.and_then(|dt| u64::try_from(dt.timestamp()).ok())
		},
		Value::Object(map) => map
			.get("seconds")
			.or_else(|| map.get("_seconds"))
			.and_then(Value::as_u64),
		_ => None,
	}
}

fn timestamp(raw: &Value, pointers: &[&str]) -> Option<u64> {
	lookup(raw, pointers).and_then(as_timestamp)
}

fn as_bool(value: &Value) -> Option<bool> {
	match value {
		Value::Bool(b) => Some(*b),
		Value::Number(n) => n.as_i64().map(|n| n != 0),
		Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
			"true" | "yes" | "1" => Some(true),
			"false" | "no" | "0" => Some(false),
			_ => None,
		},
		_ => None,
	}
}

/// Quantity of at least one.
fn quantity(raw: &Value, pointers: &[&str]) -> u32 {
	lookup(raw, pointers)
		.and_then(|v| match v {
			Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
			Value::String(s) => s.trim().parse::<u64>().ok(),
			_ => None,
		})
		.map(|q| q.clamp(1, u32::MAX as u64) as u32)
		.unwrap_or(1)
}

fn payment_status(raw: &Value) -> Option<PaymentStatus> {
	if let Some(paid) = raw.get("isPaid").and_then(as_bool) {
		return Some(if paid {
			PaymentStatus::Paid
		} else {
			PaymentStatus::Unpaid
		});
	}
	match text(raw, aliases::PAYMENT_STATUS)?.trim().to_ascii_lowercase().as_str() {
		"paid" | "settled" => Some(PaymentStatus::Paid),
		"unpaid" | "open" | "pending" => Some(PaymentStatus::Unpaid),
		_ => None,
	}
}

fn normalize_modifier(raw: &Value) -> Option<Modifier> {
	match raw {
		Value::String(name) => Some(Modifier {
			name: name.clone(),
			price_delta: Decimal::ZERO,
		}),
		Value::Object(_) => Some(Modifier {
			name: text(raw, aliases::ITEM_NAME)?,
			price_delta: money(raw, aliases::MODIFIER_PRICE).unwrap_or(Decimal::ZERO),
		}),
		_ => None,
	}
}

/// Normalizes one line item. Never drops an entry, since checklist positions
/// index into the item sequence.
fn normalize_item(raw: &Value) -> OrderItem {
	if let Value::String(name) = raw {
		return OrderItem {
			product_id: String::new(),
			name: name.clone(),
			quantity: 1,
			price: Decimal::ZERO,
			unit: None,
			modifiers: Vec::new(),
			note: None,
		};
	}

	OrderItem {
		product_id: text(raw, aliases::ITEM_PRODUCT_ID).unwrap_or_default(),
		name: text(raw, aliases::ITEM_NAME).unwrap_or_default(),
		quantity: quantity(raw, aliases::ITEM_QUANTITY),
		price: money(raw, aliases::ITEM_PRICE).unwrap_or(Decimal::ZERO),
		unit: text(raw, aliases::ITEM_UNIT),
		modifiers: lookup(raw, aliases::ITEM_MODIFIERS)
			.and_then(Value::as_array)
			.map(|mods| mods.iter().filter_map(normalize_modifier).collect())
			.unwrap_or_default(),
		note: text(raw, aliases::ITEM_NOTE),
	}
}

fn normalize_unavailable(index: usize, raw: &Value) -> UnavailableItem {
	let position = lookup(raw, aliases::POSITION)
		.and_then(Value::as_u64)
		.filter(|p| *p >= 1)
		.map(|p| p as usize)
		.unwrap_or(index + 1);
	UnavailableItem {
		position,
		product_id: text(raw, aliases::ITEM_PRODUCT_ID).unwrap_or_default(),
		name: text(raw, aliases::ITEM_NAME).unwrap_or_default(),
		quantity: quantity(raw, aliases::ITEM_QUANTITY),
		price: money(raw, aliases::ITEM_PRICE).unwrap_or(Decimal::ZERO),
	}
}

fn status_history(raw: &Value) -> BTreeMap<OrderStatus, u64> {
	let Some(Value::Object(map)) = lookup(raw, aliases::STATUS_HISTORY) else {
		return BTreeMap::new();
	};
	let mut history = BTreeMap::new();
	for (token, at) in map {
		if let (Ok(status), Some(at)) = (token.parse::<OrderStatus>(), as_timestamp(at)) {
			// Two legacy spellings of one status keep the earlier time.
			history
				.entry(status)
				.and_modify(|existing: &mut u64| *existing = (*existing).min(at))
				.or_insert(at);
		}
	}
	history
}

/// Accepts `{ "0": true, ... }` or `[true, false, ...]`.
fn checked_items(raw: &Value) -> BTreeMap<usize, bool> {
	match lookup(raw, aliases::CHECKED_ITEMS) {
		Some(Value::Object(map)) => map
			.iter()
			.filter_map(|(k, v)| Some((k.trim().parse::<usize>().ok()?, as_bool(v)?)))
			.collect(),
		Some(Value::Array(flags)) => flags
			.iter()
			.enumerate()
			.filter_map(|(i, v)| Some((i, as_bool(v)?)))
			.collect(),
		_ => BTreeMap::new(),
	}
}

fn courier(raw: &Value) -> Option<CourierAssignment> {
	Some(CourierAssignment {
		courier_id: text(raw, aliases::COURIER_ID)?,
		courier_name: text(raw, aliases::COURIER_NAME).unwrap_or_default(),
		courier_phone: text(raw, aliases::COURIER_PHONE).unwrap_or_default(),
		claimed_at: timestamp(raw, aliases::COURIER_CLAIMED_AT).unwrap_or(0),
	})
}

/// Maps a stored order document of any known shape to the canonical [`Order`].
///
/// Missing fields default to empty strings, zero amounts, `pending` status and
/// `pickup` type. A missing order number is derived from the id, a missing
/// subtotal from the item lines and a missing total from subtotal plus
/// delivery fee.
pub fn normalize(raw: &Value) -> Order {
	let id = text(raw, aliases::ID).unwrap_or_default();
	let items: Vec<OrderItem> = lookup(raw, aliases::ITEMS)
		.and_then(Value::as_array)
		.map(|items| items.iter().map(normalize_item).collect())
		.unwrap_or_default();

	let subtotal = money(raw, aliases::SUBTOTAL)
		.unwrap_or_else(|| sum_amounts(items.iter().map(OrderItem::line_total)));
	let delivery_fee = money(raw, aliases::DELIVERY_FEE).unwrap_or(Decimal::ZERO);
	let total = money(raw, aliases::TOTAL).unwrap_or(subtotal.saturating_add(delivery_fee));
	let created_at = timestamp(raw, aliases::CREATED_AT).unwrap_or(0);

	Order {
		order_number: text(raw, aliases::ORDER_NUMBER).unwrap_or_else(|| short_code(&id)),
		id,
		business_id: text(raw, aliases::BUSINESS_ID).unwrap_or_default(),
		business_name: text(raw, aliases::BUSINESS_NAME).unwrap_or_default(),
		customer_id: text(raw, aliases::CUSTOMER_ID).unwrap_or_default(),
		customer_name: text(raw, aliases::CUSTOMER_NAME).unwrap_or_default(),
		customer_phone: text(raw, aliases::CUSTOMER_PHONE).unwrap_or_default(),
		items,
		subtotal,
		delivery_fee,
		total,
		status: text(raw, aliases::STATUS)
			.and_then(|s| s.parse().ok())
			.unwrap_or(OrderStatus::Pending),
		order_type: text(raw, aliases::ORDER_TYPE)
			.and_then(|s| s.parse().ok())
			.unwrap_or(OrderType::Pickup),
		created_at,
		updated_at: timestamp(raw, aliases::UPDATED_AT).unwrap_or(created_at),
		payment_method: text(raw, aliases::PAYMENT_METHOD).unwrap_or_default(),
		payment_status: payment_status(raw),
		table_number: text(raw, aliases::TABLE_NUMBER),
		waiter_name: text(raw, aliases::WAITER_NAME),
		table_session_id: text(raw, aliases::TABLE_SESSION_ID),
		courier: courier(raw),
		served_by_name: text(raw, aliases::SERVED_BY_NAME),
		served_by_id: text(raw, aliases::SERVED_BY_ID),
		served_at: timestamp(raw, aliases::SERVED_AT),
		cancellation_reason: text(raw, aliases::CANCELLATION_REASON),
		cancelled_by: text(raw, aliases::CANCELLED_BY),
		unavailable_items: lookup(raw, aliases::UNAVAILABLE_ITEMS)
			.and_then(Value::as_array)
			.map(|items| {
				items
					.iter()
					.enumerate()
					.map(|(i, item)| normalize_unavailable(i, item))
					.collect()
			})
			.unwrap_or_default(),
		status_history: status_history(raw),
		checked_items: checked_items(raw),
	}
}
