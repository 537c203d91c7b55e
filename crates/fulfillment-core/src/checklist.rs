//! Fulfillment checklist.
//!
//! Tracks, per order, which item positions staff confirmed as in stock before
//! acceptance. The persisted copy lives in the order document
//! (`checkedItems`); this module keeps an in-memory mirror that is hydrated at
//! startup and refreshed whenever an order is read, so queries never hit
//! storage.
//!
//! Positions here are 0-based indices into `Order::items`.

use crate::state::{OrderStore, StoreError};
use dashmap::DashMap;
use fulfillment_types::{truncate_id, Order, OrderItem, UnavailableItem};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum ChecklistError {
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Item position {position} is outside an order of {len} items")]
	InvalidPosition { position: usize, len: usize },
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<StoreError> for ChecklistError {
	fn from(e: StoreError) -> Self {
		match e {
			StoreError::NotFound(id) => ChecklistError::NotFound(id),
			other => ChecklistError::Storage(other.to_string()),
		}
	}
}

/// Per-order item availability marks.
pub struct FulfillmentChecklist {
	store: Arc<OrderStore>,
	entries: DashMap<String, BTreeMap<usize, bool>>,
}

impl FulfillmentChecklist {
	pub fn new(store: Arc<OrderStore>) -> Self {
		Self {
			store,
			entries: DashMap::new(),
		}
	}

	/// Loads the persisted marks of many orders.
	pub fn hydrate(&self, orders: &[Order]) {
		for order in orders {
			self.hydrate_order(order);
		}
		tracing::debug!(orders = orders.len(), "Checklist hydrated");
	}

	/// Replaces the mirror of one order with its persisted marks.
	pub fn hydrate_order(&self, order: &Order) {
		self.entries
			.insert(order.id.clone(), order.checked_items.clone());
	}

	/// Drops the mirror of a deleted order.
	pub fn forget(&self, order_id: &str) {
		self.entries.remove(order_id);
	}

	/// Persists the mark at `position`. Repeating an identical call is harmless.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), position = position, checked = checked))]
	pub async fn set_item_checked(
		&self,
		order_id: &str,
		position: usize,
		checked: bool,
	) -> Result<Order, ChecklistError> {
		let result = self
			.store
			.update_with(order_id, |order| {
				if position >= order.items.len() {
					return Err(ChecklistError::InvalidPosition {
						position,
						len: order.items.len(),
					});
				}
				order.checked_items.insert(position, checked);
				// Mirror under the order lock so concurrent marks land in commit order.
				self.hydrate_order(order);
				Ok(())
			})
			.await;

		match result {
			Ok(order) => Ok(order),
			Err(e) => {
				// The mirror may be ahead of storage; the next read rehydrates it.
				if matches!(e, ChecklistError::Storage(_)) {
					tracing::warn!(error = %e, "Checklist write failed");
					self.forget(order_id);
				}
				Err(e)
			},
		}
	}

	/// Number of positions below `total_items` marked checked.
	pub fn checked_count(&self, order_id: &str, total_items: usize) -> usize {
		self.entries
			.get(order_id)
			.map(|marks| {
				marks
					.iter()
					.filter(|(position, checked)| **checked && **position < total_items)
					.count()
			})
			.unwrap_or(0)
	}

	/// True iff the order has items and every one of them is checked.
	pub fn is_fully_checked(&self, order_id: &str, total_items: usize) -> bool {
		total_items > 0 && self.checked_count(order_id, total_items) == total_items
	}

	/// Items not marked checked, as 1-based unavailable-item records.
	pub fn unchecked_items(&self, order_id: &str, items: &[OrderItem]) -> Vec<UnavailableItem> {
		let marks = self.entries.get(order_id);
		items
			.iter()
			.enumerate()
			.filter(|(position, _)| {
				!marks
					.as_ref()
					.and_then(|m| m.get(position).copied())
					.unwrap_or(false)
			})
			.map(|(position, item)| UnavailableItem::from_item(position, item))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::event_bus::EventBus;
	use crate::normalizer::normalize;
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_storage::StorageService;
	use rust_decimal::Decimal;
	use serde_json::json;

	fn setup() -> (FulfillmentChecklist, Arc<OrderStore>) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let store = Arc::new(OrderStore::new(storage, EventBus::new(16)));
		(FulfillmentChecklist::new(store.clone()), store)
	}

	async fn three_items(store: &OrderStore) -> Order {
		let order = normalize(&json!({
			"id": "o1",
			"items": [
				{ "name": "Lamb Chops", "quantity": 2, "price": "9.50" },
				{ "name": "Rice", "quantity": 1, "price": "3.00" },
				{ "name": "Bread", "quantity": 1, "price": "2.00" }
			]
		}));
		store.insert(&order).await.unwrap();
		order
	}

	#[tokio::test]
	async fn test_marks_are_counted_and_persisted() {
		let (checklist, store) = setup();
		let order = three_items(&store).await;
		checklist.hydrate_order(&order);

		checklist.set_item_checked("o1", 1, true).await.unwrap();
		checklist.set_item_checked("o1", 1, true).await.unwrap();
		checklist.set_item_checked("o1", 2, true).await.unwrap();
		checklist.set_item_checked("o1", 2, false).await.unwrap();

		assert_eq!(checklist.checked_count("o1", 3), 1);
		assert!(!checklist.is_fully_checked("o1", 3));

		let stored = store.get("o1").await.unwrap();
		assert_eq!(stored.checked_items, BTreeMap::from([(1, true), (2, false)]));

		// A fresh mirror rebuilt from storage sees the same marks.
		let restarted = FulfillmentChecklist::new(store.clone());
		restarted.hydrate(&store.list().await.unwrap());
		assert_eq!(restarted.checked_count("o1", 3), 1);
	}

	#[tokio::test]
	async fn test_unchecked_items_are_one_based() {
		let (checklist, store) = setup();
		three_items(&store).await;
		checklist.set_item_checked("o1", 0, true).await.unwrap();
		checklist.set_item_checked("o1", 1, true).await.unwrap();

		let order = store.get("o1").await.unwrap();
		let unchecked = checklist.unchecked_items("o1", &order.items);
		assert_eq!(unchecked.len(), 1);
		assert_eq!(unchecked[0].position, 3);
		assert_eq!(unchecked[0].name, "Bread");
		assert_eq!(unchecked[0].price, Decimal::new(200, 2));
	}

	#[tokio::test]
	async fn test_position_outside_items_is_rejected() {
		let (checklist, store) = setup();
		three_items(&store).await;

		let err = checklist.set_item_checked("o1", 3, true).await.unwrap_err();
		assert!(matches!(err, ChecklistError::InvalidPosition { position: 3, len: 3 }));
		let err = checklist.set_item_checked("ghost", 0, true).await.unwrap_err();
		assert!(matches!(err, ChecklistError::NotFound(_)));
	}

	#[test]
	fn test_count_never_exceeds_items() {
		let (checklist, _) = setup();
		let mut order = normalize(&json!({ "id": "o2", "items": [{ "name": "a" }] }));
		order.checked_items = BTreeMap::from([(0, true), (5, true), (9, true)]);
		checklist.hydrate_order(&order);

		assert_eq!(checklist.checked_count("o2", 1), 1);
		assert!(checklist.is_fully_checked("o2", 1));
		assert!(!checklist.is_fully_checked("o2", 0));
		assert_eq!(checklist.checked_count("unknown", 4), 0);
	}
}
