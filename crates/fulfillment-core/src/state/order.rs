//! Order state machine implementation.
//!
//! Owns the transition table, the guards evaluated on every transition and the
//! derived "recommended next action" policy. A transition is a single write
//! under the order's storage lock: the status change, courier clearing,
//! completion stamping, cancellation audit, shortfall record and status-history
//! entry all land together or not at all.

use super::store::{OrderStore, StoreError};
use crate::engine::event_bus::EventBus;
use fulfillment_types::{
	current_timestamp, truncate_id, Actor, FulfillmentEvent, Order, OrderStatus, OrderType,
	TransitionEvent, UnavailableItem,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during a transition.
///
/// Only these cross the component boundary; side-effect failures are reported
/// separately and never undo a committed transition.
#[derive(Debug, Error)]
pub enum TransitionError {
	/// Rejected before any write; the order is unchanged.
	#[error("Validation error: {0}")]
	Validation(String),
	#[error("Invalid transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order not found: {0}")]
	NotFound(String),
	/// The store could not be read or written. Retryable.
	#[error("Persistence error: {0}")]
	Persistence(String),
}

impl From<StoreError> for TransitionError {
	fn from(e: StoreError) -> Self {
		match e {
			StoreError::NotFound(id) => TransitionError::NotFound(id),
			StoreError::AlreadyExists(id) => {
				TransitionError::Validation(format!("Order already exists: {}", id))
			},
			StoreError::Storage(msg) => TransitionError::Persistence(msg),
		}
	}
}

/// The action the recommended flow offers for an order's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
	/// Every item is checked.
	Accept,
	/// Some items are checked; the rest become unavailable items.
	AcceptWithShortfall,
	StartPreparing,
	MarkReady,
	/// Dine-in order served at the table.
	MarkServed,
	MarkPickedUp,
	/// Delivery order handed to a courier.
	Dispatch,
	MarkDelivered,
}

impl NextAction {
	/// Status the action moves the order into.
	pub fn target(&self) -> OrderStatus {
		match self {
			NextAction::Accept | NextAction::AcceptWithShortfall => OrderStatus::Accepted,
			NextAction::StartPreparing => OrderStatus::Preparing,
			NextAction::MarkReady => OrderStatus::Ready,
			NextAction::MarkServed | NextAction::MarkPickedUp | NextAction::MarkDelivered => {
				OrderStatus::Delivered
			},
			NextAction::Dispatch => OrderStatus::OnTheWay,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			NextAction::Accept => "accept",
			NextAction::AcceptWithShortfall => "accept_with_shortfall",
			NextAction::StartPreparing => "start_preparing",
			NextAction::MarkReady => "mark_ready",
			NextAction::MarkServed => "mark_served",
			NextAction::MarkPickedUp => "mark_picked_up",
			NextAction::Dispatch => "dispatch",
			NextAction::MarkDelivered => "mark_delivered",
		}
	}
}

impl fmt::Display for NextAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Derives the recommended next action from the order and its checklist.
///
/// A pending order with no items, or with nothing checked, has no action.
pub fn recommended_action(order: &Order, checked_count: usize) -> Option<NextAction> {
	let total = order.items.len();
	match order.status {
		OrderStatus::Pending if total == 0 || checked_count == 0 => None,
		OrderStatus::Pending if checked_count >= total => Some(NextAction::Accept),
		OrderStatus::Pending => Some(NextAction::AcceptWithShortfall),
		OrderStatus::Accepted => Some(NextAction::StartPreparing),
		OrderStatus::Preparing => Some(NextAction::MarkReady),
		OrderStatus::Ready => Some(match order.order_type {
			OrderType::DineIn => NextAction::MarkServed,
			OrderType::Pickup => NextAction::MarkPickedUp,
			OrderType::Delivery => NextAction::Dispatch,
		}),
		OrderStatus::OnTheWay => Some(NextAction::MarkDelivered),
		OrderStatus::Served
		| OrderStatus::Delivered
		| OrderStatus::Completed
		| OrderStatus::Cancelled => None,
	}
}

/// A requested status change and the data that travels with it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
	pub target: OrderStatus,
	/// Staff member performing the change, used for audit stamps.
	pub actor: Actor,
	/// Cancellation reason. Required when `target` is `cancelled`.
	pub reason: Option<String>,
	/// Shortfall recorded on acceptance, with 1-based positions.
	pub unavailable: Vec<UnavailableItem>,
	/// Administrative overrides skip the transition table.
	pub administrative: bool,
}

impl TransitionRequest {
	pub fn new(target: OrderStatus, actor: Actor) -> Self {
		Self {
			target,
			actor,
			reason: None,
			unavailable: Vec::new(),
			administrative: false,
		}
	}

	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());
		self
	}

	pub fn with_unavailable(mut self, items: Vec<UnavailableItem>) -> Self {
		self.unavailable = items;
		self
	}

	pub fn administrative(mut self) -> Self {
		self.administrative = true;
		self
	}

	/// Checks that need no stored state.
	fn validate(&self) -> Result<(), TransitionError> {
		if self.target == OrderStatus::Cancelled
			&& self.reason.as_deref().is_none_or(|r| r.trim().is_empty())
		{
			return Err(TransitionError::Validation(
				"Cancellation requires a non-empty reason".to_string(),
			));
		}
		if !self.unavailable.is_empty() && self.target != OrderStatus::Accepted {
			return Err(TransitionError::Validation(format!(
				"Unavailable items can only accompany acceptance, not {}",
				self.target
			)));
		}
		Ok(())
	}
}

/// A transition that has been persisted. Input to the side-effect orchestrator.
#[derive(Debug, Clone)]
pub struct CommittedTransition {
	/// The order as written.
	pub order: Order,
	pub from: OrderStatus,
	pub request: TransitionRequest,
}

/// Manages order state transitions and persistence.
pub struct OrderStateMachine {
	store: Arc<OrderStore>,
	event_bus: EventBus,
}

impl OrderStateMachine {
	pub fn new(store: Arc<OrderStore>, event_bus: EventBus) -> Self {
		Self { store, event_bus }
	}

	/// Checks if a non-administrative transition is an edge of the table.
	pub fn is_valid_transition(from: OrderStatus, to: OrderStatus, order_type: OrderType) -> bool {
		// (status, order type) -> allowed targets. Terminal states have no entry.
		static TRANSITIONS: Lazy<HashMap<(OrderStatus, OrderType), HashSet<OrderStatus>>> =
			Lazy::new(|| {
				use OrderStatus::*;
				let mut m = HashMap::new();
				for order_type in [OrderType::Pickup, OrderType::Delivery, OrderType::DineIn] {
					m.insert((Pending, order_type), HashSet::from([Accepted, Cancelled]));
					m.insert((Accepted, order_type), HashSet::from([Preparing, Cancelled]));
					m.insert((Preparing, order_type), HashSet::from([Ready, Cancelled]));
					m.insert((OnTheWay, order_type), HashSet::from([Delivered, Cancelled]));
				}
				m.insert(
					(Ready, OrderType::DineIn),
					HashSet::from([Served, Delivered, Cancelled]),
				);
				m.insert(
					(Ready, OrderType::Pickup),
					HashSet::from([Delivered, Cancelled]),
				);
				m.insert(
					(Ready, OrderType::Delivery),
					HashSet::from([OnTheWay, Cancelled]),
				);
				m
			});

		TRANSITIONS
			.get(&(from, order_type))
			.is_some_and(|targets| targets.contains(&to))
	}

	/// Writes the transition's effects onto the order.
	fn apply(order: &mut Order, request: &TransitionRequest, now: u64) {
		let target = request.target;
		order.status = target;

		if target.clears_courier() {
			order.clear_courier();
		}
		if target.stamps_completion() {
			order.served_by_name = Some(request.actor.display_name().to_string());
			order.served_by_id = Some(request.actor.id.clone());
			order.served_at = Some(now);
		}
		if target == OrderStatus::Cancelled {
			order.cancellation_reason = request.reason.clone();
			order.cancelled_by = Some(request.actor.display_name().to_string());
		}
		if target == OrderStatus::Accepted {
			// The shortfall belongs to this acceptance only.
			order.unavailable_items = request.unavailable.clone();
		}
		order.record_status_entry(target, now);
	}

	/// Validates and commits a transition.
	///
	/// Nothing is written when this fails. On success the caller hands the
	/// result to the side-effect orchestrator.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), target = %request.target))]
	pub async fn transition(
		&self,
		order_id: &str,
		request: TransitionRequest,
	) -> Result<CommittedTransition, TransitionError> {
		request.validate()?;

		let mut from = OrderStatus::Pending;
		let result = self
			.store
			.update_with(order_id, |order| {
				if !request.administrative
					&& !Self::is_valid_transition(order.status, request.target, order.order_type)
				{
					return Err(TransitionError::InvalidTransition {
						from: order.status,
						to: request.target,
					});
				}
				if let Some(item) = request
					.unavailable
					.iter()
					.find(|item| item.position == 0 || item.position > order.items.len())
				{
					return Err(TransitionError::Validation(format!(
						"Unavailable item position {} is outside 1..={}",
						item.position,
						order.items.len()
					)));
				}
				from = order.status;
				Self::apply(order, &request, current_timestamp());
				Ok(())
			})
			.await;

		let order = match result {
			Ok(order) => order,
			Err(TransitionError::Persistence(e)) => {
				tracing::error!(error = %e, "Transition aborted by storage failure");
				return Err(TransitionError::Persistence(e));
			},
			Err(e) => {
				tracing::debug!(error = %e, "Transition rejected");
				return Err(e);
			},
		};

		tracing::info!(
			from = %from,
			to = %order.status,
			actor = %request.actor.display_name(),
			administrative = request.administrative,
			"Order status changed"
		);
		self.event_bus
			.publish(FulfillmentEvent::Transition(TransitionEvent {
				order_id: order.id.clone(),
				from,
				to: order.status,
				actor: request.actor.clone(),
				administrative: request.administrative,
			}));

		Ok(CommittedTransition {
			order,
			from,
			request,
		})
	}

	/// Gets an order by ID.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, TransitionError> {
		Ok(self.store.get(order_id).await?)
	}

	/// Stores a new order.
	pub async fn store_order(&self, order: &Order) -> Result<(), TransitionError> {
		Ok(self.store.insert(order).await?)
	}

	/// Administrative hard delete.
	pub async fn delete_order(&self, order_id: &str) -> Result<(), TransitionError> {
		self.store.delete(order_id).await?;
		tracing::info!(order_id = %truncate_id(order_id), "Order deleted");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::normalizer::normalize;
	use async_trait::async_trait;
	use fulfillment_storage::implementations::memory::{MemoryStorage, MemoryStorageSchema};
	use fulfillment_storage::{StorageError, StorageInterface, StorageService};
	use fulfillment_types::{ConfigSchema, CourierAssignment};
	use rust_decimal::Decimal;
	use serde_json::json;

	fn chef() -> Actor {
		Actor::new("u-7", "Chef Ana", "ana@kitchen.test")
	}

	fn machine() -> (OrderStateMachine, Arc<OrderStore>, EventBus) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let bus = EventBus::new(32);
		let store = Arc::new(OrderStore::new(storage, bus.clone()));
		(OrderStateMachine::new(store.clone(), bus.clone()), store, bus)
	}

	async fn seed(store: &OrderStore, raw: serde_json::Value) -> Order {
		let order = normalize(&raw);
		store.insert(&order).await.unwrap();
		order
	}

	fn courier() -> CourierAssignment {
		CourierAssignment {
			courier_id: "d-1".into(),
			courier_name: "Sam".into(),
			courier_phone: "+100".into(),
			claimed_at: 5,
		}
	}

	#[test]
	fn test_recommended_action_table() {
		let mut order = normalize(&json!({
			"id": "o1",
			"type": "delivery",
			"items": [{ "name": "a" }, { "name": "b" }, { "name": "c" }]
		}));

		assert_eq!(recommended_action(&order, 0), None);
		assert_eq!(recommended_action(&order, 2), Some(NextAction::AcceptWithShortfall));
		assert_eq!(recommended_action(&order, 3), Some(NextAction::Accept));

		order.status = OrderStatus::Ready;
		assert_eq!(recommended_action(&order, 0), Some(NextAction::Dispatch));
		order.order_type = OrderType::DineIn;
		assert_eq!(recommended_action(&order, 0), Some(NextAction::MarkServed));
		order.order_type = OrderType::Pickup;
		assert_eq!(recommended_action(&order, 0), Some(NextAction::MarkPickedUp));

		for done in [OrderStatus::Served, OrderStatus::Delivered, OrderStatus::Cancelled] {
			order.status = done;
			assert_eq!(recommended_action(&order, 3), None);
		}
	}

	#[test]
	fn test_empty_order_has_no_action() {
		let order = normalize(&json!({ "id": "o1", "items": [] }));
		assert_eq!(recommended_action(&order, 0), None);
	}

	#[test]
	fn test_recommended_targets_are_legal_edges() {
		for order_type in [OrderType::Pickup, OrderType::Delivery, OrderType::DineIn] {
			for status in OrderStatus::ALL {
				let mut order = normalize(&json!({ "id": "o", "items": [{ "name": "x" }] }));
				order.status = status;
				order.order_type = order_type;
				if let Some(action) = recommended_action(&order, 1) {
					assert!(
						OrderStateMachine::is_valid_transition(status, action.target(), order_type),
						"{} -> {} for {:?}",
						status,
						action.target(),
						order_type
					);
				}
			}
		}
	}

	#[test]
	fn test_dine_in_never_goes_on_the_way() {
		assert!(!OrderStateMachine::is_valid_transition(
			OrderStatus::Ready,
			OrderStatus::OnTheWay,
			OrderType::DineIn
		));
		assert!(OrderStateMachine::is_valid_transition(
			OrderStatus::Ready,
			OrderStatus::Served,
			OrderType::DineIn
		));
		assert!(!OrderStateMachine::is_valid_transition(
			OrderStatus::Delivered,
			OrderStatus::Cancelled,
			OrderType::Pickup
		));
	}

	#[tokio::test]
	async fn test_backward_moves_clear_courier() {
		let (machine, store, _) = machine();
		seed(&store, json!({ "id": "o1", "type": "delivery", "status": "onTheWay" })).await;

		for target in [OrderStatus::Ready, OrderStatus::Preparing, OrderStatus::Pending] {
			store
				.update_with("o1", |o| -> Result<(), StoreError> {
					o.courier = Some(courier());
					Ok(())
				})
				.await
				.unwrap();

			let committed = machine
				.transition("o1", TransitionRequest::new(target, chef()).administrative())
				.await
				.unwrap();
			assert_eq!(committed.order.status, target);
			assert!(committed.order.courier.is_none());
			assert!(store.get("o1").await.unwrap().courier.is_none());
		}
	}

	#[tokio::test]
	async fn test_cancel_requires_reason() {
		let (machine, store, _) = machine();
		seed(&store, json!({ "id": "o1" })).await;

		for reason in [None, Some(""), Some("   ")] {
			let mut request = TransitionRequest::new(OrderStatus::Cancelled, chef());
			request.reason = reason.map(str::to_string);
			let err = machine.transition("o1", request).await.unwrap_err();
			assert!(matches!(err, TransitionError::Validation(_)));
		}
		assert_eq!(store.get("o1").await.unwrap().status, OrderStatus::Pending);

		let committed = machine
			.transition(
				"o1",
				TransitionRequest::new(OrderStatus::Cancelled, chef()).with_reason(" out of lamb "),
			)
			.await
			.unwrap();
		assert_eq!(
			committed.order.cancellation_reason.as_deref(),
			Some(" out of lamb ")
		);
		assert_eq!(committed.order.cancelled_by.as_deref(), Some("Chef Ana"));
	}

	#[tokio::test]
	async fn test_terminal_states_reject_flow_moves() {
		let (machine, store, _) = machine();
		seed(&store, json!({ "id": "o1", "status": "delivered" })).await;

		let err = machine
			.transition(
				"o1",
				TransitionRequest::new(OrderStatus::Cancelled, chef()).with_reason("late"),
			)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			TransitionError::InvalidTransition {
				from: OrderStatus::Delivered,
				to: OrderStatus::Cancelled
			}
		));
	}

	#[tokio::test]
	async fn test_history_is_first_write_wins() {
		let (machine, store, _) = machine();
		let mut raw = json!({ "id": "o1", "status": "accepted", "createdAt": 100 });
		raw["statusHistory"] = json!({ "pending": 100, "accepted": 150 });
		seed(&store, raw).await;

		let committed = machine
			.transition(
				"o1",
				TransitionRequest::new(OrderStatus::Accepted, chef()).administrative(),
			)
			.await
			.unwrap();
		assert_eq!(committed.order.status_history[&OrderStatus::Accepted], 150);

		let committed = machine
			.transition("o1", TransitionRequest::new(OrderStatus::Preparing, chef()))
			.await
			.unwrap();
		assert!(committed.order.status_history.contains_key(&OrderStatus::Preparing));
		assert_eq!(committed.from, OrderStatus::Accepted);
	}

	#[tokio::test]
	async fn test_serving_stamps_actor() {
		let (machine, store, bus) = machine();
		seed(&store, json!({ "id": "t1", "type": "dine_in", "status": "ready" })).await;
		let mut rx = bus.subscribe();

		let committed = machine
			.transition("t1", TransitionRequest::new(OrderStatus::Delivered, chef()))
			.await
			.unwrap();
		assert_eq!(committed.order.served_by_name.as_deref(), Some("Chef Ana"));
		assert_eq!(committed.order.served_by_id.as_deref(), Some("u-7"));
		assert!(committed.order.served_at.is_some());

		// Order change first, then the transition event.
		assert!(matches!(rx.try_recv().unwrap(), FulfillmentEvent::Order(_)));
		match rx.try_recv().unwrap() {
			FulfillmentEvent::Transition(event) => {
				assert_eq!(event.from, OrderStatus::Ready);
				assert_eq!(event.to, OrderStatus::Delivered);
				assert!(!event.administrative);
			},
			other => panic!("unexpected event {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_shortfall_only_on_acceptance() {
		let (machine, store, _) = machine();
		seed(
			&store,
			json!({ "id": "o1", "items": [{ "name": "Bread", "quantity": 1, "price": 2 }] }),
		)
		.await;
		let bread = UnavailableItem {
			position: 1,
			product_id: String::new(),
			name: "Bread".into(),
			quantity: 1,
			price: Decimal::from(2),
		};

		let err = machine
			.transition(
				"o1",
				TransitionRequest::new(OrderStatus::Preparing, chef())
					.with_unavailable(vec![bread.clone()])
					.administrative(),
			)
			.await
			.unwrap_err();
		assert!(matches!(err, TransitionError::Validation(_)));

		let mut stray = bread.clone();
		stray.position = 4;
		let err = machine
			.transition(
				"o1",
				TransitionRequest::new(OrderStatus::Accepted, chef()).with_unavailable(vec![stray]),
			)
			.await
			.unwrap_err();
		assert!(matches!(err, TransitionError::Validation(_)));

		let committed = machine
			.transition(
				"o1",
				TransitionRequest::new(OrderStatus::Accepted, chef())
					.with_unavailable(vec![bread.clone()]),
			)
			.await
			.unwrap();
		assert_eq!(committed.order.unavailable_items, vec![bread]);
	}

	#[tokio::test]
	async fn test_missing_order() {
		let (machine, _, _) = machine();
		let err = machine
			.transition("ghost", TransitionRequest::new(OrderStatus::Accepted, chef()))
			.await
			.unwrap_err();
		assert!(matches!(err, TransitionError::NotFound(id) if id == "ghost"));
	}

	/// Reads succeed, writes fail.
	struct ReadOnlyStorage(MemoryStorage);

	#[async_trait]
	impl StorageInterface for ReadOnlyStorage {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.0.get_bytes(key).await
		}
		async fn set_bytes(&self, _key: &str, _value: Vec<u8>) -> Result<(), StorageError> {
			Err(StorageError::Backend("disk full".into()))
		}
		async fn delete(&self, _key: &str) -> Result<(), StorageError> {
			Err(StorageError::Backend("disk full".into()))
		}
		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.0.exists(key).await
		}
		async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
			self.0.list_keys(prefix).await
		}
		async fn increment(&self, _key: &str, _field: &str, _delta: i64) -> Result<i64, StorageError> {
			Err(StorageError::Backend("disk full".into()))
		}
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(MemoryStorageSchema)
		}
	}

	#[tokio::test]
	async fn test_write_failure_is_persistence_error() {
		let inner = MemoryStorage::new();
		let order = normalize(&json!({ "id": "o1", "items": [{ "name": "x" }] }));
		inner
			.set_bytes("orders:o1", serde_json::to_vec(&order).unwrap())
			.await
			.unwrap();
		let storage = Arc::new(StorageService::new(Box::new(ReadOnlyStorage(inner))));
		let bus = EventBus::new(8);
		let mut rx = bus.subscribe();
		let machine = OrderStateMachine::new(Arc::new(OrderStore::new(storage, bus.clone())), bus);

		let err = machine
			.transition("o1", TransitionRequest::new(OrderStatus::Accepted, chef()))
			.await
			.unwrap_err();
		assert!(matches!(err, TransitionError::Persistence(_)));
		assert!(rx.try_recv().is_err());
	}
}
