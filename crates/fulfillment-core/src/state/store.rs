//! Order persistence on top of the storage service.
//!
//! Every read goes through the normalizer, so callers only ever see canonical
//! orders; every write stores the canonical shape. Writes to one order are
//! serialized by the storage lock for that order, and the resulting
//! `OrderEvent` is published while the lock is still held so subscribers see
//! per-order events in commit order.

use crate::engine::event_bus::EventBus;
use crate::normalizer::normalize;
use fulfillment_storage::{StorageError, StorageService};
use fulfillment_types::{
	current_timestamp, FulfillmentEvent, Order, OrderEvent, StorageKey,
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the order store.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Order already exists: {0}")]
	AlreadyExists(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<StorageError> for StoreError {
	fn from(e: StorageError) -> Self {
		StoreError::Storage(e.to_string())
	}
}

/// Canonical view over the `orders` namespace.
pub struct OrderStore {
	storage: Arc<StorageService>,
	event_bus: EventBus,
}

impl OrderStore {
	pub fn new(storage: Arc<StorageService>, event_bus: EventBus) -> Self {
		Self { storage, event_bus }
	}

	fn namespace() -> &'static str {
		StorageKey::Orders.as_str()
	}

	async fn load(&self, order_id: &str) -> Result<Order, StoreError> {
		match self.storage.retrieve::<Value>(Self::namespace(), order_id).await {
			Ok(raw) => {
				let mut order = normalize(&raw);
				// The storage key is authoritative for documents without an id field.
				if order.id.is_empty() {
					order.id = order_id.to_string();
				}
				Ok(order)
			},
			Err(StorageError::NotFound) => Err(StoreError::NotFound(order_id.to_string())),
			Err(e) => Err(e.into()),
		}
	}

	/// Reads one order.
	pub async fn get(&self, order_id: &str) -> Result<Order, StoreError> {
		self.load(order_id).await
	}

	/// Reads every stored order.
	pub async fn list(&self) -> Result<Vec<Order>, StoreError> {
		let documents = self
			.storage
			.retrieve_all::<Value>(Self::namespace())
			.await?;
		Ok(documents
			.into_iter()
			.map(|(id, raw)| {
				let mut order = normalize(&raw);
				if order.id.is_empty() {
					order.id = id;
				}
				order
			})
			.collect())
	}

	/// Persists a new order. Fails if the id is already taken.
	pub async fn insert(&self, order: &Order) -> Result<(), StoreError> {
		let _guard = self.storage.lock(Self::namespace(), &order.id).await;
		if self.storage.exists(Self::namespace(), &order.id).await? {
			return Err(StoreError::AlreadyExists(order.id.clone()));
		}
		self.storage
			.store(Self::namespace(), &order.id, order)
			.await?;
		self.event_bus
			.publish(FulfillmentEvent::Order(OrderEvent::Changed {
				order: order.clone(),
			}));
		Ok(())
	}

	/// Applies `updater` to the current order under its lock and writes the
	/// result back with a fresh `updated_at`.
	///
	/// If the updater fails nothing is written and its error is returned.
	pub async fn update_with<F, E>(&self, order_id: &str, updater: F) -> Result<Order, E>
	where
		F: FnOnce(&mut Order) -> Result<(), E>,
		E: From<StoreError>,
	{
		let _guard = self.storage.lock(Self::namespace(), order_id).await;
		let mut order = self.load(order_id).await?;

		updater(&mut order)?;
		order.updated_at = current_timestamp().max(order.created_at);

		self.storage
			.update(Self::namespace(), order_id, &order)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => StoreError::NotFound(order_id.to_string()),
				other => other.into(),
			})?;
		self.event_bus
			.publish(FulfillmentEvent::Order(OrderEvent::Changed {
				order: order.clone(),
			}));
		Ok(order)
	}

	/// Hard-deletes an order.
	pub async fn delete(&self, order_id: &str) -> Result<(), StoreError> {
		let _guard = self.storage.lock(Self::namespace(), order_id).await;
		if !self.storage.exists(Self::namespace(), order_id).await? {
			return Err(StoreError::NotFound(order_id.to_string()));
		}
		self.storage.remove(Self::namespace(), order_id).await?;
		self.event_bus
			.publish(FulfillmentEvent::Order(OrderEvent::Deleted {
				order_id: order_id.to_string(),
			}));
		Ok(())
	}
}
