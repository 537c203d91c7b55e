//! In-memory storage backend.
//!
//! Fast and dependency-free; contents are lost on restart. Used in tests and
//! for local development.

use crate::{apply_increment, StorageError, StorageFactory, StorageInterface};
use async_trait::async_trait;
use fulfillment_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage implementation.
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store.contains_key(key))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.keys()
			.filter(|key| key.starts_with(prefix))
			.cloned()
			.collect())
	}

	async fn increment(&self, key: &str, field: &str, delta: i64) -> Result<i64, StorageError> {
		// The write lock is held across read and write, making this atomic.
		let mut store = self.store.write().await;
		let mut document = match store.get(key) {
			Some(bytes) => serde_json::from_slice(bytes)
				.map_err(|e| StorageError::Serialization(e.to_string()))?,
			None => serde_json::Value::Object(Default::default()),
		};
		let next = apply_increment(&mut document, field, delta)?;
		let bytes =
			serde_json::to_vec(&document).map_err(|e| StorageError::Serialization(e.to_string()))?;
		store.insert(key.to_string(), bytes);
		Ok(next)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Configuration schema for MemoryStorage. It takes no settings.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry entry for the memory backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		let key = "orders:o1";
		let value = b"{}".to_vec();
		storage.set_bytes(key, value.clone()).await.unwrap();
		assert_eq!(storage.get_bytes(key).await.unwrap(), value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_list_keys_by_prefix() {
		let storage = MemoryStorage::new();
		storage.set_bytes("orders:1", vec![]).await.unwrap();
		storage.set_bytes("orders:2", vec![]).await.unwrap();
		storage.set_bytes("customers:1", vec![]).await.unwrap();

		let mut keys = storage.list_keys("orders:").await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["orders:1", "orders:2"]);
	}

	#[tokio::test]
	async fn test_increment_creates_document() {
		let storage = MemoryStorage::new();
		assert_eq!(storage.increment("businesses:b1", "issues", 1).await.unwrap(), 1);
		assert_eq!(storage.increment("businesses:b1", "issues", 1).await.unwrap(), 2);

		let doc: serde_json::Value =
			serde_json::from_slice(&storage.get_bytes("businesses:b1").await.unwrap()).unwrap();
		assert_eq!(doc["issues"], 2);
	}
}
