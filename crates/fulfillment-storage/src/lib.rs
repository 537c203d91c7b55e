//! Storage module for the fulfillment system.
//!
//! Documents (orders, business profiles, customer contacts) are kept as JSON
//! under `namespace:id` keys in a pluggable byte-level backend. The
//! [`StorageService`] adds typed access, namespace listing, per-key serialized
//! read-modify-write and an add-only counter primitive on top of it.

use async_trait::async_trait;
use dashmap::DashMap;
use fulfillment_types::ConfigSchema;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface every storage backend implements.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value for the key. Deleting a missing key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists every stored key starting with `prefix`.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Atomically adds `delta` to the integer `field` of the JSON object stored
	/// at `key` and returns the new value. A missing document or field counts
	/// as zero.
	async fn increment(&self, key: &str, field: &str, delta: i64) -> Result<i64, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Factory signature every storage implementation provides.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Returns every built-in storage implementation as `(name, factory)`.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use fulfillment_types::ImplementationRegistry;
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Adds `delta` to an integer field of a JSON object document.
///
/// Shared by the backends so the counter semantics are identical everywhere.
pub(crate) fn apply_increment(
	document: &mut serde_json::Value,
	field: &str,
	delta: i64,
) -> Result<i64, StorageError> {
	let object = document.as_object_mut().ok_or_else(|| {
		StorageError::Serialization("counter target is not a JSON object".to_string())
	})?;
	let current = match object.get(field) {
		None | Some(serde_json::Value::Null) => 0,
		Some(value) => value.as_i64().ok_or_else(|| {
			StorageError::Serialization(format!("field '{}' is not an integer", field))
		})?,
	};
	let next = current
		.checked_add(delta)
		.ok_or_else(|| StorageError::Backend(format!("counter '{}' overflowed", field)))?;
	object.insert(field.to_string(), serde_json::Value::from(next));
	Ok(next)
}

/// High-level storage service with typed JSON documents.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
	/// Per-key locks serializing read-modify-write cycles within this process.
	locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Exclusive hold on one document, released on drop.
///
/// The lock entry is pruned once nobody holds or awaits it.
pub struct DocumentLock {
	guard: Option<OwnedMutexGuard<()>>,
	locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
	key: String,
}

impl Drop for DocumentLock {
	fn drop(&mut self) {
		self.guard.take();
		self.locks
			.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
	}
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			backend,
			locks: Arc::new(DashMap::new()),
		}
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Acquires the write lock for one document.
	///
	/// Every read-modify-write of a document must happen while holding this
	/// guard; writes to different documents never contend.
	pub async fn lock(&self, namespace: &str, id: &str) -> DocumentLock {
		let key = Self::key(namespace, id);
		let mutex = self
			.locks
			.entry(key.clone())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone();
		DocumentLock {
			guard: Some(mutex.lock_owned().await),
			locks: Arc::clone(&self.locks),
			key,
		}
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(namespace, id), bytes).await
	}

	/// Retrieves and deserializes a value.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Like [`retrieve`](Self::retrieve) but maps a missing document to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Retrieves every document of a namespace as `(id, value)` pairs.
	///
	/// Documents that vanish between listing and reading are skipped.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<(String, T)>, StorageError> {
		let prefix = format!("{}:", namespace);
		let mut keys = self.backend.list_keys(&prefix).await?;
		keys.sort();

		let mut documents = Vec::with_capacity(keys.len());
		for key in keys {
			let bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => bytes,
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			let value =
				serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
			documents.push((key[prefix.len()..].to_string(), value));
		}
		Ok(documents)
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		let key = Self::key(namespace, id);
		self.backend.delete(&key).await
	}

	/// Overwrites an existing value. Fails with `NotFound` if it does not exist.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = Self::key(namespace, id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes).await
	}

	/// Reads, mutates and writes back a document under its lock.
	///
	/// The document must already exist. Returns the value as written.
	pub async fn update_with<T, F>(
		&self,
		namespace: &str,
		id: &str,
		updater: F,
	) -> Result<T, StorageError>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce(&mut T),
	{
		let _guard = self.lock(namespace, id).await;
		let mut value: T = self.retrieve(namespace, id).await?;
		updater(&mut value);
		self.update(namespace, id, &value).await?;
		Ok(value)
	}

	/// Adds `delta` to a counter field, creating the document if needed.
	pub async fn increment(
		&self,
		namespace: &str,
		id: &str,
		field: &str,
		delta: i64,
	) -> Result<i64, StorageError> {
		let _guard = self.lock(namespace, id).await;
		self.backend
			.increment(&Self::key(namespace, id), field, delta)
			.await
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, Serialize, Deserialize, PartialEq)]
	struct Profile {
		name: String,
		#[serde(default)]
		visits: i64,
	}

	fn service() -> Arc<StorageService> {
		Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
	}

	#[tokio::test]
	async fn test_update_requires_existing_document() {
		let storage = service();
		let profile = Profile {
			name: "Corner Butcher".into(),
			visits: 0,
		};
		assert!(matches!(
			storage.update("businesses", "b1", &profile).await,
			Err(StorageError::NotFound)
		));

		storage.store("businesses", "b1", &profile).await.unwrap();
		let updated: Profile = storage
			.update_with("businesses", "b1", |p: &mut Profile| p.name = "Corner Deli".into())
			.await
			.unwrap();
		assert_eq!(updated.name, "Corner Deli");
	}

	#[tokio::test]
	async fn test_retrieve_all_strips_namespace() {
		let storage = service();
		for id in ["b", "a"] {
			let profile = Profile {
				name: id.to_uppercase(),
				visits: 0,
			};
			storage.store("businesses", id, &profile).await.unwrap();
		}
		storage
			.store("customers", "c1", &serde_json::json!({}))
			.await
			.unwrap();

		let all: Vec<(String, Profile)> = storage.retrieve_all("businesses").await.unwrap();
		let ids: Vec<_> = all.iter().map(|(id, _)| id.as_str()).collect();
		assert_eq!(ids, vec!["a", "b"]);
	}

	#[tokio::test]
	async fn test_concurrent_increments_are_not_lost() {
		let storage = service();
		storage
			.store(
				"businesses",
				"b1",
				&Profile {
					name: "Bazaar".into(),
					visits: 0,
				},
			)
			.await
			.unwrap();

		let mut handles = Vec::new();
		for _ in 0..50 {
			let storage = storage.clone();
			handles.push(tokio::spawn(async move {
				storage.increment("businesses", "b1", "visits", 1).await
			}));
		}
		for handle in handles {
			handle.await.unwrap().unwrap();
		}

		let profile: Profile = storage.retrieve("businesses", "b1").await.unwrap();
		assert_eq!(profile.visits, 50);
		assert_eq!(profile.name, "Bazaar");
	}

	#[tokio::test]
	async fn test_released_locks_are_pruned() {
		let storage = service();
		let held = storage.lock("orders", "o1").await;
		let waiter = {
			let storage = storage.clone();
			tokio::spawn(async move {
				let _guard = storage.lock("orders", "o1").await;
			})
		};
		tokio::task::yield_now().await;
		assert_eq!(storage.locks.len(), 1);

		drop(held);
		waiter.await.unwrap();
		assert!(storage.locks.is_empty());

		for i in 0..20 {
			storage
				.increment("businesses", &format!("b{}", i), "visits", 1)
				.await
				.unwrap();
		}
		assert!(storage.locks.is_empty());
	}

	#[test]
	fn test_apply_increment_rejects_non_integer() {
		let mut doc = serde_json::json!({ "visits": "many" });
		assert!(apply_increment(&mut doc, "visits", 1).is_err());

		let mut doc = serde_json::json!({});
		assert_eq!(apply_increment(&mut doc, "visits", 2).unwrap(), 2);
		assert_eq!(apply_increment(&mut doc, "visits", 3).unwrap(), 5);
	}
}
