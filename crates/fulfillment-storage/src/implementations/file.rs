//! File-based storage backend.
//!
//! Each document is one JSON file under the configured directory. Writes go
//! to a temporary file that is renamed into place, so a crash never leaves a
//! half-written document. Counter increments additionally take an advisory
//! file lock so separate processes sharing the directory do not lose updates.

use crate::{apply_increment, StorageError, StorageFactory, StorageInterface};
use async_trait::async_trait;
use fs2::FileExt;
use fulfillment_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Default directory used when `storage_path` is not configured.
const DEFAULT_STORAGE_PATH: &str = "./data/storage";

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Maps a key to a filesystem-safe file name.
	fn sanitize(key: &str) -> String {
		key.replace(['/', ':', '\\'], "_")
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		self.base_path.join(format!("{}.json", Self::sanitize(key)))
	}
}

fn backend_error(e: impl std::fmt::Display) -> StorageError {
	StorageError::Backend(e.to_string())
}

/// Writes `bytes` to `path` through a temporary file and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
	let temp_path = path.with_extension("tmp");
	std::fs::write(&temp_path, bytes).map_err(backend_error)?;
	std::fs::rename(&temp_path, path).map_err(backend_error)
}

/// Blocking counter update guarded by an exclusive advisory lock.
fn increment_file(path: &Path, field: &str, delta: i64) -> Result<i64, StorageError> {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).map_err(backend_error)?;
	}

	let lock_file = std::fs::OpenOptions::new()
		.create(true)
		.truncate(false)
		.write(true)
		.open(path.with_extension("lock"))
		.map_err(backend_error)?;
	FileExt::lock_exclusive(&lock_file).map_err(backend_error)?;

	let mut document = match std::fs::read(path) {
		Ok(bytes) => serde_json::from_slice(&bytes)
			.map_err(|e| StorageError::Serialization(e.to_string()))?,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			serde_json::Value::Object(Default::default())
		},
		Err(e) => return Err(backend_error(e)),
	};
	let next = apply_increment(&mut document, field, delta)?;
	let bytes =
		serde_json::to_vec(&document).map_err(|e| StorageError::Serialization(e.to_string()))?;
	write_atomic(path, &bytes)?;

	// Dropping the handle releases the lock.
	drop(lock_file);
	Ok(next)
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match fs::read(self.get_file_path(key)).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(backend_error(e)),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await.map_err(backend_error)?;
		}

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value).await.map_err(backend_error)?;
		fs::rename(&temp_path, &path).await.map_err(backend_error)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		match fs::remove_file(&path).await {
			Ok(_) => {},
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
			Err(e) => return Err(backend_error(e)),
		}
		// Counter documents leave a lock file behind.
		let _ = fs::remove_file(path.with_extension("lock")).await;
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(backend_error)
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(backend_error(e)),
		};

		let file_prefix = Self::sanitize(prefix);
		let mut keys = Vec::new();
		while let Some(entry) = entries.next_entry().await.map_err(backend_error)? {
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("json")) {
				continue;
			}
			let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
				tracing::debug!("Skipping non UTF-8 file name {:?}", path);
				continue;
			};
			if let Some(rest) = stem.strip_prefix(&file_prefix) {
				keys.push(format!("{}{}", prefix, rest));
			}
		}
		Ok(keys)
	}

	async fn increment(&self, key: &str, field: &str, delta: i64) -> Result<i64, StorageError> {
		let path = self.get_file_path(key);
		let field = field.to_string();
		tokio::task::spawn_blocking(move || increment_file(&path, &field, delta))
			.await
			.map_err(backend_error)?
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(p) if p.trim().is_empty() => Err("storage_path cannot be empty".into()),
					_ => Ok(()),
				}
			})],
		)
		.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry entry for the file backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}
