//! Configuration builder for tests and local development.
//!
//! Produces a valid [`Config`] backed by the in-memory storage, the logging
//! notifier and the simulated refund service unless told otherwise.

use crate::{
	default_card_methods, ApiConfig, Config, LiveViewConfig, NotificationConfig, RefundConfig,
	ServiceConfig, StorageConfig,
};
use fulfillment_types::TimeWindow;
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	side_effect_timeout_seconds: u64,
	storage_primary: String,
	storage_implementations: HashMap<String, toml::Value>,
	notification_primary: String,
	refund_primary: String,
	card_methods: Vec<String>,
	default_window: TimeWindow,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::Table::new())
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			service_id: "test-kitchen".to_string(),
			side_effect_timeout_seconds: 2,
			storage_primary: "memory".to_string(),
			storage_implementations: HashMap::new(),
			notification_primary: "log".to_string(),
			refund_primary: "simulated".to_string(),
			card_methods: default_card_methods(),
			default_window: TimeWindow::All,
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	pub fn side_effect_timeout_seconds(mut self, seconds: u64) -> Self {
		self.side_effect_timeout_seconds = seconds;
		self
	}

	/// Uses the file backend rooted at `path`.
	pub fn file_storage(mut self, path: impl Into<String>) -> Self {
		let mut table = toml::Table::new();
		table.insert("storage_path".to_string(), toml::Value::String(path.into()));
		self.storage_primary = "file".to_string();
		self.storage_implementations
			.insert("file".to_string(), toml::Value::Table(table));
		self
	}

	pub fn card_methods(mut self, methods: Vec<String>) -> Self {
		self.card_methods = methods;
		self
	}

	pub fn default_window(mut self, window: TimeWindow) -> Self {
		self.default_window = window;
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let mut storage_implementations = self.storage_implementations;
		storage_implementations
			.entry(self.storage_primary.clone())
			.or_insert_with(empty_table);

		Config {
			service: ServiceConfig {
				id: self.service_id,
				side_effect_timeout_seconds: self.side_effect_timeout_seconds,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: storage_implementations,
			},
			notification: NotificationConfig {
				implementations: HashMap::from([(self.notification_primary.clone(), empty_table())]),
				primary: self.notification_primary,
			},
			refund: RefundConfig {
				implementations: HashMap::from([(self.refund_primary.clone(), empty_table())]),
				primary: self.refund_primary,
				card_methods: self.card_methods,
			},
			live_view: LiveViewConfig {
				default_window: self.default_window,
			},
			api: self.api,
		}
	}
}
