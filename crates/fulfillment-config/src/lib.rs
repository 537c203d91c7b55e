//! Configuration module for the fulfillment service.
//!
//! This module provides the structures and loading logic for the service
//! configuration. Configuration is read from TOML, environment references of
//! the form `${VAR}` or `${VAR:-default}` are expanded, and the result is
//! validated before use.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

pub mod builders {
	pub mod config;
}
mod loader;

pub use builders::config::ConfigBuilder;

use fulfillment_types::TimeWindow;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Report the message only, not the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the fulfillment service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity and side-effect limits of this service instance.
	pub service: ServiceConfig,
	/// Order store backend.
	pub storage: StorageConfig,
	/// Customer notification backend.
	pub notification: NotificationConfig,
	/// Partial refund backend and policy.
	pub refund: RefundConfig,
	/// Live view defaults.
	#[serde(default)]
	pub live_view: LiveViewConfig,
	/// HTTP API server. Absent means no server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
	/// Upper bound for each individual side effect (notification, refund,
	/// counter update). A side effect that exceeds it is reported as timed out.
	#[serde(default = "default_side_effect_timeout_seconds")]
	pub side_effect_timeout_seconds: u64,
}

fn default_side_effect_timeout_seconds() -> u64 {
	10
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the notification backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the refund backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefundConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Payment methods treated as card-equivalent, compared case-insensitively.
	/// Orders paid any other way never get a partial refund request.
	#[serde(default = "default_card_methods")]
	pub card_methods: Vec<String>,
}

/// Card-equivalent payment methods used when none are configured.
pub fn default_card_methods() -> Vec<String> {
	[
		"card",
		"credit_card",
		"debit_card",
		"online",
		"apple_pay",
		"google_pay",
	]
	.iter()
	.map(|m| m.to_string())
	.collect()
}

/// Live view settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LiveViewConfig {
	/// Window used when a board request does not name one.
	#[serde(default)]
	pub default_window: TimeWindow,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			host: default_api_host(),
			port: default_api_port(),
			timeout_seconds: default_api_timeout(),
			max_request_size: default_max_request_size(),
		}
	}
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

/// Checks that `primary` names one of the configured implementations.
fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Returns the per-side-effect timeout.
	pub fn side_effect_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.service.side_effect_timeout_seconds)
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// - Ensures the service ID is not empty
	/// - Bounds the side-effect timeout to 1..=300 seconds
	/// - Checks every backend section names an existing primary implementation
	/// - Requires at least one card-equivalent payment method
	/// - Rejects an enabled API bound to port 0
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}
		if self.service.side_effect_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"side_effect_timeout_seconds must be at least 1".into(),
			));
		}
		if self.service.side_effect_timeout_seconds > 300 {
			return Err(ConfigError::Validation(
				"side_effect_timeout_seconds cannot exceed 300".into(),
			));
		}

		validate_primary(
			"storage",
			&self.storage.primary,
			&self.storage.implementations,
		)?;
		validate_primary(
			"notification",
			&self.notification.primary,
			&self.notification.implementations,
		)?;
		validate_primary("refund", &self.refund.primary, &self.refund.implementations)?;

		if self.refund.card_methods.is_empty() {
			return Err(ConfigError::Validation(
				"refund.card_methods must list at least one payment method".into(),
			));
		}
		if self.refund.card_methods.iter().any(|m| m.trim().is_empty()) {
			return Err(ConfigError::Validation(
				"refund.card_methods cannot contain empty entries".into(),
			));
		}

		if let Some(api) = self.api.as_ref().filter(|api| api.enabled) {
			if api.port == 0 {
				return Err(ConfigError::Validation("API port cannot be 0".into()));
			}
			if api.timeout_seconds == 0 {
				return Err(ConfigError::Validation(
					"API timeout_seconds must be at least 1".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[service]
id = "downtown-kitchen"

[storage]
primary = "memory"
[storage.implementations.memory]

[notification]
primary = "log"
[notification.implementations.log]

[refund]
primary = "simulated"
[refund.implementations.simulated]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("FULFILLMENT_TEST_HOST", "localhost");
		std::env::set_var("FULFILLMENT_TEST_PORT", "5432");

		let input = "host = \"${FULFILLMENT_TEST_HOST}:${FULFILLMENT_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("FULFILLMENT_TEST_HOST");
		std::env::remove_var("FULFILLMENT_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${FULFILLMENT_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${FULFILLMENT_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("FULFILLMENT_MISSING_VAR"));
	}

	#[test]
	fn test_minimal_config_defaults() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.service.id, "downtown-kitchen");
		assert_eq!(config.service.side_effect_timeout_seconds, 10);
		assert_eq!(config.refund.card_methods, default_card_methods());
		assert_eq!(config.live_view.default_window, TimeWindow::Today);
		assert!(config.api.is_none());
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("FULFILLMENT_TEST_SERVICE_ID", "harbour-bazaar");

		let config_str = MINIMAL.replace("downtown-kitchen", "${FULFILLMENT_TEST_SERVICE_ID}");
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.service.id, "harbour-bazaar");

		std::env::remove_var("FULFILLMENT_TEST_SERVICE_ID");
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let config_str = MINIMAL.replace("primary = \"log\"", "primary = \"webhook\"");
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err
			.to_string()
			.contains("Primary notification 'webhook' not found"));
	}

	#[test]
	fn test_side_effect_timeout_bounds() {
		let config_str = MINIMAL.replace(
			"id = \"downtown-kitchen\"",
			"id = \"downtown-kitchen\"\nside_effect_timeout_seconds = 0",
		);
		assert!(config_str.parse::<Config>().is_err());

		let config_str = MINIMAL.replace(
			"id = \"downtown-kitchen\"",
			"id = \"downtown-kitchen\"\nside_effect_timeout_seconds = 301",
		);
		assert!(config_str.parse::<Config>().is_err());
	}

	#[test]
	fn test_live_view_window_parsed() {
		let config_str = format!("{}\n[live_view]\ndefault_window = \"7d\"\n", MINIMAL);
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.live_view.default_window, TimeWindow::Last7Days);

		let config_str = format!("{}\n[live_view]\ndefault_window = \"fortnight\"\n", MINIMAL);
		assert!(matches!(
			config_str.parse::<Config>(),
			Err(ConfigError::Parse(_))
		));
	}

	#[test]
	fn test_empty_card_methods_rejected() {
		let config_str = MINIMAL.replace(
			"primary = \"simulated\"",
			"primary = \"simulated\"\ncard_methods = []",
		);
		assert!(config_str.parse::<Config>().is_err());
	}
}
