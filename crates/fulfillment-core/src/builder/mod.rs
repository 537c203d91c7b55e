//! Builder pattern for constructing fulfillment engines.
//!
//! Composes a [`FulfillmentEngine`] from the configured storage, notification
//! and refund implementations using factory functions keyed by
//! implementation name.

use crate::engine::{event_bus::EventBus, FulfillmentEngine};
use crate::handlers::SideEffectOrchestrator;
use fulfillment_config::Config;
use fulfillment_notification::{NotificationError, NotificationInterface, NotificationService};
use fulfillment_refund::{RefundError, RefundInterface, RefundService};
use fulfillment_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation name.
pub struct FulfillmentFactories<SF, NF, RF> {
	pub storage_factories: HashMap<String, SF>,
	pub notification_factories: HashMap<String, NF>,
	pub refund_factories: HashMap<String, RF>,
}

/// Instantiates every configured implementation of one component and returns
/// the primary one.
///
/// All configured implementations are created so that a broken secondary
/// table fails at startup rather than on first use.
fn load_primary<T, E, F>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	T: ?Sized,
	E: Display,
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "Unknown implementation, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"no valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

/// Builder for constructing a FulfillmentEngine with pluggable implementations.
pub struct FulfillmentBuilder {
	config: Config,
}

impl FulfillmentBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine using factories for each component type.
	pub fn build<SF, NF, RF>(
		self,
		factories: FulfillmentFactories<SF, NF, RF>,
	) -> Result<FulfillmentEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		NF: Fn(&toml::Value) -> Result<Box<dyn NotificationInterface>, NotificationError>,
		RF: Fn(&toml::Value) -> Result<Box<dyn RefundInterface>, RefundError>,
	{
		let config = self.config;
		let timeout = config.side_effect_timeout();

		let storage = Arc::new(StorageService::new(load_primary(
			"storage",
			&config.storage.primary,
			&config.storage.implementations,
			&factories.storage_factories,
		)?));

		let notifications = Arc::new(NotificationService::new(
			load_primary(
				"notification",
				&config.notification.primary,
				&config.notification.implementations,
				&factories.notification_factories,
			)?,
			timeout,
		));

		let refunds = Arc::new(RefundService::new(
			load_primary(
				"refund",
				&config.refund.primary,
				&config.refund.implementations,
				&factories.refund_factories,
			)?,
			timeout,
			&config.refund.card_methods,
		));

		let event_bus = EventBus::default();
		let orchestrator = SideEffectOrchestrator::new(
			storage.clone(),
			notifications,
			refunds,
			event_bus.clone(),
			timeout,
		);

		Ok(FulfillmentEngine::new(config, storage, orchestrator, event_bus))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_config::ConfigBuilder;

	fn factories() -> FulfillmentFactories<
		fulfillment_storage::StorageFactory,
		fulfillment_notification::NotificationFactory,
		fulfillment_refund::RefundFactory,
	> {
		FulfillmentFactories {
			storage_factories: fulfillment_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			notification_factories: fulfillment_notification::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			refund_factories: fulfillment_refund::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	#[tokio::test]
	async fn test_builds_from_default_config() {
		let engine = FulfillmentBuilder::new(ConfigBuilder::new().build())
			.build(factories())
			.unwrap();
		assert_eq!(engine.config().service.id, "test-kitchen");
	}

	#[test]
	fn test_unknown_primary_is_rejected() {
		let mut config = ConfigBuilder::new().build();
		config.refund.primary = "carrier-pigeon".to_string();
		config
			.refund
			.implementations
			.insert("carrier-pigeon".to_string(), toml::Value::Table(toml::Table::new()));

		let err = match FulfillmentBuilder::new(config).build(factories()) {
			Err(e) => e,
			Ok(_) => panic!("expected a builder error"),
		};
		assert!(matches!(err, BuilderError::Config(msg) if msg.contains("carrier-pigeon")));
	}

	#[test]
	fn test_invalid_implementation_table_fails_fast() {
		let mut config = ConfigBuilder::new().build();
		config.notification.implementations.insert(
			"webhook".to_string(),
			toml::Value::Table(toml::Table::new()),
		);

		let err = match FulfillmentBuilder::new(config).build(factories()) {
			Err(e) => e,
			Ok(_) => panic!("expected a builder error"),
		};
		assert!(err.to_string().contains("webhook"));
	}
}
