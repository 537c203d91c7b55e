//! Registry of every built-in implementation factory.
//!
//! The registry is filled once from each backend crate's
//! `get_all_implementations` and then consulted to build an engine from the
//! implementation names a configuration mentions.

use fulfillment_config::Config;
use fulfillment_core::{BuilderError, FulfillmentBuilder, FulfillmentEngine, FulfillmentFactories};
use fulfillment_notification::NotificationFactory;
use fulfillment_refund::RefundFactory;
use fulfillment_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global registry for all implementation factories.
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub notification: HashMap<String, NotificationFactory>,
	pub refund: HashMap<String, RefundFactory>,
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

fn collect<F: Copy>(kind: &str, implementations: Vec<(&'static str, F)>) -> HashMap<String, F> {
	implementations
		.into_iter()
		.map(|(name, factory)| {
			tracing::debug!(kind, implementation = name, "Registering implementation");
			(name.to_string(), factory)
		})
		.collect()
}

/// Returns the registry, filling it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| FactoryRegistry {
		storage: collect("storage", fulfillment_storage::get_all_implementations()),
		notification: collect(
			"notification",
			fulfillment_notification::get_all_implementations(),
		),
		refund: collect("refund", fulfillment_refund::get_all_implementations()),
	})
}

/// Picks the factories named in `configured`, rejecting unknown names.
fn select<F: Copy>(
	kind: &str,
	registry: &HashMap<String, F>,
	configured: &HashMap<String, toml::Value>,
) -> Result<HashMap<String, F>, BuilderError> {
	let mut factories = HashMap::new();
	for name in configured.keys() {
		let Some(factory) = registry.get(name) else {
			let mut available: Vec<_> = registry.keys().cloned().collect();
			available.sort();
			return Err(BuilderError::Config(format!(
				"Unknown {} implementation '{}'. Available: [{}]",
				kind,
				name,
				available.join(", ")
			)));
		};
		factories.insert(name.clone(), *factory);
	}
	Ok(factories)
}

/// Builds the engine from the registry and the configured implementations.
pub fn build_engine_from_config(config: Config) -> Result<FulfillmentEngine, BuilderError> {
	let registry = get_registry();

	let factories = FulfillmentFactories {
		storage_factories: select("storage", &registry.storage, &config.storage.implementations)?,
		notification_factories: select(
			"notification",
			&registry.notification,
			&config.notification.implementations,
		)?,
		refund_factories: select("refund", &registry.refund, &config.refund.implementations)?,
	};

	FulfillmentBuilder::new(config).build(factories)
}
