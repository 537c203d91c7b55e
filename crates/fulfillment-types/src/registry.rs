//! Registry trait for self-registering backend implementations.

/// Implemented by every backend module (storage, notification, refund) so the
/// service can map configuration names to factory functions.
pub trait ImplementationRegistry {
	/// Name used under `<section>.implementations.<NAME>` in the configuration.
	const NAME: &'static str;

	/// Factory function type of the section this implementation belongs to.
	type Factory;

	fn factory() -> Self::Factory;
}
