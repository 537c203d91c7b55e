//! Storage namespaces for the fulfillment system.

use std::str::FromStr;

/// Document collections kept in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order documents, including their checklist.
	Orders,
	/// Business profiles and fulfillment counters.
	Businesses,
	/// Customer contact records.
	Customers,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Businesses => "businesses",
			StorageKey::Customers => "customers",
		}
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Orders, Self::Businesses, Self::Customers].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"businesses" => Ok(Self::Businesses),
			"customers" => Ok(Self::Customers),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
