//! Identity of the staff member performing an operation.
//!
//! The actor is passed explicitly into every operation that stamps audit
//! fields; there is no ambient session.

use serde::{Deserialize, Serialize};

/// The authenticated staff member on whose behalf a change is made.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
	pub id: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub email: String,
}

impl Actor {
	pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			email: email.into(),
		}
	}

	/// Name used in audit stamps: display name, then email, then id.
	pub fn display_name(&self) -> &str {
		if !self.name.trim().is_empty() {
			&self.name
		} else if !self.email.trim().is_empty() {
			&self.email
		} else {
			&self.id
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_display_name_fallbacks() {
		assert_eq!(Actor::new("u1", "Ayla", "a@x.io").display_name(), "Ayla");
		assert_eq!(Actor::new("u1", " ", "a@x.io").display_name(), "a@x.io");
		assert_eq!(Actor::new("u1", "", "").display_name(), "u1");
	}
}
