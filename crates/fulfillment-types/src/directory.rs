//! Business and customer records consulted by side effects.

use serde::{Deserialize, Serialize};

/// Per-business settings and the running fulfillment-quality counter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessProfile {
	#[serde(default)]
	pub name: String,
	/// Whether staff bring orders to the table.
	#[serde(default)]
	pub table_service: bool,
	/// Number of acceptances with a shortfall. Only ever incremented.
	#[serde(default)]
	pub fulfillment_issues: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_issue_at: Option<u64>,
}

/// How to reach a customer with notifications.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerContact {
	#[serde(default)]
	pub display_name: String,
	/// Push/notification address. Empty means unreachable.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notification_token: Option<String>,
}

impl CustomerContact {
	/// Returns the notification address if one is set.
	pub fn address(&self) -> Option<&str> {
		self.notification_token
			.as_deref()
			.map(str::trim)
			.filter(|t| !t.is_empty())
	}
}

/// Name of the counter field on [`BusinessProfile`] documents.
pub const FULFILLMENT_ISSUES_FIELD: &str = "fulfillmentIssues";
/// Name of the last-issue timestamp field on [`BusinessProfile`] documents.
pub const LAST_ISSUE_AT_FIELD: &str = "lastIssueAt";
