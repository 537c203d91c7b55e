//! Rolling creation-time windows used to filter the live view.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DAY_SECONDS: u64 = 24 * 60 * 60;

/// Creation-time window applied to the order set before bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeWindow {
	/// Since 00:00 UTC of the current day.
	#[default]
	#[serde(rename = "today")]
	Today,
	#[serde(rename = "7d")]
	Last7Days,
	#[serde(rename = "30d")]
	Last30Days,
	#[serde(rename = "all")]
	All,
}

impl TimeWindow {
	pub fn as_str(&self) -> &'static str {
		match self {
			TimeWindow::Today => "today",
			TimeWindow::Last7Days => "7d",
			TimeWindow::Last30Days => "30d",
			TimeWindow::All => "all",
		}
	}

	/// First creation timestamp inside the window, `None` for an unbounded window.
	pub fn start(&self, now: u64) -> Option<u64> {
		match self {
			TimeWindow::Today => Some(now - now % DAY_SECONDS),
			TimeWindow::Last7Days => Some(now.saturating_sub(7 * DAY_SECONDS)),
			TimeWindow::Last30Days => Some(now.saturating_sub(30 * DAY_SECONDS)),
			TimeWindow::All => None,
		}
	}

	pub fn contains(&self, created_at: u64, now: u64) -> bool {
		self.start(now).is_none_or(|start| created_at >= start)
	}
}

impl fmt::Display for TimeWindow {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for TimeWindow {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"today" => Ok(TimeWindow::Today),
			"7d" | "week" => Ok(TimeWindow::Last7Days),
			"30d" | "month" => Ok(TimeWindow::Last30Days),
			"all" => Ok(TimeWindow::All),
			other => Err(format!("unknown time window '{}'", other)),
		}
	}
}
