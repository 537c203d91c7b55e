//! Notification request types shared by the orchestrator and the
//! notification backends.

use crate::UnavailableItem;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of customer notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
	OrderCancelled,
	OrderAcceptedWithUnavailable,
	OrderReady,
}

impl NotificationType {
	pub fn as_str(&self) -> &'static str {
		match self {
			NotificationType::OrderCancelled => "order_cancelled",
			NotificationType::OrderAcceptedWithUnavailable => "order_accepted_with_unavailable",
			NotificationType::OrderReady => "order_ready",
		}
	}
}

impl fmt::Display for NotificationType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Content of a notification. The variant determines its [`NotificationType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationPayload {
	OrderCancelled {
		reason: String,
		business_name: String,
	},
	OrderAcceptedWithUnavailable {
		items: Vec<UnavailableItem>,
		refund_amount: Decimal,
		business_name: String,
	},
	OrderReady {
		order_number: String,
		business_name: String,
		dine_in: bool,
		table_service: bool,
	},
}

impl NotificationPayload {
	pub fn notification_type(&self) -> NotificationType {
		match self {
			NotificationPayload::OrderCancelled { .. } => NotificationType::OrderCancelled,
			NotificationPayload::OrderAcceptedWithUnavailable { .. } => {
				NotificationType::OrderAcceptedWithUnavailable
			}
			NotificationPayload::OrderReady { .. } => NotificationType::OrderReady,
		}
	}
}

/// A notification addressed to one recipient about one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
	pub order_id: String,
	pub recipient: String,
	pub payload: NotificationPayload,
}

impl Notification {
	pub fn new(
		order_id: impl Into<String>,
		recipient: impl Into<String>,
		payload: NotificationPayload,
	) -> Self {
		Self {
			order_id: order_id.into(),
			recipient: recipient.into(),
			payload,
		}
	}

	pub fn notification_type(&self) -> NotificationType {
		self.payload.notification_type()
	}
}
