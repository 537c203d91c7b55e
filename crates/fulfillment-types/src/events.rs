//! Event types published on the fulfillment event bus.
//!
//! The order store publishes `Order` events for every committed write; the
//! state machine adds `Transition` events; the side-effect orchestrator
//! reports what happened downstream through `Effect` events. The live view
//! and the HTTP layer consume them.

use crate::{Actor, Order, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Main event type carried by the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FulfillmentEvent {
	/// Changes to the stored order collection.
	Order(OrderEvent),
	/// Committed status transitions.
	Transition(TransitionEvent),
	/// Results of post-commit side effects.
	Effect(EffectEvent),
}

/// Changes to the stored order collection, in commit order per order id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// An order was created or updated; carries the committed document.
	Changed { order: Order },
	/// An order was hard-deleted by an administrator.
	Deleted { order_id: String },
}

/// A status change that has been persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
	pub order_id: String,
	pub from: OrderStatus,
	pub to: OrderStatus,
	pub actor: Actor,
	/// True for administrative overrides.
	pub administrative: bool,
}

/// Side-effect observability events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EffectEvent {
	/// One effect failed or timed out. The transition itself stands.
	Failed {
		order_id: String,
		kind: EffectKind,
		error: String,
	},
	/// All effects for a transition have finished.
	Completed { report: EffectReport },
}

/// The independent side effects a transition can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
	CancellationNotice,
	PartialRefund,
	ShortfallNotice,
	FulfillmentIssue,
	ReadyNotice,
}

impl fmt::Display for EffectKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			EffectKind::CancellationNotice => "cancellation_notice",
			EffectKind::PartialRefund => "partial_refund",
			EffectKind::ShortfallNotice => "shortfall_notice",
			EffectKind::FulfillmentIssue => "fulfillment_issue",
			EffectKind::ReadyNotice => "ready_notice",
		};
		f.write_str(name)
	}
}

/// How a single side effect ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EffectStatus {
	Succeeded,
	/// Nothing to do, e.g. the customer has no notification address.
	Skipped { reason: String },
	Failed { error: String },
	TimedOut,
}

impl EffectStatus {
	pub fn is_failure(&self) -> bool {
		matches!(self, EffectStatus::Failed { .. } | EffectStatus::TimedOut)
	}
}

/// Outcome of one side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectOutcome {
	pub kind: EffectKind,
	#[serde(flatten)]
	pub status: EffectStatus,
}

impl EffectOutcome {
	pub fn succeeded(kind: EffectKind) -> Self {
		Self {
			kind,
			status: EffectStatus::Succeeded,
		}
	}

	pub fn skipped(kind: EffectKind, reason: impl Into<String>) -> Self {
		Self {
			kind,
			status: EffectStatus::Skipped {
				reason: reason.into(),
			},
		}
	}

	pub fn failed(kind: EffectKind, error: impl Into<String>) -> Self {
		Self {
			kind,
			status: EffectStatus::Failed {
				error: error.into(),
			},
		}
	}

	pub fn timed_out(kind: EffectKind) -> Self {
		Self {
			kind,
			status: EffectStatus::TimedOut,
		}
	}
}

/// Everything the orchestrator did for one committed transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectReport {
	pub order_id: String,
	pub outcomes: Vec<EffectOutcome>,
	/// Shortfall amount computed for an acceptance with unavailable items.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub shortfall_amount: Option<Decimal>,
	/// Amount the refund service actually refunded, zero when none.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refunded_amount: Option<Decimal>,
}

impl EffectReport {
	pub fn new(order_id: impl Into<String>) -> Self {
		Self {
			order_id: order_id.into(),
			..Default::default()
		}
	}

	/// Returns the outcome recorded for `kind`, if that effect ran.
	pub fn outcome(&self, kind: EffectKind) -> Option<&EffectStatus> {
		self.outcomes
			.iter()
			.find(|o| o.kind == kind)
			.map(|o| &o.status)
	}

	pub fn failures(&self) -> impl Iterator<Item = &EffectOutcome> {
		self.outcomes.iter().filter(|o| o.status.is_failure())
	}
}
