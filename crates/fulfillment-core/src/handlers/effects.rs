//! Side-effect orchestrator.
//!
//! Runs the best-effort actions a committed transition triggers: cancellation
//! notice, partial refund followed by the shortfall notice, the business
//! fulfillment-issue counter and the ready notice. Each effect runs in its own
//! task under its own timeout; a failure in one never stops the others and is
//! reported as an [`EffectOutcome`], never as an error. The transition that
//! triggered them is already committed and stays authoritative.

use crate::engine::event_bus::EventBus;
use crate::state::CommittedTransition;
use fulfillment_notification::{NotificationError, NotificationService};
use fulfillment_refund::{RefundError, RefundService};
use fulfillment_storage::{StorageError, StorageService};
use fulfillment_types::{
	current_timestamp, shortfall_amount, truncate_id, BusinessProfile, CustomerContact,
	EffectEvent, EffectKind, EffectOutcome, EffectReport, EffectStatus, FulfillmentEvent,
	Notification, NotificationPayload, Order, OrderStatus, StorageKey, FULFILLMENT_ISSUES_FIELD,
	LAST_ISSUE_AT_FIELD,
};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Upper bound on effect tasks running at once across all orders.
const MAX_CONCURRENT_EFFECTS: usize = 100;

/// Errors from collaborator calls made by effects.
trait EffectError: Display {
	fn is_timeout(&self) -> bool {
		false
	}
}

impl EffectError for NotificationError {
	fn is_timeout(&self) -> bool {
		matches!(self, NotificationError::Timeout(_))
	}
}

impl EffectError for RefundError {
	fn is_timeout(&self) -> bool {
		matches!(self, RefundError::Timeout(_))
	}
}

impl EffectError for StorageError {}

/// Executes the side effects of committed transitions.
#[derive(Clone)]
pub struct SideEffectOrchestrator {
	storage: Arc<StorageService>,
	notifications: Arc<NotificationService>,
	refunds: Arc<RefundService>,
	event_bus: EventBus,
	timeout: Duration,
	permits: Arc<Semaphore>,
}

impl SideEffectOrchestrator {
	pub fn new(
		storage: Arc<StorageService>,
		notifications: Arc<NotificationService>,
		refunds: Arc<RefundService>,
		event_bus: EventBus,
		timeout: Duration,
	) -> Self {
		Self {
			storage,
			notifications,
			refunds,
			event_bus,
			timeout,
			permits: Arc::new(Semaphore::new(MAX_CONCURRENT_EFFECTS)),
		}
	}

	/// Starts the effects of `committed` and returns immediately.
	///
	/// The handle resolves to the report once every effect has finished. The
	/// report and each failure are also published on the event bus.
	/// Re-entering the status an order already had triggers nothing.
	pub fn dispatch(&self, committed: &CommittedTransition) -> JoinHandle<EffectReport> {
		let order = committed.order.clone();
		let mut steps: Vec<(Vec<EffectKind>, JoinHandle<EffectReport>)> = Vec::new();

		if committed.from != order.status {
			match order.status {
				OrderStatus::Cancelled => {
					steps.push(self.spawn_step(
						vec![EffectKind::CancellationNotice],
						order.clone(),
						|this, order| async move { this.cancellation_notice(&order).await },
					));
				},
				OrderStatus::Accepted if !committed.request.unavailable.is_empty() => {
					steps.push(self.spawn_step(
						vec![EffectKind::PartialRefund, EffectKind::ShortfallNotice],
						order.clone(),
						|this, order| async move { this.refund_and_notify(&order).await },
					));
					steps.push(self.spawn_step(
						vec![EffectKind::FulfillmentIssue],
						order.clone(),
						|this, order| async move { this.record_fulfillment_issue(&order).await },
					));
				},
				OrderStatus::Ready => {
					steps.push(self.spawn_step(
						vec![EffectKind::ReadyNotice],
						order.clone(),
						|this, order| async move { this.ready_notice(&order).await },
					));
				},
				_ => {},
			}
		}

		let event_bus = self.event_bus.clone();
		tokio::spawn(async move {
			let (kinds, handles): (Vec<_>, Vec<_>) = steps.into_iter().unzip();
			let mut report = EffectReport::new(order.id.clone());

			for (kinds, joined) in kinds.into_iter().zip(join_all(handles).await) {
				match joined {
					Ok(part) => {
						report.outcomes.extend(part.outcomes);
						report.shortfall_amount = report.shortfall_amount.or(part.shortfall_amount);
						report.refunded_amount = report.refunded_amount.or(part.refunded_amount);
					},
					Err(e) => {
						tracing::error!(order_id = %truncate_id(&order.id), "Effect task aborted: {}", e);
						report.outcomes.extend(
							kinds
								.into_iter()
								.map(|kind| EffectOutcome::failed(kind, format!("task aborted: {}", e))),
						);
					},
				}
			}

			for failure in report.failures() {
				let error = match &failure.status {
					EffectStatus::Failed { error } => error.clone(),
					_ => "timed out".to_string(),
				};
				event_bus.publish(FulfillmentEvent::Effect(EffectEvent::Failed {
					order_id: report.order_id.clone(),
					kind: failure.kind,
					error,
				}));
			}
			event_bus.publish(FulfillmentEvent::Effect(EffectEvent::Completed {
				report: report.clone(),
			}));
			report
		})
	}

	/// Spawns one independent effect task, bounded by the shared permit pool.
	fn spawn_step<F, Fut>(
		&self,
		kinds: Vec<EffectKind>,
		order: Order,
		step: F,
	) -> (Vec<EffectKind>, JoinHandle<EffectReport>)
	where
		F: FnOnce(SideEffectOrchestrator, Order) -> Fut + Send + 'static,
		Fut: Future<Output = EffectReport> + Send + 'static,
	{
		let this = self.clone();
		let handle = tokio::spawn(async move {
			let _permit = this.permits.clone().acquire_owned().await;
			step(this, order).await
		});
		(kinds, handle)
	}

	/// Runs one collaborator call under the effect timeout.
	async fn bounded<T, E, Fut>(&self, kind: EffectKind, call: Fut) -> Result<T, EffectOutcome>
	where
		E: EffectError,
		Fut: Future<Output = Result<T, E>>,
	{
		match tokio::time::timeout(self.timeout, call).await {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(e)) if e.is_timeout() => Err(EffectOutcome::timed_out(kind)),
			Ok(Err(e)) => Err(EffectOutcome::failed(kind, e.to_string())),
			Err(_) => Err(EffectOutcome::timed_out(kind)),
		}
	}

	fn log_outcome(order: &Order, outcome: &EffectOutcome) {
		let order_id = truncate_id(&order.id);
		match &outcome.status {
			EffectStatus::Succeeded => {
				tracing::info!(order_id = %order_id, effect = %outcome.kind, "Side effect succeeded")
			},
			EffectStatus::Skipped { reason } => {
				tracing::debug!(order_id = %order_id, effect = %outcome.kind, reason = %reason, "Side effect skipped")
			},
			EffectStatus::Failed { error } => {
				tracing::warn!(order_id = %order_id, effect = %outcome.kind, error = %error, "Side effect failed")
			},
			EffectStatus::TimedOut => {
				tracing::warn!(order_id = %order_id, effect = %outcome.kind, "Side effect timed out")
			},
		}
	}

	fn finish(order: &Order, outcomes: Vec<EffectOutcome>) -> EffectReport {
		for outcome in &outcomes {
			Self::log_outcome(order, outcome);
		}
		EffectReport {
			order_id: order.id.clone(),
			outcomes,
			..Default::default()
		}
	}

	/// Looks up the customer's notification address.
	///
	/// `Err` carries the outcome to report when there is nobody to notify.
	async fn recipient(&self, kind: EffectKind, order: &Order) -> Result<String, EffectOutcome> {
		if order.customer_id.trim().is_empty() {
			return Err(EffectOutcome::skipped(kind, "order has no customer"));
		}
		let contact = self
			.bounded(
				kind,
				self.storage.retrieve_optional::<CustomerContact>(
					StorageKey::Customers.as_str(),
					&order.customer_id,
				),
			)
			.await?;
		contact
			.as_ref()
			.and_then(CustomerContact::address)
			.map(str::to_string)
			.ok_or_else(|| EffectOutcome::skipped(kind, "customer has no notification address"))
	}

	/// Business profile lookup that never fails the effect.
	async fn business_profile(&self, order: &Order) -> Option<BusinessProfile> {
		if order.business_id.trim().is_empty() {
			return None;
		}
		let lookup = self.storage.retrieve_optional::<BusinessProfile>(
			StorageKey::Businesses.as_str(),
			&order.business_id,
		);
		match tokio::time::timeout(self.timeout, lookup).await {
			Ok(Ok(profile)) => profile,
			Ok(Err(e)) => {
				tracing::warn!(business_id = %order.business_id, error = %e, "Business lookup failed");
				None
			},
			Err(_) => {
				tracing::warn!(business_id = %order.business_id, "Business lookup timed out");
				None
			},
		}
	}

	/// Denormalized business name, falling back to the profile.
	async fn business_name(&self, order: &Order) -> String {
		if !order.business_name.trim().is_empty() {
			return order.business_name.clone();
		}
		self.business_profile(order)
			.await
			.map(|p| p.name)
			.unwrap_or_default()
	}

	async fn send(&self, kind: EffectKind, order: &Order, payload: NotificationPayload) -> EffectOutcome {
		let recipient = match self.recipient(kind, order).await {
			Ok(recipient) => recipient,
			Err(outcome) => return outcome,
		};
		let notification = Notification::new(order.id.clone(), recipient, payload);
		match self
			.bounded(kind, self.notifications.notify(&notification))
			.await
		{
			Ok(()) => EffectOutcome::succeeded(kind),
			Err(outcome) => outcome,
		}
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id)))]
	async fn cancellation_notice(&self, order: &Order) -> EffectReport {
		let business_name = self.business_name(order).await;
		let payload = NotificationPayload::OrderCancelled {
			reason: order.cancellation_reason.clone().unwrap_or_default(),
			business_name,
		};
		let outcome = self.send(EffectKind::CancellationNotice, order, payload).await;
		Self::finish(order, vec![outcome])
	}

	/// Partial refund for card-equivalent payments, then the shortfall notice
	/// whatever the refund did. A failed refund is notified as zero.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id)))]
	async fn refund_and_notify(&self, order: &Order) -> EffectReport {
		let items = &order.unavailable_items;
		let shortfall = shortfall_amount(items);

		let (refund_outcome, refunded) = if !self.refunds.is_card_payment(&order.payment_method) {
			(
				EffectOutcome::skipped(
					EffectKind::PartialRefund,
					format!("payment method '{}' is not refundable", order.payment_method),
				),
				Decimal::ZERO,
			)
		} else if shortfall <= Decimal::ZERO {
			(
				EffectOutcome::skipped(EffectKind::PartialRefund, "nothing to refund"),
				Decimal::ZERO,
			)
		} else {
			match self
				.bounded(
					EffectKind::PartialRefund,
					self.refunds.request_partial_refund(&order.id, items),
				)
				.await
			{
				Ok(result) if result.refunded => (
					EffectOutcome::succeeded(EffectKind::PartialRefund),
					result.refund_amount,
				),
				Ok(_) => (
					EffectOutcome::failed(EffectKind::PartialRefund, "refund service declined"),
					Decimal::ZERO,
				),
				Err(outcome) => (outcome, Decimal::ZERO),
			}
		};

		let business_name = self.business_name(order).await;
		let payload = NotificationPayload::OrderAcceptedWithUnavailable {
			items: items.clone(),
			refund_amount: refunded,
			business_name,
		};
		let notice = self.send(EffectKind::ShortfallNotice, order, payload).await;

		let mut report = Self::finish(order, vec![refund_outcome, notice]);
		report.shortfall_amount = Some(shortfall);
		report.refunded_amount = Some(refunded);
		report
	}

	/// Adds one to the business's issue counter and stamps the time.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id)))]
	async fn record_fulfillment_issue(&self, order: &Order) -> EffectReport {
		let kind = EffectKind::FulfillmentIssue;
		if order.business_id.trim().is_empty() {
			return Self::finish(order, vec![EffectOutcome::skipped(kind, "order has no business")]);
		}

		let namespace = StorageKey::Businesses.as_str();
		let business_id = order.business_id.as_str();
		let update = async {
			let issues = self
				.storage
				.increment(namespace, business_id, FULFILLMENT_ISSUES_FIELD, 1)
				.await?;
			let now = current_timestamp();
			self.storage
				.update_with::<serde_json::Value, _>(namespace, business_id, |doc| {
					if let Some(fields) = doc.as_object_mut() {
						fields.insert(LAST_ISSUE_AT_FIELD.to_string(), now.into());
					}
				})
				.await?;
			Ok::<_, StorageError>(issues)
		};

		let outcome = match self.bounded(kind, update).await {
			Ok(issues) => {
				tracing::debug!(business_id = %business_id, issues, "Fulfillment issue recorded");
				EffectOutcome::succeeded(kind)
			},
			Err(outcome) => outcome,
		};
		Self::finish(order, vec![outcome])
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id)))]
	async fn ready_notice(&self, order: &Order) -> EffectReport {
		let profile = self.business_profile(order).await;
		let business_name = if order.business_name.trim().is_empty() {
			profile.as_ref().map(|p| p.name.clone()).unwrap_or_default()
		} else {
			order.business_name.clone()
		};
		let payload = NotificationPayload::OrderReady {
			order_number: order.order_number.clone(),
			business_name,
			dine_in: order.is_dine_in(),
			table_service: profile.is_some_and(|p| p.table_service),
		};
		let outcome = self.send(EffectKind::ReadyNotice, order, payload).await;
		Self::finish(order, vec![outcome])
	}
}
