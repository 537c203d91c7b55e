//! End-to-end flows through the fulfillment engine with in-memory storage.

use async_trait::async_trait;
use fulfillment_config::{default_card_methods, ConfigBuilder};
use fulfillment_core::{
	DisplayBucket, EngineError, EventBus, FulfillmentEngine, NextAction, SideEffectOrchestrator,
	TransitionError,
};
use fulfillment_notification::{NotificationError, NotificationInterface, NotificationService};
use fulfillment_refund::implementations::simulated::SimulatedRefunds;
use fulfillment_refund::RefundService;
use fulfillment_storage::implementations::memory::{MemoryStorage, MemoryStorageSchema};
use fulfillment_storage::StorageService;
use fulfillment_types::{
	Actor, BusinessProfile, ConfigSchema, CustomerContact, EffectKind, EffectStatus, Notification,
	NotificationPayload, OrderStatus, TimeWindow,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Outbox(Arc<Mutex<Vec<Notification>>>);

impl Outbox {
	fn sent(&self) -> Vec<Notification> {
		self.0.lock().unwrap().clone()
	}
}

#[async_trait]
impl NotificationInterface for Outbox {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
		self.0.lock().unwrap().push(notification.clone());
		Ok(())
	}
}

struct Harness {
	engine: FulfillmentEngine,
	storage: Arc<StorageService>,
	outbox: Outbox,
}

async fn harness() -> Harness {
	let timeout = Duration::from_secs(5);
	let config = ConfigBuilder::new().build();
	let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
	let outbox = Outbox::default();
	let event_bus = EventBus::new(256);
	let orchestrator = SideEffectOrchestrator::new(
		storage.clone(),
		Arc::new(NotificationService::new(Box::new(outbox.clone()), timeout)),
		Arc::new(RefundService::new(
			Box::new(SimulatedRefunds),
			timeout,
			&default_card_methods(),
		)),
		event_bus.clone(),
		timeout,
	);

	storage
		.store(
			"customers",
			"c1",
			&CustomerContact {
				display_name: "Mira".into(),
				notification_token: Some("token-c1".into()),
			},
		)
		.await
		.unwrap();
	storage
		.store(
			"businesses",
			"b1",
			&BusinessProfile {
				name: "Harbour Grill".into(),
				table_service: true,
				..Default::default()
			},
		)
		.await
		.unwrap();

	let engine = FulfillmentEngine::new(config, storage.clone(), orchestrator, event_bus);
	engine.initialize().await.unwrap();
	Harness {
		engine,
		storage,
		outbox,
	}
}

fn staff() -> Actor {
	Actor::new("staff-7", "Ana Ruiz", "ana@harbour.example")
}

#[tokio::test]
async fn test_acceptance_with_shortfall() {
	let h = harness().await;
	let order = h
		.engine
		.ingest(json!({
			"id": "order-1",
			"businessId": "b1",
			"customerId": "c1",
			"paymentMethod": "card",
			"type": "pickup",
			"items": [
				{ "name": "Lamb Chops", "quantity": 2, "price": "9.50" },
				{ "name": "Rice", "quantity": 1, "price": "3.00" },
				{ "name": "Bread", "quantity": 1, "price": "2.00" }
			]
		}))
		.await
		.unwrap();
	assert_eq!(order.status, OrderStatus::Pending);

	let view = h.engine.get_order("order-1").await.unwrap();
	assert_eq!(view.recommended_action, None);
	let err = h.engine.advance("order-1", staff()).await.unwrap_err();
	assert!(matches!(err, EngineError::Transition(TransitionError::Validation(_))));

	h.engine.set_item_checked("order-1", 0, true).await.unwrap();
	let view = h.engine.set_item_checked("order-1", 1, true).await.unwrap();
	assert_eq!(view.checked_count, 2);
	assert!(!view.fully_checked);
	assert_eq!(view.recommended_action, Some(NextAction::AcceptWithShortfall));

	let outcome = h.engine.advance("order-1", staff()).await.unwrap();
	assert_eq!(outcome.from, OrderStatus::Pending);
	assert_eq!(outcome.order.status, OrderStatus::Accepted);
	assert_eq!(outcome.order.unavailable_items.len(), 1);
	assert_eq!(outcome.order.unavailable_items[0].name, "Bread");
	assert_eq!(outcome.order.unavailable_items[0].position, 3);

	let report = outcome.effects.await.unwrap();
	assert_eq!(report.shortfall_amount, Some(Decimal::new(200, 2)));
	assert_eq!(report.refunded_amount, Some(Decimal::new(200, 2)));
	assert_eq!(report.outcome(EffectKind::PartialRefund), Some(&EffectStatus::Succeeded));
	assert_eq!(report.outcome(EffectKind::ShortfallNotice), Some(&EffectStatus::Succeeded));
	assert_eq!(report.outcome(EffectKind::FulfillmentIssue), Some(&EffectStatus::Succeeded));

	let sent = h.outbox.sent();
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].recipient, "token-c1");
	assert!(matches!(
		&sent[0].payload,
		NotificationPayload::OrderAcceptedWithUnavailable { items, refund_amount, .. }
			if items.len() == 1 && *refund_amount == Decimal::new(200, 2)
	));

	let profile: BusinessProfile = h.storage.retrieve("businesses", "b1").await.unwrap();
	assert_eq!(profile.fulfillment_issues, 1);
	assert!(profile.last_issue_at.is_some());
}

#[tokio::test]
async fn test_dine_in_served_lands_in_completed_bucket() {
	let h = harness().await;
	h.engine
		.ingest(json!({
			"id": "order-2",
			"businessId": "b1",
			"customerId": "c1",
			"type": "dine_in",
			"tableNumber": "12",
			"status": "ready",
			"items": [{ "name": "Soup", "quantity": 1, "price": "6.00" }]
		}))
		.await
		.unwrap();

	let view = h.engine.get_order("order-2").await.unwrap();
	assert_eq!(view.recommended_action, Some(NextAction::MarkServed));
	let moved = h
		.engine
		.override_status("order-2", OrderStatus::OnTheWay, None, staff())
		.await;
	assert!(moved.is_ok(), "administrative overrides ignore the table");
	h.engine
		.override_status("order-2", OrderStatus::Ready, None, staff())
		.await
		.unwrap();

	let outcome = h.engine.advance("order-2", staff()).await.unwrap();
	assert_eq!(outcome.order.status, OrderStatus::Delivered);
	assert_eq!(outcome.order.served_by_name.as_deref(), Some("Ana Ruiz"));
	assert_eq!(outcome.order.served_by_id.as_deref(), Some("staff-7"));
	assert!(outcome.order.served_at.is_some());
	outcome.effects.await.unwrap();

	let mut rx = h.engine.live_board(TimeWindow::All).await.unwrap();
	let board = rx
		.wait_for(|board| board.locate("order-2") == Some(DisplayBucket::Completed))
		.await
		.unwrap()
		.clone();
	assert_eq!(board.stats.revenue, Decimal::new(600, 2));
}

#[tokio::test]
async fn test_cancel_requires_reason() {
	let h = harness().await;
	h.engine
		.ingest(json!({
			"id": "order-3",
			"businessId": "b1",
			"customerId": "c1",
			"items": [{ "name": "Falafel", "quantity": 1, "price": "5.00" }]
		}))
		.await
		.unwrap();

	let err = h.engine.cancel("order-3", "   ", staff()).await.unwrap_err();
	assert!(matches!(err, EngineError::Transition(TransitionError::Validation(_))));
	assert_eq!(
		h.engine.get_order("order-3").await.unwrap().order.status,
		OrderStatus::Pending
	);

	let outcome = h
		.engine
		.cancel("order-3", "Kitchen closed early", staff())
		.await
		.unwrap();
	assert_eq!(outcome.order.status, OrderStatus::Cancelled);
	assert_eq!(
		outcome.order.cancellation_reason.as_deref(),
		Some("Kitchen closed early")
	);
	let report = outcome.effects.await.unwrap();
	assert_eq!(
		report.outcome(EffectKind::CancellationNotice),
		Some(&EffectStatus::Succeeded)
	);

	let err = h.engine.advance("order-3", staff()).await.unwrap_err();
	assert!(matches!(err, EngineError::Transition(TransitionError::Validation(_))));
	let mut rx = h.engine.live_board(TimeWindow::All).await.unwrap();
	let board = rx
		.wait_for(|board| board.stats.cancelled == 1)
		.await
		.unwrap()
		.clone();
	assert_eq!(board.locate("order-3"), None);
}

#[tokio::test]
async fn test_resetting_a_delivery_clears_the_courier() {
	let h = harness().await;
	h.engine
		.ingest(json!({
			"id": "order-4",
			"businessId": "b1",
			"customerId": "c1",
			"type": "delivery",
			"status": "onTheWay",
			"courier": { "courierId": "d-9", "courierName": "Sam", "claimedAt": 1700000000 },
			"items": [{ "name": "Pizza", "quantity": 1, "price": "11.00" }]
		}))
		.await
		.unwrap();
	assert!(h.engine.get_order("order-4").await.unwrap().order.courier.is_some());

	let outcome = h
		.engine
		.override_status("order-4", OrderStatus::Preparing, None, staff())
		.await
		.unwrap();
	assert!(outcome.order.courier.is_none());
	assert!(h.engine.get_order("order-4").await.unwrap().order.courier.is_none());
}

#[tokio::test]
async fn test_history_keeps_first_entry_time() {
	let h = harness().await;
	let order = h
		.engine
		.ingest(json!({
			"id": "order-5",
			"businessId": "b1",
			"customerId": "c1",
			"createdAt": 1700000000,
			"items": [{ "name": "Tea", "quantity": 1, "price": "2.00" }]
		}))
		.await
		.unwrap();
	assert_eq!(order.status_history.get(&OrderStatus::Pending), Some(&1700000000));

	h.engine
		.override_status("order-5", OrderStatus::Accepted, None, staff())
		.await
		.unwrap();
	let outcome = h
		.engine
		.override_status("order-5", OrderStatus::Pending, None, staff())
		.await
		.unwrap();
	assert_eq!(
		outcome.order.status_history.get(&OrderStatus::Pending),
		Some(&1700000000)
	);
}

#[tokio::test]
async fn test_delete_drops_order_from_board() {
	let h = harness().await;
	h.engine
		.ingest(json!({
			"id": "order-6",
			"businessId": "b1",
			"customerId": "c1",
			"items": [{ "name": "Cake", "quantity": 1, "price": "4.00" }]
		}))
		.await
		.unwrap();
	let mut rx = h.engine.live_board(TimeWindow::All).await.unwrap();
	rx.wait_for(|board| board.locate("order-6") == Some(DisplayBucket::Incoming))
		.await
		.unwrap();

	h.engine.delete_order("order-6").await.unwrap();
	let err = h.engine.get_order("order-6").await.unwrap_err();
	assert!(matches!(err, EngineError::Transition(TransitionError::NotFound(_))));

	let board = rx
		.wait_for(|board| board.locate("order-6").is_none())
		.await
		.unwrap()
		.clone();
	assert_eq!(board.stats.incoming, 0);
}

#[tokio::test]
async fn test_full_reacceptance_does_not_repeat_shortfall() {
	let h = harness().await;
	h.engine
		.ingest(json!({
			"id": "order-7",
			"businessId": "b1",
			"customerId": "c1",
			"paymentMethod": "card",
			"items": [
				{ "name": "Rice", "quantity": 1, "price": "3.00" },
				{ "name": "Bread", "quantity": 1, "price": "2.00" }
			]
		}))
		.await
		.unwrap();

	h.engine.set_item_checked("order-7", 0, true).await.unwrap();
	let first = h.engine.advance("order-7", staff()).await.unwrap();
	assert_eq!(first.action, Some(NextAction::AcceptWithShortfall));
	let report = first.effects.await.unwrap();
	assert_eq!(report.refunded_amount, Some(Decimal::new(200, 2)));

	h.engine
		.override_status("order-7", OrderStatus::Pending, None, staff())
		.await
		.unwrap()
		.effects
		.await
		.unwrap();
	h.engine.set_item_checked("order-7", 1, true).await.unwrap();

	let second = h.engine.advance("order-7", staff()).await.unwrap();
	assert_eq!(second.action, Some(NextAction::Accept));
	assert!(second.order.unavailable_items.is_empty());
	let report = second.effects.await.unwrap();
	assert_eq!(report.refunded_amount, None);
	assert_eq!(report.shortfall_amount, None);
	assert_eq!(report.outcome(EffectKind::PartialRefund), None);
	assert_eq!(report.outcome(EffectKind::FulfillmentIssue), None);

	assert_eq!(h.outbox.sent().len(), 1);
	let profile: BusinessProfile = h.storage.retrieve("businesses", "b1").await.unwrap();
	assert_eq!(profile.fulfillment_issues, 1);
}
