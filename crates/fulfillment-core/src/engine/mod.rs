//! Fulfillment engine that ties the core components together.
//!
//! The engine is the single entry point used by the service layer: it ingests
//! orders, serves checklist marks, runs transitions through the state machine,
//! hands committed transitions to the side-effect orchestrator and keeps one
//! live view per requested time window.

pub mod event_bus;
pub mod lifecycle;

use crate::checklist::{ChecklistError, FulfillmentChecklist};
use crate::handlers::SideEffectOrchestrator;
use crate::live_view::{Board, LiveView, LiveViewAggregator};
use crate::normalizer::normalize;
use crate::state::{
	recommended_action, CommittedTransition, NextAction, OrderStateMachine, OrderStore,
	TransitionError, TransitionRequest,
};
use event_bus::EventBus;
use fulfillment_config::Config;
use fulfillment_storage::StorageService;
use fulfillment_types::{
	current_timestamp, short_code, truncate_id, Actor, EffectEvent, EffectReport,
	FulfillmentEvent, Order, OrderStatus, TimeWindow,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::instrument;
use uuid::Uuid;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error(transparent)]
	Transition(#[from] TransitionError),
	#[error(transparent)]
	Checklist(#[from] ChecklistError),
}

/// An order together with its checklist state and next recommended action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
	pub order: Order,
	pub checked_count: usize,
	pub total_items: usize,
	pub fully_checked: bool,
	pub recommended_action: Option<NextAction>,
}

/// Result of a committed transition.
#[derive(Debug)]
pub struct TransitionOutcome {
	/// The order as written.
	pub order: Order,
	pub from: OrderStatus,
	/// Recommended action that was executed, `None` for cancel and overrides.
	pub action: Option<NextAction>,
	/// Side effects already running; resolves to their report.
	pub effects: JoinHandle<EffectReport>,
}

/// Main fulfillment engine.
#[derive(Clone)]
pub struct FulfillmentEngine {
	pub(crate) config: Config,
	pub(crate) storage: Arc<StorageService>,
	pub(crate) event_bus: EventBus,
	pub(crate) store: Arc<OrderStore>,
	pub(crate) checklist: Arc<FulfillmentChecklist>,
	pub(crate) state_machine: Arc<OrderStateMachine>,
	pub(crate) orchestrator: SideEffectOrchestrator,
	pub(crate) live_views: Arc<Mutex<HashMap<TimeWindow, LiveView>>>,
}

impl FulfillmentEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		orchestrator: SideEffectOrchestrator,
		event_bus: EventBus,
	) -> Self {
		let store = Arc::new(OrderStore::new(storage.clone(), event_bus.clone()));
		let checklist = Arc::new(FulfillmentChecklist::new(store.clone()));
		let state_machine = Arc::new(OrderStateMachine::new(store.clone(), event_bus.clone()));

		Self {
			config,
			storage,
			event_bus,
			store,
			checklist,
			state_machine,
			orchestrator,
			live_views: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	fn view(&self, order: Order) -> OrderView {
		let total_items = order.items.len();
		let checked_count = self.checklist.checked_count(&order.id, total_items);
		OrderView {
			recommended_action: recommended_action(&order, checked_count),
			fully_checked: self.checklist.is_fully_checked(&order.id, total_items),
			checked_count,
			total_items,
			order,
		}
	}

	/// Reads an order and refreshes its checklist mirror from the stored copy.
	async fn load(&self, order_id: &str) -> Result<Order, EngineError> {
		let order = self.state_machine.get_order(order_id).await?;
		self.checklist.hydrate_order(&order);
		Ok(order)
	}

	/// Normalizes and stores a new order document.
	///
	/// Assigns an id when the document has none and stamps the initial status
	/// into the history at the creation time.
	#[instrument(skip_all)]
	pub async fn ingest(&self, raw: serde_json::Value) -> Result<Order, EngineError> {
		let mut order = normalize(&raw);
		if order.id.trim().is_empty() {
			order.id = Uuid::new_v4().to_string();
		}
		if order.order_number.trim().is_empty() {
			order.order_number = short_code(&order.id);
		}
		if order.created_at == 0 {
			order.created_at = current_timestamp();
		}
		order.updated_at = order.updated_at.max(order.created_at);
		order.record_status_entry(order.status, order.created_at);

		self.state_machine.store_order(&order).await?;
		self.checklist.hydrate_order(&order);
		tracing::info!(
			order_id = %truncate_id(&order.id),
			order_number = %order.order_number,
			status = %order.status,
			items = order.items.len(),
			"Order ingested"
		);
		Ok(order)
	}

	pub async fn get_order(&self, order_id: &str) -> Result<OrderView, EngineError> {
		let order = self.load(order_id).await?;
		Ok(self.view(order))
	}

	/// Marks one item position (0-based) as confirmed in stock or not.
	pub async fn set_item_checked(
		&self,
		order_id: &str,
		position: usize,
		checked: bool,
	) -> Result<OrderView, EngineError> {
		let order = self
			.checklist
			.set_item_checked(order_id, position, checked)
			.await?;
		Ok(self.view(order))
	}

	fn commit_outcome(
		&self,
		committed: CommittedTransition,
		action: Option<NextAction>,
	) -> TransitionOutcome {
		let effects = self.orchestrator.dispatch(&committed);
		TransitionOutcome {
			order: committed.order,
			from: committed.from,
			action,
			effects,
		}
	}

	/// Executes the recommended next action for the order.
	///
	/// Accepting with a shortfall strikes every unchecked item.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn advance(&self, order_id: &str, actor: Actor) -> Result<TransitionOutcome, EngineError> {
		let order = self.load(order_id).await?;
		let checked = self.checklist.checked_count(order_id, order.items.len());
		let action = recommended_action(&order, checked).ok_or_else(|| {
			TransitionError::Validation(format!(
				"No next action for a {} order with {} of {} items checked",
				order.status,
				checked,
				order.items.len()
			))
		})?;

		let mut request = TransitionRequest::new(action.target(), actor);
		if action == NextAction::AcceptWithShortfall {
			request = request.with_unavailable(self.checklist.unchecked_items(order_id, &order.items));
		}

		let committed = self.state_machine.transition(order_id, request).await?;
		Ok(self.commit_outcome(committed, Some(action)))
	}

	/// Cancels a non-terminal order. The reason must not be blank.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn cancel(
		&self,
		order_id: &str,
		reason: &str,
		actor: Actor,
	) -> Result<TransitionOutcome, EngineError> {
		let request = TransitionRequest::new(OrderStatus::Cancelled, actor).with_reason(reason);
		let committed = self.state_machine.transition(order_id, request).await?;
		Ok(self.commit_outcome(committed, None))
	}

	/// Administrative move to any status. Cancelling still needs a reason.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), target = %target))]
	pub async fn override_status(
		&self,
		order_id: &str,
		target: OrderStatus,
		reason: Option<String>,
		actor: Actor,
	) -> Result<TransitionOutcome, EngineError> {
		let mut request = TransitionRequest::new(target, actor).administrative();
		request.reason = reason;
		let committed = self.state_machine.transition(order_id, request).await?;
		Ok(self.commit_outcome(committed, None))
	}

	/// Administrative hard delete.
	pub async fn delete_order(&self, order_id: &str) -> Result<(), EngineError> {
		self.state_machine.delete_order(order_id).await?;
		self.checklist.forget(order_id);
		Ok(())
	}

	/// Current board for `window`, starting its aggregator on first use.
	pub async fn board(&self, window: TimeWindow) -> Result<Board, EngineError> {
		let receiver = self.live_board(window).await?;
		let board = receiver.borrow().clone();
		Ok(board)
	}

	/// Subscribes to every board published for `window`.
	pub async fn live_board(&self, window: TimeWindow) -> Result<watch::Receiver<Board>, EngineError> {
		let mut views = self.live_views.lock().await;
		if let Some(view) = views.get(&window) {
			return Ok(view.subscribe());
		}
		let view = LiveViewAggregator::spawn(self.store.clone(), &self.event_bus, window)
			.await
			.map_err(TransitionError::from)?;
		let receiver = view.subscribe();
		views.insert(window, view);
		Ok(receiver)
	}

	/// Watches the event bus and raises staff-facing alerts for failed side
	/// effects until interrupted.
	pub async fn run(&self) -> Result<(), EngineError> {
		let mut events = self.event_bus.subscribe();

		loop {
			tokio::select! {
				received = events.recv() => match received {
					Ok(FulfillmentEvent::Effect(EffectEvent::Failed { order_id, kind, error })) => {
						tracing::warn!(
							target: "fulfillment::alerts",
							order_id = %truncate_id(&order_id),
							effect = %kind,
							error = %error,
							"Side effect needs staff attention"
						);
					},
					Ok(FulfillmentEvent::Transition(event)) => {
						tracing::debug!(
							order_id = %truncate_id(&event.order_id),
							from = %event.from,
							to = %event.to,
							"Transition observed"
						);
					},
					Ok(_) => {},
					Err(RecvError::Lagged(skipped)) => {
						tracing::warn!(skipped, "Engine event monitor lagged");
					},
					Err(RecvError::Closed) => break,
				},
				_ = tokio::signal::ctrl_c() => {
					break;
				}
			}
		}

		Ok(())
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}
}
