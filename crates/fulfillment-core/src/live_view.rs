//! Live view aggregator.
//!
//! Keeps a kanban-style board of orders for one creation-time window. The
//! aggregator loads the order set once, then folds every order change from the
//! event bus and publishes a freshly derived [`Board`] through a watch channel.
//! Buckets and statistics are always recomputed from the folded set, never
//! patched incrementally.

use crate::engine::event_bus::EventBus;
use crate::state::{OrderStore, StoreError};
use fulfillment_types::{
	current_timestamp, FulfillmentEvent, Order, OrderEvent, OrderStatus, OrderType, TimeWindow,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Period at which the board is re-derived without any order change, so
/// orders age out of rolling windows.
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Display grouping of the nine machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayBucket {
	/// `pending` or `accepted`.
	Incoming,
	Preparing,
	Ready,
	/// `onTheWay`.
	InTransit,
	/// `served`, `delivered` or `completed`.
	Completed,
}

impl DisplayBucket {
	pub const ALL: [DisplayBucket; 5] = [
		DisplayBucket::Incoming,
		DisplayBucket::Preparing,
		DisplayBucket::Ready,
		DisplayBucket::InTransit,
		DisplayBucket::Completed,
	];

	/// Bucket for a status. Cancelled orders have none.
	pub fn for_status(status: OrderStatus) -> Option<Self> {
		match status {
			OrderStatus::Pending | OrderStatus::Accepted => Some(DisplayBucket::Incoming),
			OrderStatus::Preparing => Some(DisplayBucket::Preparing),
			OrderStatus::Ready => Some(DisplayBucket::Ready),
			OrderStatus::OnTheWay => Some(DisplayBucket::InTransit),
			OrderStatus::Served | OrderStatus::Delivered | OrderStatus::Completed => {
				Some(DisplayBucket::Completed)
			},
			OrderStatus::Cancelled => None,
		}
	}

	pub fn index(self) -> usize {
		self as usize
	}
}

/// Compact order summary shown on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCard {
	pub id: String,
	pub order_number: String,
	pub business_id: String,
	pub customer_name: String,
	pub status: OrderStatus,
	#[serde(rename = "type")]
	pub order_type: OrderType,
	pub total: Decimal,
	pub item_count: usize,
	pub created_at: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub table_number: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub courier_name: Option<String>,
}

impl From<&Order> for OrderCard {
	fn from(order: &Order) -> Self {
		Self {
			id: order.id.clone(),
			order_number: order.order_number.clone(),
			business_id: order.business_id.clone(),
			customer_name: order.customer_name.clone(),
			status: order.status,
			order_type: order.order_type,
			total: order.total,
			item_count: order.items.len(),
			created_at: order.created_at,
			table_number: order.table_number.clone(),
			courier_name: order.courier.as_ref().map(|c| c.courier_name.clone()),
		}
	}
}

/// Summary counters over the windowed order set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardStats {
	pub incoming: usize,
	pub preparing: usize,
	pub ready: usize,
	pub in_transit: usize,
	pub completed: usize,
	pub cancelled: usize,
	/// Sum of `total` over delivered orders.
	pub revenue: Decimal,
	/// Revenue per completed order, zero when nothing is completed.
	pub average_order_value: Decimal,
}

/// Bucketed snapshot of the orders created inside one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
	pub window: TimeWindow,
	pub generated_at: u64,
	/// Indexed by [`DisplayBucket::index`], newest order first.
	pub buckets: [Vec<OrderCard>; 5],
	pub stats: BoardStats,
}

impl Board {
	pub fn bucket(&self, bucket: DisplayBucket) -> &[OrderCard] {
		&self.buckets[bucket.index()]
	}

	/// Bucket holding `order_id`, if it is on the board.
	pub fn locate(&self, order_id: &str) -> Option<DisplayBucket> {
		DisplayBucket::ALL
			.into_iter()
			.find(|b| self.bucket(*b).iter().any(|card| card.id == order_id))
	}
}

/// Derives the board for `window` at time `now`.
///
/// Every order inside the window lands in exactly one bucket, except
/// cancelled orders, which are only counted in [`BoardStats::cancelled`].
/// Revenue sums `total` over delivered orders; the average order value divides
/// it by the size of the completed bucket.
pub fn build_board<'a>(
	orders: impl IntoIterator<Item = &'a Order>,
	window: TimeWindow,
	now: u64,
) -> Board {
	let mut buckets: [Vec<OrderCard>; 5] = Default::default();
	let mut stats = BoardStats::default();

	for order in orders {
		if !window.contains(order.created_at, now) {
			continue;
		}
		match DisplayBucket::for_status(order.status) {
			Some(bucket) => {
				if order.status == OrderStatus::Delivered {
					stats.revenue = stats.revenue.saturating_add(order.total);
				}
				buckets[bucket.index()].push(OrderCard::from(order));
			},
			None => stats.cancelled += 1,
		}
	}

	for bucket in buckets.iter_mut() {
		bucket.sort_by(|a, b| {
			b.created_at
				.cmp(&a.created_at)
				.then_with(|| a.id.cmp(&b.id))
		});
	}

	stats.incoming = buckets[DisplayBucket::Incoming.index()].len();
	stats.preparing = buckets[DisplayBucket::Preparing.index()].len();
	stats.ready = buckets[DisplayBucket::Ready.index()].len();
	stats.in_transit = buckets[DisplayBucket::InTransit.index()].len();
	stats.completed = buckets[DisplayBucket::Completed.index()].len();
	if stats.completed > 0 {
		stats.average_order_value = (stats.revenue / Decimal::from(stats.completed)).round_dp(2);
	}

	Board {
		window,
		generated_at: now,
		buckets,
		stats,
	}
}

/// Handle to a running aggregator.
pub struct LiveView {
	window: TimeWindow,
	receiver: watch::Receiver<Board>,
	task: JoinHandle<()>,
}

impl LiveView {
	pub fn window(&self) -> TimeWindow {
		self.window
	}

	/// Latest published board.
	pub fn current(&self) -> Board {
		self.receiver.borrow().clone()
	}

	/// Receiver notified on every republished board.
	pub fn subscribe(&self) -> watch::Receiver<Board> {
		self.receiver.clone()
	}

	pub fn stop(&self) {
		self.task.abort();
	}
}

impl Drop for LiveView {
	fn drop(&mut self) {
		self.task.abort();
	}
}

/// Folds order events into the board of one window.
pub struct LiveViewAggregator {
	store: Arc<OrderStore>,
	window: TimeWindow,
	orders: HashMap<String, Order>,
	sender: watch::Sender<Board>,
}

impl LiveViewAggregator {
	/// Loads the current order set and starts following the event bus.
	///
	/// Subscribes before loading so no change committed in between is missed.
	pub async fn spawn(
		store: Arc<OrderStore>,
		event_bus: &EventBus,
		window: TimeWindow,
	) -> Result<LiveView, StoreError> {
		let events = event_bus.subscribe();
		let orders: HashMap<String, Order> = store
			.list()
			.await?
			.into_iter()
			.map(|order| (order.id.clone(), order))
			.collect();

		let board = build_board(orders.values(), window, current_timestamp());
		let (sender, receiver) = watch::channel(board);
		let aggregator = Self {
			store,
			window,
			orders,
			sender,
		};
		tracing::info!(window = %window, orders = aggregator.orders.len(), "Live view started");

		Ok(LiveView {
			window,
			receiver,
			task: tokio::spawn(aggregator.run(events)),
		})
	}

	fn publish(&self) {
		self.sender.send_replace(build_board(
			self.orders.values(),
			self.window,
			current_timestamp(),
		));
	}

	/// Replaces the folded set with a fresh read of storage.
	async fn reload(&mut self) {
		match self.store.list().await {
			Ok(orders) => {
				self.orders = orders
					.into_iter()
					.map(|order| (order.id.clone(), order))
					.collect();
				self.publish();
			},
			Err(e) => tracing::error!(window = %self.window, error = %e, "Live view reload failed"),
		}
	}

	async fn run(mut self, mut events: broadcast::Receiver<FulfillmentEvent>) {
		let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
		refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		refresh.tick().await;

		loop {
			tokio::select! {
				received = events.recv() => match received {
					Ok(FulfillmentEvent::Order(OrderEvent::Changed { order })) => {
						self.orders.insert(order.id.clone(), order);
						self.publish();
					},
					Ok(FulfillmentEvent::Order(OrderEvent::Deleted { order_id })) => {
						self.orders.remove(&order_id);
						self.publish();
					},
					Ok(_) => {},
					Err(RecvError::Lagged(skipped)) => {
						tracing::warn!(window = %self.window, skipped, "Live view lagged, reloading");
						self.reload().await;
					},
					Err(RecvError::Closed) => break,
				},
				_ = refresh.tick() => self.publish(),
			}
		}
		tracing::debug!(window = %self.window, "Live view stopped");
	}
}
