//! Order endpoints: ingestion, checklist marks, transitions and deletion.
//!
//! Transitions respond as soon as the status change is committed. Side
//! effects keep running after the response is sent; their failures surface
//! as staff alerts in the engine's event monitor.

use super::ApiError;
use fulfillment_core::{FulfillmentEngine, NextAction, OrderView, TransitionOutcome};
use fulfillment_types::{truncate_id, Actor, Order, OrderStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ChecklistRequest {
	pub checked: bool,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
	pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusOverrideRequest {
	pub status: OrderStatus,
	#[serde(default)]
	pub reason: Option<String>,
}

/// Body returned for every committed transition.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
	pub order: Order,
	pub from: OrderStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub action: Option<NextAction>,
}

impl From<TransitionOutcome> for TransitionResponse {
	fn from(outcome: TransitionOutcome) -> Self {
		// Dropping the handle detaches the effects task; it is not cancelled.
		Self {
			order: outcome.order,
			from: outcome.from,
			action: outcome.action,
		}
	}
}

pub async fn ingest_order(
	engine: &FulfillmentEngine,
	raw: serde_json::Value,
) -> Result<OrderView, ApiError> {
	if !raw.is_object() {
		return Err(ApiError::bad_request(
			"INVALID_ORDER",
			"Order document must be a JSON object",
		));
	}
	let order = engine.ingest(raw).await?;
	Ok(engine.get_order(&order.id).await?)
}

pub async fn get_order(engine: &FulfillmentEngine, order_id: &str) -> Result<OrderView, ApiError> {
	Ok(engine.get_order(order_id).await?)
}

pub async fn set_item_checked(
	engine: &FulfillmentEngine,
	order_id: &str,
	position: usize,
	request: ChecklistRequest,
) -> Result<OrderView, ApiError> {
	Ok(engine
		.set_item_checked(order_id, position, request.checked)
		.await?)
}

pub async fn advance(
	engine: &FulfillmentEngine,
	order_id: &str,
	actor: Actor,
) -> Result<TransitionResponse, ApiError> {
	Ok(engine.advance(order_id, actor).await?.into())
}

pub async fn cancel(
	engine: &FulfillmentEngine,
	order_id: &str,
	actor: Actor,
	request: CancelRequest,
) -> Result<TransitionResponse, ApiError> {
	Ok(engine.cancel(order_id, &request.reason, actor).await?.into())
}

pub async fn override_status(
	engine: &FulfillmentEngine,
	order_id: &str,
	actor: Actor,
	request: StatusOverrideRequest,
) -> Result<TransitionResponse, ApiError> {
	tracing::info!(
		order_id = %truncate_id(order_id),
		actor = %actor.display_name(),
		target = %request.status,
		"Administrative status override"
	);
	Ok(engine
		.override_status(order_id, request.status, request.reason, actor)
		.await?
		.into())
}

pub async fn delete_order(
	engine: &FulfillmentEngine,
	order_id: &str,
	actor: Actor,
) -> Result<(), ApiError> {
	engine.delete_order(order_id).await?;
	tracing::info!(
		order_id = %truncate_id(order_id),
		actor = %actor.display_name(),
		"Order deleted"
	);
	Ok(())
}
