//! Live board endpoint.

use super::ApiError;
use fulfillment_core::{Board, FulfillmentEngine};
use fulfillment_types::TimeWindow;
use serde::Deserialize;

/// Query string of `GET /api/board`.
#[derive(Debug, Default, Deserialize)]
pub struct BoardQuery {
	/// Falls back to the configured default window.
	pub window: Option<TimeWindow>,
}

pub async fn get_board(engine: &FulfillmentEngine, query: BoardQuery) -> Result<Board, ApiError> {
	let window = query
		.window
		.unwrap_or(engine.config().live_view.default_window);
	Ok(engine.board(window).await?)
}
