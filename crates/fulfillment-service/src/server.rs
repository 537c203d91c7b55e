//! HTTP server for the fulfillment API.
//!
//! Routes are nested under `/api`. Mutating order routes read the acting
//! staff member from the `x-actor-*` headers.

use crate::apis::{
	board::{self, BoardQuery},
	orders::{self, CancelRequest, ChecklistRequest, StatusOverrideRequest, TransitionResponse},
	ActingUser, ApiError,
};
use axum::{
	extract::{DefaultBodyLimit, Path, Query, State},
	http::StatusCode,
	response::Json,
	routing::{get, post, put},
	Router,
};
use fulfillment_config::ApiConfig;
use fulfillment_core::{Board, FulfillmentEngine, OrderView};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<FulfillmentEngine>,
}

/// Builds the API router with its middleware stack.
pub fn router(api_config: &ApiConfig, engine: Arc<FulfillmentEngine>) -> Router {
	let api = Router::new()
		.route("/orders", post(handle_ingest))
		.route("/orders/{id}", get(handle_get_order).delete(handle_delete))
		.route("/orders/{id}/checklist/{position}", put(handle_checklist))
		.route("/orders/{id}/advance", post(handle_advance))
		.route("/orders/{id}/cancel", post(handle_cancel))
		.route("/orders/{id}/status", put(handle_override))
		.route("/board", get(handle_board));

	Router::new()
		.nest("/api", api)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(TimeoutLayer::new(Duration::from_secs(api_config.timeout_seconds)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size))
				.layer(CorsLayer::permissive()),
		)
		.with_state(AppState { engine })
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<FulfillmentEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(&api_config, engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!(address = %bind_address, "Fulfillment API server starting");

	axum::serve(listener, app).await?;

	Ok(())
}

fn log_failure(operation: &str, error: &ApiError) {
	if error.status_code().is_server_error() {
		tracing::error!(operation, error = %error, "Request failed");
	} else {
		tracing::warn!(operation, error = %error, "Request rejected");
	}
}

/// Handles POST /api/orders.
async fn handle_ingest(
	State(state): State<AppState>,
	Json(raw): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<OrderView>), ApiError> {
	orders::ingest_order(&state.engine, raw)
		.await
		.map(|view| (StatusCode::CREATED, Json(view)))
		.inspect_err(|e| log_failure("ingest", e))
}

/// Handles GET /api/orders/{id}.
async fn handle_get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderView>, ApiError> {
	orders::get_order(&state.engine, &id)
		.await
		.map(Json)
		.inspect_err(|e| log_failure("get_order", e))
}

/// Handles DELETE /api/orders/{id}.
async fn handle_delete(
	Path(id): Path<String>,
	State(state): State<AppState>,
	ActingUser(actor): ActingUser,
) -> Result<StatusCode, ApiError> {
	orders::delete_order(&state.engine, &id, actor)
		.await
		.map(|_| StatusCode::NO_CONTENT)
		.inspect_err(|e| log_failure("delete", e))
}

/// Handles PUT /api/orders/{id}/checklist/{position}.
async fn handle_checklist(
	Path((id, position)): Path<(String, usize)>,
	State(state): State<AppState>,
	ActingUser(_actor): ActingUser,
	Json(request): Json<ChecklistRequest>,
) -> Result<Json<OrderView>, ApiError> {
	orders::set_item_checked(&state.engine, &id, position, request)
		.await
		.map(Json)
		.inspect_err(|e| log_failure("checklist", e))
}

/// Handles POST /api/orders/{id}/advance.
async fn handle_advance(
	Path(id): Path<String>,
	State(state): State<AppState>,
	ActingUser(actor): ActingUser,
) -> Result<Json<TransitionResponse>, ApiError> {
	orders::advance(&state.engine, &id, actor)
		.await
		.map(Json)
		.inspect_err(|e| log_failure("advance", e))
}

/// Handles POST /api/orders/{id}/cancel.
async fn handle_cancel(
	Path(id): Path<String>,
	State(state): State<AppState>,
	ActingUser(actor): ActingUser,
	Json(request): Json<CancelRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
	orders::cancel(&state.engine, &id, actor, request)
		.await
		.map(Json)
		.inspect_err(|e| log_failure("cancel", e))
}

/// Handles PUT /api/orders/{id}/status.
async fn handle_override(
	Path(id): Path<String>,
	State(state): State<AppState>,
	ActingUser(actor): ActingUser,
	Json(request): Json<StatusOverrideRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
	orders::override_status(&state.engine, &id, actor, request)
		.await
		.map(Json)
		.inspect_err(|e| log_failure("override_status", e))
}

/// Handles GET /api/board.
async fn handle_board(
	State(state): State<AppState>,
	Query(query): Query<BoardQuery>,
) -> Result<Json<Board>, ApiError> {
	board::get_board(&state.engine, query)
		.await
		.map(Json)
		.inspect_err(|e| log_failure("board", e))
}
