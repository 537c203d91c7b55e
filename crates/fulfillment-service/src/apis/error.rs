//! Error responses for the fulfillment API.
//!
//! Engine errors are mapped onto HTTP statuses here so handlers can return
//! them with `?`.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use fulfillment_core::{ChecklistError, EngineError, TransitionError};
use serde::Serialize;
use std::fmt;

/// Seconds a client should wait before retrying after a storage failure.
const PERSISTENCE_RETRY_AFTER: u64 = 1;

/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum ApiError {
	/// Malformed request, e.g. missing actor headers (400)
	BadRequest { error_type: String, message: String },
	/// The order does not exist (404)
	NotFound { message: String },
	/// Business rule rejected the request (422)
	UnprocessableEntity {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Storage is unavailable; the request can be retried (503)
	ServiceUnavailable {
		message: String,
		retry_after: Option<u64>,
	},
	/// Internal server error (500)
	InternalServerError { message: String },
}

impl ApiError {
	pub fn bad_request(error_type: &str, message: impl Into<String>) -> Self {
		ApiError::BadRequest {
			error_type: error_type.to_string(),
			message: message.into(),
		}
	}

	pub fn status_code(&self) -> StatusCode {
		match self {
			ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
			ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
			ApiError::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
			ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
			ApiError::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			ApiError::BadRequest { error_type, message } => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: None,
				retry_after: None,
			},
			ApiError::NotFound { message } => ErrorResponse {
				error: "ORDER_NOT_FOUND".to_string(),
				message: message.clone(),
				details: None,
				retry_after: None,
			},
			ApiError::UnprocessableEntity {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: details.clone(),
				retry_after: None,
			},
			ApiError::ServiceUnavailable {
				message,
				retry_after,
			} => ErrorResponse {
				error: "STORAGE_UNAVAILABLE".to_string(),
				message: message.clone(),
				details: None,
				retry_after: *retry_after,
			},
			ApiError::InternalServerError { message } => ErrorResponse {
				error: "INTERNAL_ERROR".to_string(),
				message: message.clone(),
				details: None,
				retry_after: None,
			},
		}
	}
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ApiError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			ApiError::NotFound { message } => write!(f, "Not Found: {}", message),
			ApiError::UnprocessableEntity { message, .. } => {
				write!(f, "Unprocessable Entity: {}", message)
			},
			ApiError::ServiceUnavailable { message, .. } => {
				write!(f, "Service Unavailable: {}", message)
			},
			ApiError::InternalServerError { message } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status_code(), Json(self.to_error_response())).into_response()
	}
}

impl From<TransitionError> for ApiError {
	fn from(e: TransitionError) -> Self {
		let message = e.to_string();
		match e {
			TransitionError::Validation(_) => ApiError::UnprocessableEntity {
				error_type: "VALIDATION_FAILED".to_string(),
				message,
				details: None,
			},
			TransitionError::InvalidTransition { from, to } => ApiError::UnprocessableEntity {
				error_type: "INVALID_TRANSITION".to_string(),
				message,
				details: Some(serde_json::json!({ "from": from, "to": to })),
			},
			TransitionError::NotFound(_) => ApiError::NotFound { message },
			TransitionError::Persistence(_) => ApiError::ServiceUnavailable {
				message,
				retry_after: Some(PERSISTENCE_RETRY_AFTER),
			},
		}
	}
}

impl From<ChecklistError> for ApiError {
	fn from(e: ChecklistError) -> Self {
		let message = e.to_string();
		match e {
			ChecklistError::NotFound(_) => ApiError::NotFound { message },
			ChecklistError::InvalidPosition { position, len } => ApiError::UnprocessableEntity {
				error_type: "INVALID_POSITION".to_string(),
				message,
				details: Some(serde_json::json!({ "position": position, "items": len })),
			},
			ChecklistError::Storage(_) => ApiError::ServiceUnavailable {
				message,
				retry_after: Some(PERSISTENCE_RETRY_AFTER),
			},
		}
	}
}

impl From<EngineError> for ApiError {
	fn from(e: EngineError) -> Self {
		match e {
			EngineError::Transition(e) => e.into(),
			EngineError::Checklist(e) => e.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_types::OrderStatus;

	#[test]
	fn test_transition_errors_map_to_statuses() {
		let cases = [
			(
				TransitionError::Validation("reason required".into()),
				StatusCode::UNPROCESSABLE_ENTITY,
			),
			(
				TransitionError::InvalidTransition {
					from: OrderStatus::Pending,
					to: OrderStatus::Ready,
				},
				StatusCode::UNPROCESSABLE_ENTITY,
			),
			(TransitionError::NotFound("o1".into()), StatusCode::NOT_FOUND),
			(
				TransitionError::Persistence("disk full".into()),
				StatusCode::SERVICE_UNAVAILABLE,
			),
		];
		for (error, status) in cases {
			assert_eq!(ApiError::from(error).status_code(), status);
		}
	}

	#[test]
	fn test_persistence_error_suggests_retry() {
		let body = ApiError::from(EngineError::Transition(TransitionError::Persistence(
			"disk full".into(),
		)))
		.to_error_response();
		assert_eq!(body.retry_after, Some(PERSISTENCE_RETRY_AFTER));
		assert_eq!(body.error, "STORAGE_UNAVAILABLE");
	}

	#[test]
	fn test_invalid_position_carries_details() {
		let body = ApiError::from(ChecklistError::InvalidPosition { position: 7, len: 3 })
			.to_error_response();
		assert_eq!(body.error, "INVALID_POSITION");
		assert_eq!(body.details, Some(serde_json::json!({ "position": 7, "items": 3 })));
	}
}
