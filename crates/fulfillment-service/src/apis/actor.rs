//! Staff identity carried on mutating requests.

use super::ApiError;
use axum::{extract::FromRequestParts, http::request::Parts};
use fulfillment_types::Actor;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_EMAIL_HEADER: &str = "x-actor-email";

/// The staff member performing a request, read from the `x-actor-*` headers.
///
/// `x-actor-id` is required; name and email default to empty.
#[derive(Debug, Clone)]
pub struct ActingUser(pub Actor);

fn header(parts: &Parts, name: &str) -> Option<String> {
	parts
		.headers
		.get(name)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
		.filter(|v| !v.is_empty())
		.map(str::to_string)
}

impl<S> FromRequestParts<S> for ActingUser
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let id = header(parts, ACTOR_ID_HEADER).ok_or_else(|| {
			ApiError::bad_request(
				"MISSING_ACTOR",
				format!("The {} header is required", ACTOR_ID_HEADER),
			)
		})?;
		Ok(ActingUser(Actor::new(
			id,
			header(parts, ACTOR_NAME_HEADER).unwrap_or_default(),
			header(parts, ACTOR_EMAIL_HEADER).unwrap_or_default(),
		)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::Request;

	async fn extract(request: Request<()>) -> Result<ActingUser, ApiError> {
		let (mut parts, _) = request.into_parts();
		ActingUser::from_request_parts(&mut parts, &()).await
	}

	#[tokio::test]
	async fn test_reads_all_headers() {
		let request = Request::builder()
			.header(ACTOR_ID_HEADER, "staff-7")
			.header(ACTOR_NAME_HEADER, "Ana Ruiz")
			.header(ACTOR_EMAIL_HEADER, "ana@harbour.example")
			.body(())
			.unwrap();
		let ActingUser(actor) = extract(request).await.unwrap();
		assert_eq!(actor.id, "staff-7");
		assert_eq!(actor.display_name(), "Ana Ruiz");
	}

	#[tokio::test]
	async fn test_missing_id_is_rejected() {
		let request = Request::builder()
			.header(ACTOR_NAME_HEADER, "Ana Ruiz")
			.body(())
			.unwrap();
		let err = extract(request).await.unwrap_err();
		assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
	}
}
