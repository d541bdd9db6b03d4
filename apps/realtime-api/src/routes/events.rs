//! Publish ingress for the storage backend: `POST /internal/events`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};

use crate::auth::credential::bearer_token;
use crate::error::ApiError;
use crate::gateway::events::Event;
use crate::gateway::server::validate_topic;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/internal/events", post(publish))
}

/// Hand one event to the hub. Answers 202 once it is queued; delivery
/// happens asynchronously and is never reported back.
async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Event>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Some(secret) = state.config.publish_secret.as_deref() else {
        return Err(ApiError::forbidden("event publishing is disabled"));
    };

    let token = bearer_token(&headers).ok_or_else(|| ApiError::unauthorized("token required"))?;
    if !secrets_match(token, secret) {
        tracing::warn!("event publish rejected: bad secret");
        return Err(ApiError::unauthorized("invalid token"));
    }

    let Json(event) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    validate_topic(event.topic())?;

    tracing::debug!(
        kind = event.kind().as_str(),
        topic = %event.topic(),
        subject_id = %event.subject_id(),
        "event accepted"
    );
    state.hub.publish(event);

    Ok(StatusCode::ACCEPTED)
}

/// Compare without short-circuiting on the first differing byte.
fn secrets_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
