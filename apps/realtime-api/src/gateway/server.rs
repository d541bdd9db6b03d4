//! WebSocket upgrade endpoint: authenticate, authorize, then hand the socket
//! to the hub.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocket;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::header::ORIGIN;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::auth::{self, Credential, Principal};
use crate::error::ApiError;
use crate::AppState;

use super::connection::{run_connection, ConnectionSettings, Reauthorizer};
use super::session::{mailbox, ConnectionInfo};

/// Longest accepted file id.
const MAX_TOPIC_LEN: usize = 128;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/ws/comments/{file_id}", get(ws_upgrade))
}

/// Every check runs before the upgrade, so a rejected client gets a plain
/// HTTP error and never touches the registry.
async fn ws_upgrade(
    Path(file_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    credential: Result<Credential, ApiError>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    validate_topic(&file_id)?;

    if !origin_allowed(&headers, &state.config.allowed_origins) {
        tracing::debug!(origin = ?headers.get(ORIGIN), %file_id, "origin rejected");
        return Err(ApiError::forbidden("origin not allowed"));
    }

    let Credential(token) = credential?;
    let principal = auth::authorize(state.access.as_ref(), &token, &file_id).await?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let connections = state.connections.clone();
    Ok(ws
        .on_failed_upgrade(|err| tracing::debug!(%err, "websocket upgrade failed"))
        .on_upgrade(move |socket| {
            connections.track_future(serve_connection(socket, state, principal, file_id))
        }))
}

async fn serve_connection(socket: WebSocket, state: AppState, principal: Principal, file_id: String) {
    let settings = ConnectionSettings::from(state.config.as_ref());
    let info = Arc::new(ConnectionInfo::new(principal.user_id.clone(), file_id));
    let (subscriber, mailbox) = mailbox(info.clone(), settings.mailbox_capacity);

    state.hub.subscribe(subscriber);
    tracing::info!(
        connection_id = %info.id,
        user_id = %info.user_id,
        topic = %info.topic,
        "connection established"
    );

    let reauth = settings.reauth_interval.map(|_| Reauthorizer {
        access: state.access.clone(),
        principal,
    });

    run_connection(socket, state.hub.clone(), info.clone(), mailbox, settings, reauth).await;

    tracing::info!(
        connection_id = %info.id,
        user_id = %info.user_id,
        topic = %info.topic,
        "connection closed"
    );
}

pub(crate) fn validate_topic(file_id: &str) -> Result<(), ApiError> {
    let valid = !file_id.is_empty()
        && file_id.len() <= MAX_TOPIC_LEN
        && file_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(ApiError::bad_request("invalid file id"))
    }
}

/// Non-browser clients send no Origin and are let through.
fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    let Some(origin) = headers.get(ORIGIN) else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    let origin = origin.trim_end_matches('/');
    allowed.iter().any(|a| a == "*" || a == origin)
}
