use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = state.hub.stats().await.ok_or_else(|| {
        tracing::error!("health check: hub is not running");
        ApiError::internal("hub is not running")
    })?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "topics": stats.topics,
        "connections": stats.connections,
    })))
}
