mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite;

use realtime_api::auth::{self, AccessService, HttpAccess, Principal};
use realtime_api::gateway::events::Event;

/// Stand-in for the storage backend's internal endpoints.
async fn start_stub_backend() -> SocketAddr {
    async fn session(Path(token): Path<String>) -> Response {
        match token.as_str() {
            "tok_ok" => Json(serde_json::json!({ "user_id": "usr_1" })).into_response(),
            "tok_expired" => StatusCode::UNAUTHORIZED.into_response(),
            "tok_boom" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn access(Path((file_id, user_id)): Path<(String, String)>) -> Response {
        match (file_id.as_str(), user_id.as_str()) {
            ("file-1", "usr_1") => Json(serde_json::json!({ "allowed": true })).into_response(),
            ("file-2", _) => StatusCode::FORBIDDEN.into_response(),
            ("file-3", _) => Json(serde_json::json!({ "allowed": false })).into_response(),
            ("file-err", _) => StatusCode::BAD_GATEWAY.into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    // Any user id, so a request that escapes its path segment would resolve.
    async fn user(Path(user_id): Path<String>) -> Json<serde_json::Value> {
        Json(serde_json::json!({ "user_id": user_id }))
    }

    let app = Router::new()
        .route("/internal/sessions/{token}", get(session))
        .route("/internal/users/{user_id}", get(user))
        .route("/internal/files/{file_id}/access/{user_id}", get(access));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn principal(user_id: &str) -> Principal {
    Principal {
        user_id: user_id.to_string(),
    }
}

#[tokio::test]
async fn resolve_maps_backend_statuses() {
    let addr = start_stub_backend().await;
    // Trailing slash is tolerated.
    let access = HttpAccess::new(&format!("http://{addr}/")).unwrap();

    assert_eq!(access.resolve("tok_ok").await.unwrap(), Some(principal("usr_1")));
    assert_eq!(access.resolve("tok_expired").await.unwrap(), None);
    assert_eq!(access.resolve("tok_unknown").await.unwrap(), None);

    let err = access.resolve("tok_boom").await.unwrap_err();
    assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn crafted_tokens_stay_inside_the_session_path() {
    let addr = start_stub_backend().await;
    let access = HttpAccess::new(&format!("http://{addr}")).unwrap();

    for token in [
        "../users/usr_victim",
        "..%2Fusers%2Fusr_victim",
        "tok_ok#garbage",
        "tok_ok?x=1",
        "tok_ok/",
        "..",
    ] {
        assert_eq!(access.resolve(token).await.unwrap(), None, "{token:?}");
    }
}

#[tokio::test]
async fn can_observe_maps_backend_statuses() {
    let addr = start_stub_backend().await;
    let access = HttpAccess::new(&format!("http://{addr}")).unwrap();
    let user = principal("usr_1");

    assert!(access.can_observe(&user, "file-1").await.unwrap());
    assert!(!access.can_observe(&user, "file-2").await.unwrap());
    assert!(!access.can_observe(&user, "file-3").await.unwrap());
    assert!(!access.can_observe(&user, "file-404").await.unwrap());

    let err = access.can_observe(&user, "file-err").await.unwrap_err();
    assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn unreachable_backend_is_an_internal_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let access = HttpAccess::new(&format!("http://{addr}")).unwrap();
    let err = auth::authorize(&access, "tok_ok", "file-1").await.unwrap_err();
    assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn websocket_through_remote_access() {
    let backend = start_stub_backend().await;
    let access: Arc<dyn AccessService> =
        Arc::new(HttpAccess::new(&format!("http://{backend}")).unwrap());
    let state = common::test_state(common::test_config(), access);
    let addr = common::serve(state.clone()).await;

    let denied = common::ws_url(addr, "file-2", "tok_ok");
    assert_eq!(common::rejected_status(&denied, None).await, 403);

    let (mut ws, _) = tokio_tungstenite::connect_async(common::ws_url(addr, "file-1", "tok_ok"))
        .await
        .expect("ws connect");
    common::wait_for_connections(&state.hub, 1).await;

    let event = Event::comment_deleted("file-1", "cmt_1");
    state.hub.publish(event.clone());

    let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("read error");
    let text = match msg {
        tungstenite::Message::Text(text) => text,
        other => panic!("expected text frame, got {other:?}"),
    };
    let got: Event = serde_json::from_str(&text).unwrap();
    assert_eq!(got, event);
}
