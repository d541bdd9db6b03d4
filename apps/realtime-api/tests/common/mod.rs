#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use filehub_common::id::prefixed_ulid;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use realtime_api::auth::{AccessService, MemoryAccess};
use realtime_api::config::Config;
use realtime_api::gateway::hub::{Hub, HubStats};
use realtime_api::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A file with an owner and a second user it is not (yet) shared with.
pub struct Fixture {
    pub file_id: String,
    pub owner_id: String,
    pub owner_token: String,
    pub guest_id: String,
    pub guest_token: String,
}

impl Fixture {
    pub fn seed(access: &MemoryAccess) -> Self {
        let fixture = Self {
            file_id: prefixed_ulid("file"),
            owner_id: prefixed_ulid("usr"),
            owner_token: format!("tok_{}", prefixed_ulid("usr")),
            guest_id: prefixed_ulid("usr"),
            guest_token: format!("tok_{}", prefixed_ulid("usr")),
        };
        access.insert_session(&fixture.owner_token, &fixture.owner_id);
        access.insert_session(&fixture.guest_token, &fixture.guest_id);
        access.set_owner(&fixture.file_id, &fixture.owner_id);
        fixture
    }
}

/// Defaults, with a short write timeout so stuck tests fail fast.
pub fn test_config() -> Config {
    Config {
        write_wait: Duration::from_secs(2),
        ..Config::default()
    }
}

/// Build an AppState over a fresh hub and the given access service.
pub fn test_state(config: Config, access: Arc<dyn AccessService>) -> AppState {
    let (hub, _task) = Hub::spawn();
    AppState::new(hub, access, config)
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub access: Arc<MemoryAccess>,
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background.
pub async fn start_server(config: Config) -> TestServer {
    let access = Arc::new(MemoryAccess::new());
    let state = test_state(config, access.clone());
    let addr = serve(state.clone()).await;
    TestServer {
        addr,
        state,
        access,
    }
}

pub async fn serve(state: AppState) -> SocketAddr {
    let app = realtime_api::routes::router().with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

pub fn ws_url(addr: SocketAddr, file_id: &str, token: &str) -> String {
    format!("ws://{addr}/api/ws/comments/{file_id}?token={token}")
}

/// Connect and wait until the hub has registered the connection.
pub async fn connect(server: &TestServer, file_id: &str, token: &str) -> WsClient {
    let before = stats(&server.state.hub).await.connections;
    let (ws, _) = tokio_tungstenite::connect_async(ws_url(server.addr, file_id, token))
        .await
        .expect("ws connect");
    wait_for_connections(&server.state.hub, before + 1).await;
    ws
}

/// Attempt an upgrade and return the HTTP status it was refused with.
pub async fn rejected_status(url: &str, origin: Option<&'static str>) -> u16 {
    let mut request = url.into_client_request().expect("client request");
    if let Some(origin) = origin {
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_static(origin));
    }
    match tokio_tungstenite::connect_async(request).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => resp.status().as_u16(),
        Err(other) => panic!("expected HTTP rejection, got {other:?}"),
        Ok(_) => panic!("expected HTTP rejection, upgrade succeeded"),
    }
}

pub async fn stats(hub: &Hub) -> HubStats {
    hub.stats().await.expect("hub running")
}

/// Registration is asynchronous; poll until the hub reports `expected`.
pub async fn wait_for_connections(hub: &Hub, expected: usize) {
    let polled = time::timeout(Duration::from_secs(5), async {
        loop {
            if stats(hub).await.connections == expected {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        polled.is_ok(),
        "timed out waiting for {expected} connections, have {}",
        stats(hub).await.connections
    );
}
