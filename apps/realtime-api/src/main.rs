use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use realtime_api::auth::{AccessService, HttpAccess, MemoryAccess};
use realtime_api::config::Config;
use realtime_api::gateway::hub::Hub;
use realtime_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let access: Arc<dyn AccessService> = match &config.access_service_url {
        Some(url) => {
            tracing::info!(%url, "using remote access service");
            Arc::new(HttpAccess::new(url).expect("failed to build access service client"))
        }
        None => {
            tracing::warn!("ACCESS_SERVICE_URL not set; in-memory access service has no sessions, every connection will be rejected");
            Arc::new(MemoryAccess::new())
        }
    };

    let (hub, hub_task) = Hub::spawn();

    tracing::info!(
        mailbox_capacity = config.mailbox_capacity,
        ping_interval = ?config.ping_interval,
        pong_wait = ?config.pong_wait,
        reauth_interval = ?config.reauth_interval,
        "realtime-api configured"
    );

    if config.publish_secret.is_none() {
        tracing::warn!("PUBLISH_SECRET not set; POST /internal/events is disabled");
    }

    let state = AppState::new(hub.clone(), access, config);
    let drain = state.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(realtime_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "realtime-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await
        .expect("server error");

    // The server forgets upgraded sockets; wait for their pumps separately.
    let grace = drain.config.write_wait * 2;
    if !drain.drain_connections(grace).await {
        tracing::warn!(
            remaining = drain.connections.len(),
            "connections still open at exit"
        );
    }

    let _ = hub_task.await;
    tracing::info!("realtime-api stopped");
}

/// Wait for Ctrl-C or SIGTERM, then close every live connection.
async fn shutdown_signal(hub: Hub) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received; closing connections");
    hub.shutdown();
}
