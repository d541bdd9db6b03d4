pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;

use auth::AccessService;
use config::Config;
use gateway::hub::Hub;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub access: Arc<dyn AccessService>,
    pub config: Arc<Config>,
    /// Upgraded connections. The HTTP server stops tracking a connection
    /// once it is handed off, so shutdown waits on this instead.
    pub connections: TaskTracker,
}

impl AppState {
    pub fn new(hub: Hub, access: Arc<dyn AccessService>, config: Config) -> Self {
        Self {
            hub,
            access,
            config: Arc::new(config),
            connections: TaskTracker::new(),
        }
    }

    /// Wait up to `grace` for every connection task to finish. Returns
    /// `false` if some were still running.
    pub async fn drain_connections(&self, grace: Duration) -> bool {
        self.connections.close();
        tokio::time::timeout(grace, self.connections.wait())
            .await
            .is_ok()
    }
}
