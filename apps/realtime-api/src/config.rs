use std::time::Duration;

/// Default origins allowed to open a WebSocket (the web client's dev server).
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173";

/// Realtime API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Base URL of the session/access service. `None` runs with the in-memory
    /// access service, which starts empty.
    pub access_service_url: Option<String>,
    /// Origins allowed to upgrade; `*` allows any. Requests without an
    /// `Origin` header are always allowed.
    pub allowed_origins: Vec<String>,
    /// Per-connection outbound mailbox capacity. A subscriber whose mailbox
    /// is full at publish time is disconnected.
    pub mailbox_capacity: usize,
    /// How often the server pings each client.
    pub ping_interval: Duration,
    /// How long a connection may stay silent before it is considered dead.
    pub pong_wait: Duration,
    /// Upper bound on a single transport write.
    pub write_wait: Duration,
    /// Re-check access on this interval while connected. `None` checks only
    /// at connect time.
    pub reauth_interval: Option<Duration>,
    /// Join frames already queued in a mailbox into one newline-separated
    /// text frame.
    pub coalesce_frames: bool,
    /// Bearer secret the mutation service presents to `POST /internal/events`.
    /// `None` disables the route.
    pub publish_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1030,
            access_service_url: None,
            allowed_origins: parse_origins(DEFAULT_ALLOWED_ORIGINS),
            mailbox_capacity: 256,
            ping_interval: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            reauth_interval: None,
            coalesce_frames: false,
            publish_secret: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing or unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            port: parsed_var(&lookup, "PORT").unwrap_or(defaults.port),
            access_service_url: non_empty("ACCESS_SERVICE_URL"),
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or(defaults.allowed_origins),
            mailbox_capacity: parsed_var(&lookup, "HUB_MAILBOX_CAPACITY")
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.mailbox_capacity),
            ping_interval: secs_var(&lookup, "HUB_PING_INTERVAL_SECS")
                .unwrap_or(defaults.ping_interval),
            pong_wait: secs_var(&lookup, "HUB_PONG_WAIT_SECS").unwrap_or(defaults.pong_wait),
            write_wait: secs_var(&lookup, "HUB_WRITE_WAIT_SECS").unwrap_or(defaults.write_wait),
            reauth_interval: secs_var(&lookup, "HUB_REAUTH_INTERVAL_SECS"),
            coalesce_frames: parsed_var(&lookup, "HUB_COALESCE_FRAMES")
                .unwrap_or(defaults.coalesce_frames),
            publish_secret: non_empty("PUBLISH_SECRET"),
        };

        if config.ping_interval >= config.pong_wait {
            tracing::warn!(
                ping_interval = ?config.ping_interval,
                pong_wait = ?config.pong_wait,
                "ping interval is not shorter than the read timeout; idle clients will be dropped"
            );
        }

        config
    }
}

fn parsed_var<T: std::str::FromStr>(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|v| v.trim().parse().ok())
}

/// Whole seconds; zero counts as unset.
fn secs_var(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    parsed_var::<u64>(lookup, name)
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}
