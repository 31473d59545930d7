//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use chat_relay_core::upstream::{DEFAULT_MODEL, DEFAULT_UPSTREAM_URL, UpstreamConfig};

/// Runtime configuration for chat-relay-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:5000"`, or `0.0.0.0:$PORT`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite::memory:"`).
    /// An in-memory database lives exactly as long as the process.
    pub database_url: String,

    /// Model completion endpoint.
    pub upstream_url: String,

    /// Model identifier sent with every upstream request.
    pub model: String,

    pub upstream_connect_timeout: Duration,

    /// Bound on each upstream read; expiry triggers the fallback reply.
    pub upstream_read_timeout: Duration,

    /// Comma-separated CORS origin allow-list; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_docs: bool,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        let upstream = UpstreamConfig::default();
        Self {
            bind_address: "0.0.0.0:5000".to_owned(),
            database_url: "sqlite::memory:".to_owned(),
            upstream_url: DEFAULT_UPSTREAM_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            upstream_connect_timeout: upstream.connect_timeout,
            upstream_read_timeout: upstream.read_timeout,
            cors_allowed_origins: None,
            enable_docs: true,
            log_level: "info".to_owned(),
            log_json: false,
        }
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let bind_address = std::env::var("CHAT_RELAY_BIND")
            .ok()
            .or_else(|| std::env::var("PORT").ok().map(|port| format!("0.0.0.0:{port}")))
            .unwrap_or(defaults.bind_address);
        let upstream_url = std::env::var("CHAT_RELAY_UPSTREAM_URL")
            .or_else(|_| std::env::var("MLVO_API_URL"))
            .unwrap_or(defaults.upstream_url);

        Self {
            bind_address,
            database_url: env_or("CHAT_RELAY_DATABASE_URL", &defaults.database_url),
            upstream_url,
            model: env_or("CHAT_RELAY_MODEL", &defaults.model),
            upstream_connect_timeout: Duration::from_secs(parse_env(
                "CHAT_RELAY_UPSTREAM_CONNECT_TIMEOUT_SECS",
                defaults.upstream_connect_timeout.as_secs(),
            )),
            upstream_read_timeout: Duration::from_secs(parse_env(
                "CHAT_RELAY_UPSTREAM_READ_TIMEOUT_SECS",
                defaults.upstream_read_timeout.as_secs(),
            )),
            cors_allowed_origins: std::env::var("CHAT_RELAY_CORS_ORIGINS").ok(),
            enable_docs: std::env::var("CHAT_RELAY_ENABLE_DOCS")
                .map(|v| is_truthy(&v))
                .unwrap_or(defaults.enable_docs),
            log_level: env_or("CHAT_RELAY_LOG", &defaults.log_level),
            log_json: std::env::var("CHAT_RELAY_LOG_JSON")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
        }
    }

    /// Settings for the [`chat_relay_core::UpstreamClient`].
    pub fn upstream(&self) -> UpstreamConfig {
        UpstreamConfig {
            url: self.upstream_url.clone(),
            model: self.model.clone(),
            connect_timeout: self.upstream_connect_timeout,
            read_timeout: self.upstream_read_timeout,
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
