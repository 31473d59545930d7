//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use chat_relay_core::UpstreamClient;

use crate::config::Config;
use crate::db::sqlite::SqliteStore;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Chat history; created at startup, lives until shutdown.
    pub store: Arc<SqliteStore>,
    /// Model API client; clones share one connection pool.
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: Config, store: SqliteStore) -> Self {
        let upstream = UpstreamClient::new(config.upstream());
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            upstream,
        }
    }
}
