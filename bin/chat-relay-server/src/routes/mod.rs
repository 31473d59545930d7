//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional OpenAPI document endpoint (disable with `CHAT_RELAY_ENABLE_DOCS=false`)
//! - Health / heartbeat route
//! - `/api/messages` history routes and the `/api/chat` relay route

mod chat;
pub mod doc;
mod health;
mod messages;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router, middleware};
use tower::ServiceBuilder;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Path of the generated OpenAPI document.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .merge(messages::router())
        .merge(chat::router());

    // Enabled by default; disable with CHAT_RELAY_ENABLE_DOCS=false to avoid
    // exposing the API structure.
    if state.config.enable_docs {
        let api_doc = doc::get_docs();
        app = app.route(OPENAPI_PATH, get(move || async move { Json(api_doc) }));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state.config)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
