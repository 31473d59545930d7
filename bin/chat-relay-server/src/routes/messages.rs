//! Chat history routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chat_relay_core::{Message, Role};
use tracing::info;
use utoipa::OpenApi;

use crate::db::MessageStore;
use crate::error::ServerError;
use crate::schemas::chat::ClearMessagesResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_messages, clear_messages),
    components(schemas(Message, Role, ClearMessagesResponse))
)]
pub struct MessagesApi;

/// Register message-history routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/messages", get(list_messages).delete(clear_messages))
}

/// Every persisted message, in insertion order (`GET /api/messages`).
#[utoipa::path(
    get,
    path = "/api/messages",
    tag = "messages",
    responses(
        (status = 200, description = "All messages, oldest first", body = [Message]),
        (status = 500, description = "Internal server error"),
    )
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Message>>, ServerError> {
    Ok(Json(state.store.list_messages().await?))
}

/// Acknowledge a clear request (`DELETE /api/messages`).
///
/// Persisted history is kept; the next `GET /api/messages` still lists it.
#[utoipa::path(
    delete,
    path = "/api/messages",
    tag = "messages",
    responses(
        (status = 200, description = "Clear acknowledged; stored messages are kept", body = ClearMessagesResponse),
    )
)]
pub async fn clear_messages() -> Json<ClearMessagesResponse> {
    info!("clear requested; persisted history is kept");
    Json(ClearMessagesResponse {
        success: true,
        message: "Messages cleared".to_owned(),
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────
