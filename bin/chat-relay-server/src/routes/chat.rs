//! Chat route.
//!
//! `POST /api/chat` persists the user message, relays the prompt to the
//! model API and either streams the reply as server-sent events (the
//! default) or returns the persisted message pair as JSON.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chat_relay_core::ChatExchange;
use futures::StreamExt;
use tracing::debug;
use utoipa::OpenApi;
use validator::Validate;

use crate::error::ServerError;
use crate::handlers::RelayService;
use crate::schemas::chat::{ChatRequest, FieldError, ValidationErrorResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(post_chat),
    components(schemas(ChatRequest, ChatExchange, FieldError, ValidationErrorResponse))
)]
pub struct ChatApi;

/// Register chat routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/chat", post(post_chat))
}

/// Send a chat message (`POST /api/chat`).
///
/// With `stream` true or absent, the response is `text/event-stream`:
/// zero or more `data: {"type":"chunk","content":…}` events, then exactly
/// one `data: {"type":"complete","userMessage":…,"aiMessage":…}` event.
/// An unreachable model API still completes, with the fallback reply.
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Message pair as JSON (stream: false), or chunk events then one complete event (stream: true)",
            content(
                (ChatExchange = "application/json"),
                (String = "text/event-stream"),
            )
        ),
        (status = 400, description = "Invalid request data", body = ValidationErrorResponse),
        (status = 500, description = "Internal server error"),
    )
)]
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(req) = payload?;
    req.validate()?;

    let streaming = req.streaming();
    debug!(content_len = req.content.len(), streaming, "chat request");

    let relay = RelayService::new(state);
    let accepted = relay.accept(&req.content).await?;

    if streaming {
        let events = relay
            .into_stream(req.content, accepted)
            .map(|frame| Event::default().json_data(&frame));
        let mut response = Sse::new(events).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        return Ok(response);
    }

    let exchange = relay.complete(&req.content, accepted).await?;
    Ok(Json(exchange).into_response())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
