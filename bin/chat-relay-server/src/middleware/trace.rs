use axum::{
    Json,
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use serde_json::json;
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::ServerError;
use crate::schemas::chat::FieldError;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Bodies at or above this size are summarised instead of logged.
const MAX_LOGGED_BODY: usize = 1024;

/// Largest request body buffered; anything bigger is rejected with 413
/// before it reaches a handler.
pub const MAX_REQUEST_BODY: usize = 1024 * 1024;

/// Per-request span, trace-ID propagation and small-body logging.
///
/// The request body is buffered, up to [`MAX_REQUEST_BODY`], so small JSON
/// payloads can be logged. The response body is passed through untouched:
/// buffering it would hold back every server-sent event until the stream
/// ends.
pub async fn trace_middleware(req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();

    // Extract or generate the trace ID.
    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");
        let (parts, body) = req.into_parts();

        let req_bytes = match buffer_and_log(&parts.headers, body).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let mut response = reject_body(e);
                if let Some(value) = trace_header {
                    response.headers_mut().insert(X_TRACE_ID, value);
                }
                return response;
            }
        };
        let mut req = Request::from_parts(parts, Body::from(req_bytes));
        if let Some(value) = &trace_header {
            req.headers_mut().insert(X_TRACE_ID, value.clone());
        }

        let mut response = next.run(req).await;
        if let Some(value) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            streaming = is_event_stream(response.headers()),
            "← response started"
        );

        response
    }
    .instrument(span)
    .await
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"))
}

fn reject_body(e: axum::Error) -> Response {
    let too_large = e
        .into_inner()
        .downcast_ref::<LengthLimitError>()
        .is_some();
    if too_large {
        warn!(limit = MAX_REQUEST_BODY, "request body too large");
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({ "error": "Request body too large" })),
        )
            .into_response();
    }
    warn!("failed to read request body");
    ServerError::Validation(vec![FieldError {
        field: "body".to_owned(),
        message: "Failed to read request body".to_owned(),
    }])
    .into_response()
}

/// Buffer a request body, logging it when it is small JSON.
async fn buffer_and_log(headers: &HeaderMap, body: Body) -> Result<Bytes, axum::Error> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let is_json = content_type.contains("application/json");

    let bytes = axum::body::to_bytes(body, MAX_REQUEST_BODY).await?;

    if is_json && bytes.len() < MAX_LOGGED_BODY {
        if let Ok(text) = std::str::from_utf8(&bytes) {
            debug!(body = %text, "request body");
        }
    } else if !bytes.is_empty() {
        debug!(content_type, size = bytes.len(), "request body skipped");
    }

    Ok(bytes)
}
