//! Transports a [`super::RelayClient`] can drive an exchange through.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tracing::debug;

use crate::accumulator::ResponseAccumulator;
use crate::decoder::FrameStream;
use crate::error::TransportError;
use crate::frame::{FramingMode, StreamFrame};
use crate::message::{ChatExchange, Message};
use crate::upstream::{UpstreamClient, UpstreamConfig};

/// Shown when the model API cannot be reached without the relay server.
pub const DIRECT_UNREACHABLE_HINT: &str =
    "Unable to connect to AI service. Please run with the local backend server.";

/// One way of running a chat exchange.
///
/// `on_delta` receives every content delta in arrival order. An
/// implementation must return [`TransportError::Unreachable`] only when it
/// has not yet delivered any delta.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn exchange(
        &self,
        content: &str,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<ChatExchange, TransportError>;
}

/// Relays through the chat-relay server's SSE endpoint.
#[derive(Debug, Clone)]
pub struct BackendTransport {
    base_url: String,
    client: reqwest::Client,
}

impl BackendTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatTransport for BackendTransport {
    fn name(&self) -> &'static str {
        "backend"
    }

    async fn exchange(
        &self,
        content: &str,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<ChatExchange, TransportError> {
        let response = self
            .client
            .post(self.chat_url())
            .json(&json!({ "content": content, "stream": true }))
            .send()
            .await
            .map_err(|e| TransportError::Unreachable {
                reason: format!("backend request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Unreachable {
                reason: format!("backend returned {status}"),
            });
        }
        if response.content_length() == Some(0) {
            return Err(TransportError::Unreachable {
                reason: "backend response has no body".to_owned(),
            });
        }

        let mut frames = FrameStream::new(Box::pin(response.bytes_stream()), FramingMode::Sse);
        let mut completed = None;
        while let Some(frame) = frames.next().await {
            let frame = frame.map_err(|e| TransportError::Stream {
                reason: e.to_string(),
            })?;
            match frame {
                StreamFrame::Chunk { content } => on_delta(&content),
                StreamFrame::Complete(exchange) => completed = Some(exchange),
            }
        }
        completed.ok_or(TransportError::Incomplete)
    }
}

/// Calls the model API directly and decodes its native NDJSON stream.
///
/// Nothing is persisted server-side: the user message is fabricated locally
/// and the assistant message is built from the local transcript.
#[derive(Debug, Clone)]
pub struct DirectTransport {
    upstream: UpstreamClient,
}

impl DirectTransport {
    pub fn new(config: UpstreamConfig) -> Self {
        Self {
            upstream: UpstreamClient::new(config),
        }
    }
}

#[async_trait]
impl ChatTransport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn exchange(
        &self,
        content: &str,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<ChatExchange, TransportError> {
        let user_message = Message::user(content);
        let mut accumulator = ResponseAccumulator::start();

        let reads = self
            .upstream
            .stream(content)
            .await
            .map_err(|e| TransportError::Unreachable {
                reason: format!("{DIRECT_UNREACHABLE_HINT} ({e})"),
            })?;

        let mut frames = FrameStream::new(reads, FramingMode::Ndjson);
        while let Some(frame) = frames.next().await {
            let frame = frame.map_err(|e| TransportError::Stream {
                reason: e.to_string(),
            })?;
            if let StreamFrame::Chunk { content } = frame {
                accumulator.push(&content);
                on_delta(&content);
            }
        }

        let completion = accumulator.finish();
        debug!(
            deltas = accumulator.deltas(),
            response_time_ms = completion.response_time_ms,
            "direct exchange finished"
        );
        Ok(ChatExchange {
            user_message,
            ai_message: completion.into_message(),
        })
    }
}
