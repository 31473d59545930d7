//! Relay server loop.
//!
//! One accepted chat request moves through
//! `UpstreamPending → {Streaming | Fallback} → Persisting → Complete`.
//! The streaming path is a pull-driven [`futures::stream::unfold`]: each
//! frame is produced only when the response body asks for the next event,
//! so one upstream read is decoded and written before the next read starts.
//! Dropping the stream (client disconnect) drops the loop with it; the user
//! message persisted on acceptance stays, the assistant message is never
//! written.

use std::sync::Arc;

use chat_relay_core::{
    ByteStream, ChatExchange, FrameStream, FramingMode, Message, ResponseAccumulator, StreamFrame,
};
use futures::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::db::MessageStore;
use crate::error::ServerError;
use crate::state::AppState;

/// Drives chat exchanges against the upstream model API and the store.
#[derive(Debug, Clone)]
pub struct RelayService {
    state: Arc<AppState>,
}

/// A request whose user message is durable. The clock for the assistant's
/// response time started at acceptance.
#[derive(Debug)]
pub struct Accepted {
    pub user_message: Message,
    accumulator: ResponseAccumulator,
}

enum RelayPhase {
    UpstreamPending,
    Streaming(FrameStream<ByteStream>),
    Fallback,
    Persisting,
    Complete,
}

impl RelayPhase {
    fn name(&self) -> &'static str {
        match self {
            RelayPhase::UpstreamPending => "upstream_pending",
            RelayPhase::Streaming(_) => "streaming",
            RelayPhase::Fallback => "fallback",
            RelayPhase::Persisting => "persisting",
            RelayPhase::Complete => "complete",
        }
    }
}

struct Relay {
    service: RelayService,
    prompt: String,
    accepted: Accepted,
    phase: RelayPhase,
}

impl Drop for Relay {
    fn drop(&mut self) {
        if !matches!(self.phase, RelayPhase::Complete) {
            info!(
                user_message_id = %self.accepted.user_message.id,
                phase = self.phase.name(),
                deltas = self.accepted.accumulator.deltas(),
                "client disconnected mid-stream; assistant message not persisted"
            );
        }
    }
}

impl RelayService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Persist the user message. Nothing has been sent to the client yet, so
    /// a store failure here surfaces as a 500.
    pub async fn accept(&self, content: &str) -> Result<Accepted, ServerError> {
        let accumulator = ResponseAccumulator::start();
        let user_message = Message::user(content);
        self.state.store.create_message(&user_message).await?;
        debug!(user_message_id = %user_message.id, "user message persisted");
        Ok(Accepted {
            user_message,
            accumulator,
        })
    }

    /// Relay the reply as frames: zero or more chunks, then exactly one
    /// `complete`. Upstream failures at any point become the fallback chunk.
    pub fn into_stream(
        self,
        prompt: String,
        accepted: Accepted,
    ) -> impl Stream<Item = StreamFrame> + Send + 'static {
        let relay = Relay {
            service: self,
            prompt,
            accepted,
            phase: RelayPhase::UpstreamPending,
        };
        futures::stream::unfold(relay, |mut relay| async move {
            let frame = relay.advance().await?;
            Some((frame, relay))
        })
    }

    /// Non-streaming exchange. Shares the accumulator and fallback contract
    /// with the streaming path; the assistant message must persist.
    pub async fn complete(&self, prompt: &str, accepted: Accepted) -> Result<ChatExchange, ServerError> {
        let Accepted {
            user_message,
            mut accumulator,
        } = accepted;

        match self.state.upstream.complete(prompt).await {
            Ok(text) => accumulator.push(&text),
            Err(e) => {
                warn!(error = %e, "upstream unavailable; replying with fallback");
                accumulator.fallback();
            }
        }

        let completion = accumulator.finish();
        info!(
            response_time_ms = completion.response_time_ms,
            fallback = completion.fallback,
            "chat completion done"
        );
        let ai_message = completion.into_message();
        self.state.store.create_message(&ai_message).await?;
        Ok(ChatExchange {
            user_message,
            ai_message,
        })
    }

    /// Best-effort: the client already holds the streamed content.
    async fn persist_streamed(&self, ai_message: &Message) {
        if let Err(e) = self.state.store.create_message(ai_message).await {
            error!(error = %e, ai_message_id = %ai_message.id, "failed to persist streamed assistant message");
        }
    }
}

impl Relay {
    /// Run phases until one produces a frame; `None` once complete.
    async fn advance(&mut self) -> Option<StreamFrame> {
        loop {
            match &mut self.phase {
                RelayPhase::UpstreamPending => {
                    self.phase = match self.service.state.upstream.stream(&self.prompt).await {
                        Ok(reads) => {
                            debug!("upstream stream opened");
                            RelayPhase::Streaming(FrameStream::new(reads, FramingMode::Ndjson))
                        }
                        Err(e) => {
                            warn!(error = %e, "upstream unavailable; replying with fallback");
                            RelayPhase::Fallback
                        }
                    };
                }
                RelayPhase::Streaming(frames) => match frames.next().await {
                    Some(Ok(StreamFrame::Chunk { content })) => {
                        self.accepted.accumulator.push(&content);
                        return Some(StreamFrame::Chunk { content });
                    }
                    // The model API's native format has no terminal envelope.
                    Some(Ok(StreamFrame::Complete(_))) => {}
                    Some(Err(e)) => {
                        warn!(
                            error = %e,
                            deltas = self.accepted.accumulator.deltas(),
                            "upstream failed mid-stream; replying with fallback"
                        );
                        self.phase = RelayPhase::Fallback;
                    }
                    None => self.phase = RelayPhase::Persisting,
                },
                RelayPhase::Fallback => {
                    let content = self.accepted.accumulator.fallback().to_owned();
                    self.phase = RelayPhase::Persisting;
                    return Some(StreamFrame::chunk(content));
                }
                RelayPhase::Persisting => {
                    let completion = self.accepted.accumulator.finish();
                    info!(
                        response_time_ms = completion.response_time_ms,
                        deltas = self.accepted.accumulator.deltas(),
                        fallback = completion.fallback,
                        "chat stream done"
                    );
                    let ai_message = completion.into_message();
                    self.service.persist_streamed(&ai_message).await;
                    self.phase = RelayPhase::Complete;
                    return Some(StreamFrame::Complete(ChatExchange {
                        user_message: self.accepted.user_message.clone(),
                        ai_message,
                    }));
                }
                RelayPhase::Complete => return None,
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
