//! Relay client loop.
//!
//! [`RelayClient`] runs one exchange at a time through an ordered list of
//! [`ChatTransport`]s. The live "typing" buffer is published on a
//! [`tokio::sync::watch`] channel so a UI can re-render on every delta
//! without owning the loop.

pub mod transport;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{ClientError, TransportError};
use crate::message::ChatExchange;
use crate::upstream::UpstreamConfig;

pub use transport::{BackendTransport, ChatTransport, DirectTransport};

/// Observable state of the exchange in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingState {
    pub is_streaming: bool,
    /// Every delta received so far, in arrival order.
    pub content: String,
    pub error: Option<String>,
}

pub struct RelayClient {
    transports: Vec<Box<dyn ChatTransport>>,
    state: watch::Sender<TypingState>,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.transports.iter().map(|t| t.name()).collect();
        f.debug_struct("RelayClient").field("transports", &names).finish()
    }
}

impl RelayClient {
    /// Transports are tried in order; a transport reporting
    /// [`TransportError::Unreachable`] hands over to the next one.
    pub fn new(transports: Vec<Box<dyn ChatTransport>>) -> Self {
        let (state, _) = watch::channel(TypingState::default());
        Self { transports, state }
    }

    /// Via the relay server first, the model API directly second.
    pub fn with_fallback(backend_url: impl Into<String>, direct: UpstreamConfig) -> Self {
        Self::new(vec![
            Box::new(BackendTransport::new(backend_url)),
            Box::new(DirectTransport::new(direct)),
        ])
    }

    pub fn subscribe(&self) -> watch::Receiver<TypingState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> TypingState {
        self.state.borrow().clone()
    }

    pub async fn send_message(&self, content: &str) -> Result<ChatExchange, ClientError> {
        self.send_message_with(content, |_| {}).await
    }

    /// Run one exchange, also handing each delta to `on_delta`.
    pub async fn send_message_with<F>(
        &self,
        content: &str,
        mut on_delta: F,
    ) -> Result<ChatExchange, ClientError>
    where
        F: FnMut(&str) + Send,
    {
        self.state.send_replace(TypingState {
            is_streaming: true,
            ..TypingState::default()
        });

        let mut last_unreachable = None;
        for transport in &self.transports {
            let state = &self.state;
            let mut apply = |delta: &str| {
                state.send_modify(|s| s.content.push_str(delta));
                on_delta(delta);
            };

            match transport.exchange(content, &mut apply).await {
                Ok(exchange) => {
                    self.state.send_replace(TypingState::default());
                    return Ok(exchange);
                }
                Err(TransportError::Unreachable { reason }) => {
                    info!(transport = transport.name(), %reason, "transport unreachable; trying next");
                    last_unreachable = Some(TransportError::Unreachable { reason });
                }
                Err(e) => return Err(self.fail(e.into())),
            }
        }

        let err = last_unreachable.map_or(ClientError::NoTransport, ClientError::from);
        Err(self.fail(err))
    }

    fn fail(&self, err: ClientError) -> ClientError {
        warn!(error = %err, "chat exchange failed");
        self.state.send_replace(TypingState {
            error: Some(err.to_string()),
            ..TypingState::default()
        });
        err
    }
}

/// Display metric derived from a response time: 100 for instant replies,
/// falling by one point per 50 ms, never below 50.
pub fn energy_level(response_time_ms: u64) -> u8 {
    let level = 100.0 - response_time_ms as f64 / 50.0;
    level.clamp(50.0, 100.0).round() as u8
}

// ── Tests ──────────────────────────────────────────────────────────────────────
