use thiserror::Error;

/// The model API could not serve a request.
///
/// Connect failures, non-2xx statuses, empty bodies, malformed completion
/// bodies and read timeouts all collapse into this one condition; callers
/// recover from it the same way.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("upstream unavailable: {reason}")]
    Unavailable { reason: String },
}

impl UpstreamError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        UpstreamError::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Errors raised by a single [`crate::client::transport::ChatTransport`].
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Nothing was streamed; the next transport may be tried.
    #[error("transport unreachable: {reason}")]
    Unreachable { reason: String },

    /// The stream broke after it had started.
    #[error("stream interrupted: {reason}")]
    Stream { reason: String },

    /// The stream ended without a terminal `complete` frame.
    #[error("No complete event received")]
    Incomplete,
}

/// Errors returned by [`crate::client::RelayClient::send_message`].
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("no chat transport configured")]
    NoTransport,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
