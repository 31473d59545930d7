//! chat-relay-core – the streaming half of chat-relay.
//!
//! This crate owns everything that both ends of a relayed chat exchange
//! agree on:
//!
//! - [`message`]: the persisted [`Message`] model and the [`ChatExchange`]
//!   pair returned once an exchange completes.
//! - [`frame`] / [`decoder`]: the [`StreamFrame`] envelope and the
//!   [`FrameDecoder`] that turns split network reads back into frames, for
//!   both the model API's newline-delimited JSON and the relay's SSE output.
//! - [`upstream`]: the HTTP client for the model completion API.
//! - [`accumulator`]: transcript accumulation and agentic-action tagging.
//! - [`client`]: the relay client loop with its pluggable transports.

pub mod accumulator;
pub mod client;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod message;
pub mod upstream;

pub use accumulator::{ActionTag, Completion, ResponseAccumulator, classify};
pub use client::{RelayClient, TypingState, energy_level};
pub use decoder::{FrameDecoder, FrameStream, decode_line};
pub use error::{ClientError, TransportError, UpstreamError};
pub use frame::{FramingMode, StreamFrame};
pub use message::{ChatExchange, Message, Role};
pub use upstream::{ByteStream, UpstreamClient, UpstreamConfig, UpstreamReply};
