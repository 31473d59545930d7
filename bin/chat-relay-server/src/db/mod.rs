//! Database abstraction layer.
//!
//! [`MessageStore`] defines the interface for persisting chat messages.
//! The default implementation is [`sqlite::SqliteStore`]. To swap to another
//! database, implement [`MessageStore`] for your new type and change the
//! concrete type in [`crate::state::AppState`].
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.

pub mod sqlite;

use chat_relay_core::Message;

/// Append-only chat history, read back in insertion order.
pub trait MessageStore: Send + Sync + 'static {
    /// Persist one message. Messages are never updated afterwards.
    fn create_message(
        &self,
        message: &Message,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;

    /// Every persisted message, oldest first.
    fn list_messages(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, sqlx::Error>> + Send;
}
