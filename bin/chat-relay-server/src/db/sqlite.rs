//! SQLite implementation of [`MessageStore`].
//!
//! Uses [`sqlx`] with the `sqlite` feature. Migrations are run automatically
//! on startup via [`SqliteStore::connect`].
//!
//! # Migrations path
//!
//! `sqlx::migrate!("./migrations")` resolves the path **at compile time**
//! relative to `CARGO_MANIFEST_DIR`, so the directory is embedded into the
//! binary. The database location is determined at runtime by
//! `CHAT_RELAY_DATABASE_URL`.
//!
//! # Queries
//!
//! The `sqlx::query` (runtime-verified) form is used so that no
//! `DATABASE_URL` environment variable is needed at compile time.

use std::str::FromStr;

use chat_relay_core::{Message, Role};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::warn;

use super::MessageStore;

type MessageRow = (String, String, String, String, Option<i64>, Option<String>);

/// SQLite-backed message store.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g.
    /// `"sqlite://chat-relay.db?mode=rwc"` or `"sqlite::memory:"`. An
    /// in-memory database is private to its connection, so the pool is
    /// pinned to a single connection that is never recycled.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = if is_memory(url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

impl MessageStore for SqliteStore {
    async fn create_message(&self, message: &Message) -> Result<(), sqlx::Error> {
        let agentic_actions = message
            .agentic_actions
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let response_time = message
            .response_time
            .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX));

        sqlx::query(
            "INSERT INTO messages (id, role, content, timestamp, response_time, agentic_actions) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&message.id)
        .bind(message.role.as_ref())
        .bind(&message.content)
        .bind(message.timestamp.to_rfc3339())
        .bind(response_time)
        .bind(agentic_actions)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_messages(&self) -> Result<Vec<Message>, sqlx::Error> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, role, content, timestamp, response_time, agentic_actions \
             FROM messages ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(message_from_row).collect()
    }
}

fn message_from_row(
    (id, role, content, timestamp, response_time, agentic_actions): MessageRow,
) -> Result<Message, sqlx::Error> {
    let role = Role::from_str(&role).map_err(|e| sqlx::Error::ColumnDecode {
        index: "role".into(),
        source: Box::new(e),
    })?;
    let timestamp = timestamp
        .parse::<DateTime<Utc>>()
        .unwrap_or_else(|e| {
            warn!(raw = %timestamp, error = %e, "failed to parse message timestamp; using now");
            Utc::now()
        });
    let agentic_actions = match agentic_actions {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
            index: "agentic_actions".into(),
            source: Box::new(e),
        })?),
        None => None,
    };

    Ok(Message {
        id,
        role,
        content,
        timestamp,
        response_time: response_time.and_then(|ms| u64::try_from(ms).ok()),
        agentic_actions,
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────
