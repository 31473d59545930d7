use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a [`Message`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub enum Role {
    User,
    Assistant,
}

/// A single chat message. Created once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock milliseconds from request acceptance to stream end.
    /// Always `None` for user messages.
    pub response_time: Option<u64>,
    /// Derived action tags; `None` when nothing matched.
    pub agentic_actions: Option<Vec<String>>,
}

impl Message {
    /// A fresh user message with no timing or tags.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            response_time: None,
            agentic_actions: None,
        }
    }

    /// A fresh assistant message. An empty tag list is stored as `None`.
    pub fn assistant(
        content: impl Into<String>,
        response_time: Option<u64>,
        agentic_actions: Option<Vec<String>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            response_time,
            agentic_actions: agentic_actions.filter(|tags| !tags.is_empty()),
        }
    }
}

/// The persisted user/assistant pair produced by one chat exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ChatExchange {
    pub user_message: Message,
    pub ai_message: Message,
}
