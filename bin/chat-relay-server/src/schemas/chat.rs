//! Request / response types for the chat and message routes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Maximum allowed message length in characters. Raw bodies are capped
/// earlier, at [`crate::middleware::trace::MAX_REQUEST_BODY`] bytes.
pub const MAX_CONTENT_CHARS: u64 = 128 * 1024;

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ChatRequest {
    /// The user's message; must contain non-whitespace text.
    #[validate(
        custom(function = not_blank, message = "Message content is required"),
        length(max = MAX_CONTENT_CHARS, message = "Message content is too long")
    )]
    pub content: String,
    /// Stream the reply as server-sent events. Defaults to `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatRequest {
    pub fn streaming(&self) -> bool {
        self.stream.unwrap_or(true)
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// One field-level entry of a 400 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Body of a 400 response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidationErrorResponse {
    /// Always `"Invalid request data"`.
    pub error: String,
    pub details: Vec<FieldError>,
}

/// Response body for `DELETE /api/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClearMessagesResponse {
    pub success: bool,
    pub message: String,
}
