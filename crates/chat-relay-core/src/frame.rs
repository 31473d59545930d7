//! Frame types exchanged between the relay loops.

use serde::{Deserialize, Serialize};

use crate::message::ChatExchange;

/// How a byte stream delimits its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FramingMode {
    /// One JSON object per line carrying a `response` delta (model API).
    Ndjson,
    /// `data: `-prefixed lines wrapping a [`StreamFrame`] (relay → client).
    Sse,
}

/// A decoded unit of a relayed stream.
///
/// On the wire (SSE mode) this is the JSON payload after `data: `:
/// `{"type":"chunk","content":"…"}` or
/// `{"type":"complete","userMessage":{…},"aiMessage":{…}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    /// An append-only content delta.
    Chunk { content: String },
    /// The terminal envelope carrying the persisted message pair.
    Complete(ChatExchange),
}

impl StreamFrame {
    pub fn chunk(content: impl Into<String>) -> Self {
        StreamFrame::Chunk {
            content: content.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StreamFrame::Complete(_))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::Message;

    #[test]
    fn chunk_wire_format() {
        let json = serde_json::to_string(&StreamFrame::chunk("Hi")).unwrap();
        assert_eq!(json, r#"{"type":"chunk","content":"Hi"}"#);
    }

    #[test]
    fn complete_wire_format_carries_both_messages() {
        let frame = StreamFrame::Complete(ChatExchange {
            user_message: Message::user("q"),
            ai_message: Message::assistant("a", Some(5), None),
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["userMessage"]["content"], "q");
        assert_eq!(value["aiMessage"]["responseTime"], 5);
        assert!(frame.is_complete());
    }
}
