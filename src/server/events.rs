//! Frame types for the debate SSE stream.

use axum::response::sse::Event;
use serde::Serialize;

use crate::providers::{Cost, TokenUsage};

/// One frame on a debate stream, serialized as `data: {"type": ...}`.
///
/// A stream is `status` followed by any number of `reasoning`/`text`
/// deltas, then exactly one terminal `complete` or `error` frame. The
/// turn is persisted before `complete` goes out.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Reasoning/thinking trace delta.
    Reasoning { text: String },
    /// Answer text delta.
    Text { text: String },
    /// Structured payload for clients that want more than text.
    Json { payload: serde_json::Value },
    /// Progress note.
    Status { message: String },
    /// Terminal success frame carrying the finished turn's identity.
    #[serde(rename_all = "camelCase")]
    Complete {
        response_id: String,
        turn_number: u32,
        model_id: String,
        token_usage: TokenUsage,
        cost: Cost,
    },
    /// Terminal failure frame.
    Error { message: String },
}

impl StreamEvent {
    pub fn reasoning(text: impl Into<String>) -> Self {
        StreamEvent::Reasoning { text: text.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        StreamEvent::Text { text: text.into() }
    }

    pub fn status(message: impl Into<String>) -> Self {
        StreamEvent::Status {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    /// Convert into an axum SSE event.
    pub fn into_sse(self) -> Event {
        match Event::default().json_data(&self) {
            Ok(event) => event,
            Err(_) => Event::default()
                .data(r#"{"type":"error","message":"frame serialization failed"}"#),
        }
    }
}
