//! Debate session domain types and the reconciliation ledger.

pub mod debate;

pub use debate::{DebateLedger, ResumeContext};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::{Cost, ModelResponse, TokenUsage};

/// One completed debate turn.
///
/// Identified by `response_id` when the server issued one, otherwise by
/// `(turn_number, model_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebateTurn {
    pub turn_number: u32,
    pub model_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    pub token_usage: TokenUsage,
    pub cost: Cost,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl DebateTurn {
    /// Build a turn from a finished model response.
    pub fn from_response(
        turn_number: u32,
        model_id: impl Into<String>,
        response_id: impl Into<String>,
        response: &ModelResponse,
    ) -> Self {
        Self {
            turn_number,
            model_id: model_id.into(),
            content: response.content.clone(),
            reasoning: response.reasoning.clone(),
            response_id: Some(response_id.into()),
            token_usage: response.token_usage.clone(),
            cost: response.cost.clone(),
            response_time_ms: response.response_time_ms,
            timestamp: Utc::now(),
        }
    }
}

/// Display-oriented message derived from turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebateMessage {
    /// Response id when known, otherwise a synthetic `turn-{n}-{model}` key.
    pub id: String,
    pub turn_number: u32,
    pub model_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Whether the model showed reasoning for this message. Inferred
    /// from reasoning presence when rebuilt from a snapshot.
    pub supports_reasoning: bool,
    pub timestamp: DateTime<Utc>,
}

impl DebateMessage {
    pub fn from_turn(turn: &DebateTurn) -> Self {
        Self {
            id: message_key(turn),
            turn_number: turn.turn_number,
            model_id: turn.model_id.clone(),
            content: turn.content.clone(),
            reasoning: turn.reasoning.clone(),
            supports_reasoning: turn.reasoning.is_some(),
            timestamp: turn.timestamp,
        }
    }
}

pub(crate) fn message_key(turn: &DebateTurn) -> String {
    turn.response_id
        .clone()
        .unwrap_or_else(|| format!("turn-{}-{}", turn.turn_number, turn.model_id))
}

/// A juror's running verdict on one debater. Reset when a new session starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JuryAnnotation {
    pub model_id: String,
    pub points: i32,
    pub tags: Vec<String>,
    pub notes: String,
    pub needs_review: bool,
}

impl JuryAnnotation {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ModelResponse;

    fn response(content: &str, reasoning: Option<&str>) -> ModelResponse {
        ModelResponse {
            content: content.to_string(),
            reasoning: reasoning.map(|r| r.to_string()),
            response_time_ms: 120,
            token_usage: TokenUsage {
                input: 100,
                output: 50,
                reasoning: None,
            },
            cost: Cost {
                input: 0.0002,
                output: 0.0004,
                reasoning: 0.0,
                total: 0.0006,
            },
            model_config: None,
        }
    }

    #[test]
    fn test_turn_from_response() {
        let turn = DebateTurn::from_response(3, "gpt-4o", "resp-1", &response("hi", None));
        assert_eq!(turn.turn_number, 3);
        assert_eq!(turn.model_id, "gpt-4o");
        assert_eq!(turn.response_id.as_deref(), Some("resp-1"));
        assert_eq!(turn.cost.total, 0.0006);
    }

    #[test]
    fn test_message_key_prefers_response_id() {
        let with_id = DebateTurn::from_response(1, "m", "resp-9", &response("x", None));
        assert_eq!(message_key(&with_id), "resp-9");

        let mut without = with_id.clone();
        without.response_id = None;
        assert_eq!(message_key(&without), "turn-1-m");
    }

    #[test]
    fn test_message_reasoning_inference() {
        let plain = DebateTurn::from_response(1, "m", "r1", &response("x", None));
        assert!(!DebateMessage::from_turn(&plain).supports_reasoning);

        let thinking = DebateTurn::from_response(2, "m", "r2", &response("x", Some("because")));
        assert!(DebateMessage::from_turn(&thinking).supports_reasoning);
    }
}
