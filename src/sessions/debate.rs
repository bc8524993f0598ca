//! Debate ledger: an ordered, de-duplicated record of debate turns.
//!
//! Pure state machine, no I/O. The server keeps one ledger per live
//! debate and snapshots it into storage; clients rebuild theirs from
//! the snapshot via hydration.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::storage::DebateSession;

use super::{message_key, DebateMessage, DebateTurn, JuryAnnotation};

/// Who speaks next and how to continue their thread.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResumeContext {
    pub next_model_id: String,
    pub next_turn_number: u32,
    /// The next speaker's most recent response id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_response_id: Option<String>,
}

/// Reconciled state of one debate.
///
/// Odd turn numbers belong to the pro side (`model_a`), even turns to
/// the con side (`model_b`).
#[derive(Debug, Clone)]
pub struct DebateLedger {
    session_id: String,
    model_a: String,
    model_b: String,
    turns: Vec<DebateTurn>,
    messages: Vec<DebateMessage>,
    jury: HashMap<String, JuryAnnotation>,
}

impl DebateLedger {
    pub fn new(
        session_id: impl Into<String>,
        model_a: impl Into<String>,
        model_b: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            model_a: model_a.into(),
            model_b: model_b.into(),
            turns: Vec::new(),
            messages: Vec::new(),
            jury: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turns(&self) -> &[DebateTurn] {
        &self.turns
    }

    pub fn messages(&self) -> &[DebateMessage] {
        &self.messages
    }

    pub fn jury(&self) -> &HashMap<String, JuryAnnotation> {
        &self.jury
    }

    /// Insert or replace a turn.
    ///
    /// Matches by response id first, then by `(turn_number, model_id)`;
    /// a match replaces in place, so replaying the same response id
    /// leaves exactly one entry holding the latest content. Turns stay
    /// ordered by turn number.
    pub fn upsert_turn(&mut self, turn: DebateTurn) {
        let existing = self.turns.iter().position(|t| turn_matches(t, &turn));
        match existing {
            Some(index) => {
                debug!(
                    session_id = %self.session_id,
                    turn = turn.turn_number,
                    "Replacing existing debate turn"
                );
                self.turns[index] = turn;
            }
            None => self.turns.push(turn),
        }
        self.turns.sort_by_key(|t| t.turn_number);
    }

    /// Insert or replace a message, keyed the same way as turns.
    pub fn add_message(&mut self, message: DebateMessage) {
        let existing = self.messages.iter().position(|m| m.id == message.id);
        match existing {
            Some(index) => self.messages[index] = message,
            None => self.messages.push(message),
        }
        self.messages.sort_by_key(|m| m.turn_number);
    }

    /// Record a finished turn in both the turn history and the message
    /// list.
    pub fn record_turn(&mut self, turn: DebateTurn) {
        self.add_message(DebateMessage::from_turn(&turn));
        self.upsert_turn(turn);
    }

    /// Replace all local state from a persisted snapshot.
    ///
    /// Messages are rebuilt from the turn history; reasoning support is
    /// inferred from whether a turn carries reasoning text, so a model
    /// that reasoned silently reads as non-reasoning after hydration.
    pub fn hydrate_from_session(&mut self, session: &DebateSession) {
        self.session_id = session.id.clone();
        self.model_a = session.model_a.clone();
        self.model_b = session.model_b.clone();
        self.turns = session.turns.clone();
        self.turns.sort_by_key(|t| t.turn_number);
        self.messages = self.turns.iter().map(DebateMessage::from_turn).collect();
        self.jury.clear();
        debug!(
            session_id = %self.session_id,
            turns = self.turns.len(),
            "Hydrated debate ledger from snapshot"
        );
    }

    /// Who speaks next, by parity of the highest turn number.
    ///
    /// An odd number of the highest turn means the pro side has spoken
    /// and the con side is up. The returned response id is the next
    /// speaker's own latest one, for thread continuation.
    pub fn resume_context(&self) -> ResumeContext {
        let highest = self.turns.last().map(|t| t.turn_number).unwrap_or(0);
        let next_turn_number = highest + 1;
        let next_model_id = if next_turn_number % 2 == 1 {
            self.model_a.clone()
        } else {
            self.model_b.clone()
        };
        let last_response_id = self
            .turns
            .iter()
            .rev()
            .find(|t| t.model_id == next_model_id)
            .and_then(|t| t.response_id.clone());
        ResumeContext {
            next_model_id,
            next_turn_number,
            last_response_id,
        }
    }

    /// The latest turn content from the given model's opponent, for
    /// rebuttal prompts.
    pub fn last_opponent_content(&self, model_id: &str) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.model_id != model_id)
            .map(|t| t.content.as_str())
    }

    /// Latest response id per model, for thread continuation across
    /// restarts.
    pub fn last_response_ids(&self) -> HashMap<String, String> {
        let mut ids = HashMap::new();
        for turn in &self.turns {
            if let Some(response_id) = &turn.response_id {
                ids.insert(turn.model_id.clone(), response_id.clone());
            }
        }
        ids
    }

    /// Store a juror's verdict for one debater, keyed by model id.
    pub fn set_jury_annotation(&mut self, note: JuryAnnotation) {
        self.jury.insert(note.model_id.clone(), note);
    }

    pub fn jury_annotation(&self, model_id: &str) -> Option<&JuryAnnotation> {
        self.jury.get(model_id)
    }

    /// Sum of all turn costs.
    pub fn total_cost(&self) -> f64 {
        self.turns.iter().map(|t| t.cost.total).sum()
    }

    /// Drop all turns, messages, and jury notes.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.messages.clear();
        self.jury.clear();
    }
}

fn turn_matches(existing: &DebateTurn, incoming: &DebateTurn) -> bool {
    match (&existing.response_id, &incoming.response_id) {
        (Some(a), Some(b)) => a == b,
        _ => {
            existing.turn_number == incoming.turn_number && existing.model_id == incoming.model_id
        }
    }
}
