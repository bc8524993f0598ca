//! Storage layer for comparison, debate, vixra, and ARC run records.
//!
//! Two backends implement the [`Storage`] trait: an in-memory map for
//! keyless development and a SQLite database for durable deployments.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::providers::ModelResponse;
use crate::sessions::DebateTurn;

/// A persisted side-by-side comparison. Write-once.
///
/// Models that failed have no entry in `responses`; the error only
/// reaches the caller of `/api/compare`, it is not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    /// Unique comparison identifier.
    pub id: String,
    /// The prompt sent to every model.
    pub prompt: String,
    /// Models that were asked, in request order.
    pub model_ids: Vec<String>,
    /// Successful responses keyed by model id.
    pub responses: HashMap<String, ModelResponse>,
    /// Sum of costs across successful responses.
    pub total_cost: f64,
    /// When the comparison was run.
    pub created_at: DateTime<Utc>,
}

impl Comparison {
    pub fn new(
        prompt: impl Into<String>,
        model_ids: Vec<String>,
        responses: HashMap<String, ModelResponse>,
    ) -> Self {
        let total_cost = responses.values().map(|r| r.cost.total).sum();
        Self {
            id: Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            model_ids,
            responses,
            total_cost,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle state of a debate session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    /// Debate is in progress.
    #[default]
    Active,
    /// Debate has finished.
    Completed,
}

impl std::fmt::Display for DebateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebateStatus::Active => write!(f, "active"),
            DebateStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for DebateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(DebateStatus::Active),
            "completed" => Ok(DebateStatus::Completed),
            _ => Err(format!("Unknown debate status: {}", s)),
        }
    }
}

/// A persisted debate between two models.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateSession {
    /// Unique session identifier.
    pub id: String,
    /// The proposition being debated.
    pub topic: String,
    /// Model arguing the pro side (odd turns).
    pub model_a: String,
    /// Model arguing the con side (even turns).
    pub model_b: String,
    /// Debate intensity, 1-10.
    pub intensity: u8,
    /// Current lifecycle state.
    pub status: DebateStatus,
    /// Completed turns, ordered by turn number.
    pub turns: Vec<DebateTurn>,
    /// Latest response id per model, for thread continuation.
    pub last_response_ids: HashMap<String, String>,
    /// Sum of turn costs.
    pub total_cost: f64,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last updated.
    pub updated_at: DateTime<Utc>,
}

impl DebateSession {
    /// Create a new active session with no turns.
    pub fn new(
        topic: impl Into<String>,
        model_a: impl Into<String>,
        model_b: impl Into<String>,
        intensity: u8,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            model_a: model_a.into(),
            model_b: model_b.into(),
            intensity: intensity.clamp(1, 10),
            status: DebateStatus::Active,
            turns: Vec::new(),
            last_response_ids: HashMap::new(),
            total_cost: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the turn history and refresh the derived fields
    /// (per-model last response ids, total cost, updated timestamp).
    pub fn set_turns(&mut self, mut turns: Vec<DebateTurn>) {
        turns.sort_by_key(|t| t.turn_number);
        self.total_cost = turns.iter().map(|t| t.cost.total).sum();
        self.last_response_ids = turns
            .iter()
            .filter_map(|t| {
                t.response_id
                    .as_ref()
                    .map(|id| (t.model_id.clone(), id.clone()))
            })
            .collect();
        self.turns = turns;
        self.updated_at = Utc::now();
    }
}

/// One generated section of a vixra paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VixraSection {
    /// Template id the section was generated from.
    pub section_id: String,
    /// Human-readable section title.
    pub title: String,
    /// Generated section body.
    pub content: String,
}

/// A persisted satirical paper session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VixraSession {
    /// Unique session identifier.
    pub id: String,
    /// Paper variables (Title, Authors, ...).
    pub variables: HashMap<String, serde_json::Value>,
    /// Generated sections in paper order.
    pub sections: Vec<VixraSection>,
    /// Model used for generation, if chosen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last updated.
    pub updated_at: DateTime<Utc>,
}

impl VixraSession {
    pub fn new(variables: HashMap<String, serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            variables,
            sections: Vec::new(),
            model_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Append or replace a section by its id.
    pub fn upsert_section(&mut self, section: VixraSection) {
        match self
            .sections
            .iter()
            .position(|s| s.section_id == section.section_id)
        {
            Some(index) => self.sections[index] = section,
            None => self.sections.push(section),
        }
        self.updated_at = Utc::now();
    }
}

/// An experiment run in the ARC puzzle log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcRun {
    /// Unique run identifier.
    pub id: String,
    /// External task identifier, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Free-form run status (e.g., "running", "solved").
    pub status: String,
    /// Optional run metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// When the run started.
    pub created_at: DateTime<Utc>,
    /// When the run was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ArcRun {
    pub fn new(status: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: None,
            status: status.into(),
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One logged message within an ARC run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcMessage {
    /// Unique message identifier.
    pub id: String,
    /// Parent run ID.
    pub run_id: String,
    /// Message role (e.g., "user", "assistant", "system").
    pub role: String,
    /// Message content.
    pub content: String,
    /// When the message was logged.
    pub created_at: DateTime<Utc>,
}

impl ArcMessage {
    pub fn new(
        run_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            role: role.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A produced artifact within an ARC run (grids, solutions, notes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcArtifact {
    /// Unique artifact identifier.
    pub id: String,
    /// Parent run ID.
    pub run_id: String,
    /// Artifact kind (e.g., "grid", "solution").
    pub artifact_type: String,
    /// Artifact payload, serialized by the producer.
    pub content: String,
    /// Optional artifact metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// When the artifact was logged.
    pub created_at: DateTime<Utc>,
}

impl ArcArtifact {
    pub fn new(
        run_id: impl Into<String>,
        artifact_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            artifact_type: artifact_type.into(),
            content: content.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Storage trait for persistence operations.
///
/// Backends must behave identically for the session-not-found and
/// run-not-found cases so the HTTP layer maps them uniformly.
#[async_trait]
pub trait Storage: Send + Sync {
    // Comparison operations

    /// Persist a comparison.
    async fn save_comparison(&self, comparison: &Comparison) -> StorageResult<()>;
    /// Get a comparison by ID.
    async fn get_comparison(&self, id: &str) -> StorageResult<Option<Comparison>>;
    /// Most recent comparisons, newest first.
    async fn list_comparisons(&self, limit: u32) -> StorageResult<Vec<Comparison>>;
    /// Delete a comparison by ID.
    async fn delete_comparison(&self, id: &str) -> StorageResult<()>;

    // Debate session operations

    /// Persist a new debate session.
    async fn save_debate_session(&self, session: &DebateSession) -> StorageResult<()>;
    /// Get a debate session by ID.
    async fn get_debate_session(&self, id: &str) -> StorageResult<Option<DebateSession>>;
    /// Update an existing session; fails if it does not exist.
    async fn update_debate_session(&self, session: &DebateSession) -> StorageResult<()>;
    /// Most recent debate sessions, newest first.
    async fn list_debate_sessions(&self, limit: u32) -> StorageResult<Vec<DebateSession>>;
    /// Delete a debate session by ID.
    async fn delete_debate_session(&self, id: &str) -> StorageResult<()>;

    // Vixra session operations

    /// Persist a vixra session; saving an existing ID replaces it.
    async fn save_vixra_session(&self, session: &VixraSession) -> StorageResult<()>;
    /// Get a vixra session by ID.
    async fn get_vixra_session(&self, id: &str) -> StorageResult<Option<VixraSession>>;
    /// Most recent vixra sessions, newest first.
    async fn list_vixra_sessions(&self, limit: u32) -> StorageResult<Vec<VixraSession>>;

    // ARC run log operations

    /// Create a new ARC run.
    async fn create_arc_run(&self, run: &ArcRun) -> StorageResult<()>;
    /// Get an ARC run by ID.
    async fn get_arc_run(&self, id: &str) -> StorageResult<Option<ArcRun>>;
    /// Update a run's status; fails if the run does not exist.
    async fn update_arc_run_status(&self, id: &str, status: &str) -> StorageResult<()>;
    /// Log a message against a run; fails if the run does not exist.
    async fn add_arc_message(&self, message: &ArcMessage) -> StorageResult<()>;
    /// All messages for a run, oldest first.
    async fn get_arc_messages(&self, run_id: &str) -> StorageResult<Vec<ArcMessage>>;
    /// Log an artifact against a run; fails if the run does not exist.
    async fn add_arc_artifact(&self, artifact: &ArcArtifact) -> StorageResult<()>;
    /// All artifacts for a run, oldest first.
    async fn get_arc_artifacts(&self, run_id: &str) -> StorageResult<Vec<ArcArtifact>>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::providers::{Cost, TokenUsage};

    use super::*;

    fn response(total_cost: f64) -> ModelResponse {
        ModelResponse {
            content: "answer".to_string(),
            reasoning: None,
            response_time_ms: 50,
            token_usage: TokenUsage::default(),
            cost: Cost {
                input: 0.0,
                output: 0.0,
                reasoning: 0.0,
                total: total_cost,
            },
            model_config: None,
        }
    }

    #[test]
    fn test_comparison_totals_recorded_responses() {
        let mut responses = HashMap::new();
        responses.insert("a".to_string(), response(0.004));
        responses.insert("c".to_string(), response(0.002));

        let comparison = Comparison::new(
            "prompt",
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            responses,
        );
        assert!((comparison.total_cost - 0.006).abs() < 1e-12);
        // Failed models stay in model_ids but have no response entry
        assert!(comparison.responses.get("b").is_none());
        assert_eq!(comparison.model_ids.len(), 3);
    }

    #[test]
    fn test_debate_session_clamps_intensity() {
        assert_eq!(DebateSession::new("t", "a", "b", 15).intensity, 10);
        assert_eq!(DebateSession::new("t", "a", "b", 0).intensity, 1);
    }

    #[test]
    fn test_set_turns_refreshes_derived_fields() {
        use crate::sessions::DebateTurn;
        use chrono::Utc;

        let make_turn = |number: u32, model: &str, response_id: Option<&str>| DebateTurn {
            turn_number: number,
            model_id: model.to_string(),
            content: "text".to_string(),
            reasoning: None,
            response_id: response_id.map(|r| r.to_string()),
            token_usage: TokenUsage::default(),
            cost: Cost {
                input: 0.0,
                output: 0.0,
                reasoning: 0.0,
                total: 0.001,
            },
            response_time_ms: 10,
            timestamp: Utc::now(),
        };

        let mut session = DebateSession::new("topic", "a", "b", 5);
        session.set_turns(vec![
            make_turn(3, "a", Some("a-2")),
            make_turn(1, "a", Some("a-1")),
            make_turn(2, "b", None),
        ]);

        assert_eq!(session.turns[0].turn_number, 1);
        assert!((session.total_cost - 0.003).abs() < 1e-12);
        assert_eq!(
            session.last_response_ids.get("a").map(String::as_str),
            Some("a-2")
        );
        assert!(session.last_response_ids.get("b").is_none());
    }

    #[test]
    fn test_debate_status_round_trip() {
        assert_eq!(DebateStatus::Active.to_string(), "active");
        assert_eq!(
            "completed".parse::<DebateStatus>().unwrap(),
            DebateStatus::Completed
        );
        assert!("paused".parse::<DebateStatus>().is_err());
    }

    #[test]
    fn test_vixra_upsert_section() {
        let mut session = VixraSession::new(HashMap::new());
        session.upsert_section(VixraSection {
            section_id: "abstract-section".to_string(),
            title: "Abstract".to_string(),
            content: "draft".to_string(),
        });
        session.upsert_section(VixraSection {
            section_id: "abstract-section".to_string(),
            title: "Abstract".to_string(),
            content: "final".to_string(),
        });

        assert_eq!(session.sections.len(), 1);
        assert_eq!(session.sections[0].content, "final");
    }

    #[test]
    fn test_arc_builders() {
        let run = ArcRun::new("running")
            .with_task("task-7")
            .with_metadata(json!({"attempt": 1}));
        assert_eq!(run.task_id.as_deref(), Some("task-7"));
        assert_eq!(run.metadata.unwrap()["attempt"], 1);

        let message = ArcMessage::new(&run.id, "assistant", "working on it");
        assert_eq!(message.run_id, run.id);
    }

    #[test]
    fn test_records_serialize_camel_case() {
        let comparison = Comparison::new("p", vec!["a".to_string()], HashMap::new());
        let value = serde_json::to_value(&comparison).unwrap();
        assert!(value.get("modelIds").is_some());
        assert!(value.get("totalCost").is_some());
        assert!(value.get("createdAt").is_some());

        let session = DebateSession::new("t", "a", "b", 5);
        let value = serde_json::to_value(&session).unwrap();
        assert!(value.get("lastResponseIds").is_some());
        assert!(value.get("updatedAt").is_some());
    }
}
