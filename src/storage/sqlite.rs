use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::{
    ArcArtifact, ArcMessage, ArcRun, Comparison, DebateSession, Storage, VixraSession,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory instance for tests.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        // One connection only: each pooled connection would otherwise
        // see its own empty in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn arc_run_exists(&self, run_id: &str) -> StorageResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM arc_runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_comparison(&self, comparison: &Comparison) -> StorageResult<()> {
        let model_ids = serde_json::to_string(&comparison.model_ids)?;
        let responses = serde_json::to_string(&comparison.responses)?;

        sqlx::query(
            r#"
            INSERT INTO comparisons (id, prompt, model_ids, responses, total_cost, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&comparison.id)
        .bind(&comparison.prompt)
        .bind(&model_ids)
        .bind(&responses)
        .bind(comparison.total_cost)
        .bind(comparison.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_comparison(&self, id: &str) -> StorageResult<Option<Comparison>> {
        let row: Option<ComparisonRow> = sqlx::query_as(
            r#"
            SELECT id, prompt, model_ids, responses, total_cost, created_at
            FROM comparisons
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Comparison::try_from).transpose()
    }

    async fn list_comparisons(&self, limit: u32) -> StorageResult<Vec<Comparison>> {
        let rows: Vec<ComparisonRow> = sqlx::query_as(
            r#"
            SELECT id, prompt, model_ids, responses, total_cost, created_at
            FROM comparisons
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Comparison::try_from).collect()
    }

    async fn delete_comparison(&self, id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM comparisons WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn save_debate_session(&self, session: &DebateSession) -> StorageResult<()> {
        let turns = serde_json::to_string(&session.turns)?;
        let last_response_ids = serde_json::to_string(&session.last_response_ids)?;

        sqlx::query(
            r#"
            INSERT INTO debate_sessions
                (id, topic, model_a, model_b, intensity, status, turns, last_response_ids,
                 total_cost, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.topic)
        .bind(&session.model_a)
        .bind(&session.model_b)
        .bind(session.intensity as i64)
        .bind(session.status.to_string())
        .bind(&turns)
        .bind(&last_response_ids)
        .bind(session.total_cost)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_debate_session(&self, id: &str) -> StorageResult<Option<DebateSession>> {
        let row: Option<DebateSessionRow> = sqlx::query_as(
            r#"
            SELECT id, topic, model_a, model_b, intensity, status, turns, last_response_ids,
                   total_cost, created_at, updated_at
            FROM debate_sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DebateSession::try_from).transpose()
    }

    async fn update_debate_session(&self, session: &DebateSession) -> StorageResult<()> {
        let turns = serde_json::to_string(&session.turns)?;
        let last_response_ids = serde_json::to_string(&session.last_response_ids)?;

        let result = sqlx::query(
            r#"
            UPDATE debate_sessions
            SET status = ?, turns = ?, last_response_ids = ?, total_cost = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(session.status.to_string())
        .bind(&turns)
        .bind(&last_response_ids)
        .bind(session.total_cost)
        .bind(session.updated_at.to_rfc3339())
        .bind(&session.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: session.id.clone(),
            });
        }

        Ok(())
    }

    async fn list_debate_sessions(&self, limit: u32) -> StorageResult<Vec<DebateSession>> {
        let rows: Vec<DebateSessionRow> = sqlx::query_as(
            r#"
            SELECT id, topic, model_a, model_b, intensity, status, turns, last_response_ids,
                   total_cost, created_at, updated_at
            FROM debate_sessions
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DebateSession::try_from).collect()
    }

    async fn delete_debate_session(&self, id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM debate_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn save_vixra_session(&self, session: &VixraSession) -> StorageResult<()> {
        let variables = serde_json::to_string(&session.variables)?;
        let sections = serde_json::to_string(&session.sections)?;

        // Upsert: saving an existing ID replaces the whole record
        sqlx::query(
            r#"
            INSERT INTO vixra_sessions (id, variables, sections, model_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                variables = excluded.variables,
                sections = excluded.sections,
                model_id = excluded.model_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session.id)
        .bind(&variables)
        .bind(&sections)
        .bind(&session.model_id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_vixra_session(&self, id: &str) -> StorageResult<Option<VixraSession>> {
        let row: Option<VixraSessionRow> = sqlx::query_as(
            r#"
            SELECT id, variables, sections, model_id, created_at, updated_at
            FROM vixra_sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VixraSession::try_from).transpose()
    }

    async fn list_vixra_sessions(&self, limit: u32) -> StorageResult<Vec<VixraSession>> {
        let rows: Vec<VixraSessionRow> = sqlx::query_as(
            r#"
            SELECT id, variables, sections, model_id, created_at, updated_at
            FROM vixra_sessions
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VixraSession::try_from).collect()
    }

    async fn create_arc_run(&self, run: &ArcRun) -> StorageResult<()> {
        let metadata = run
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO arc_runs (id, task_id, status, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.task_id)
        .bind(&run.status)
        .bind(&metadata)
        .bind(run.created_at.to_rfc3339())
        .bind(run.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_arc_run(&self, id: &str) -> StorageResult<Option<ArcRun>> {
        let row: Option<ArcRunRow> = sqlx::query_as(
            r#"
            SELECT id, task_id, status, metadata, created_at, updated_at
            FROM arc_runs
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn update_arc_run_status(&self, id: &str, status: &str) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE arc_runs
            SET status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::RunNotFound {
                run_id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn add_arc_message(&self, message: &ArcMessage) -> StorageResult<()> {
        if !self.arc_run_exists(&message.run_id).await? {
            return Err(StorageError::RunNotFound {
                run_id: message.run_id.clone(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO arc_messages (id, run_id, role, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.run_id)
        .bind(&message.role)
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_arc_messages(&self, run_id: &str) -> StorageResult<Vec<ArcMessage>> {
        let rows: Vec<ArcMessageRow> = sqlx::query_as(
            r#"
            SELECT id, run_id, role, content, created_at
            FROM arc_messages
            WHERE run_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn add_arc_artifact(&self, artifact: &ArcArtifact) -> StorageResult<()> {
        if !self.arc_run_exists(&artifact.run_id).await? {
            return Err(StorageError::RunNotFound {
                run_id: artifact.run_id.clone(),
            });
        }

        let metadata = artifact
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO arc_artifacts (id, run_id, artifact_type, content, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&artifact.id)
        .bind(&artifact.run_id)
        .bind(&artifact.artifact_type)
        .bind(&artifact.content)
        .bind(&metadata)
        .bind(artifact.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_arc_artifacts(&self, run_id: &str) -> StorageResult<Vec<ArcArtifact>> {
        let rows: Vec<ArcArtifactRow> = sqlx::query_as(
            r#"
            SELECT id, run_id, artifact_type, content, metadata, created_at
            FROM arc_artifacts
            WHERE run_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct ComparisonRow {
    id: String,
    prompt: String,
    model_ids: String,
    responses: String,
    total_cost: f64,
    created_at: String,
}

impl TryFrom<ComparisonRow> for Comparison {
    type Error = StorageError;

    fn try_from(row: ComparisonRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            prompt: row.prompt,
            model_ids: serde_json::from_str(&row.model_ids)?,
            responses: serde_json::from_str(&row.responses)?,
            total_cost: row.total_cost,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct DebateSessionRow {
    id: String,
    topic: String,
    model_a: String,
    model_b: String,
    intensity: i64,
    status: String,
    turns: String,
    last_response_ids: String,
    total_cost: f64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<DebateSessionRow> for DebateSession {
    type Error = StorageError;

    fn try_from(row: DebateSessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            topic: row.topic,
            model_a: row.model_a,
            model_b: row.model_b,
            intensity: row.intensity.clamp(1, 10) as u8,
            status: row.status.parse().unwrap_or_default(),
            turns: serde_json::from_str(&row.turns)?,
            last_response_ids: serde_json::from_str(&row.last_response_ids)?,
            total_cost: row.total_cost,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct VixraSessionRow {
    id: String,
    variables: String,
    sections: String,
    model_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<VixraSessionRow> for VixraSession {
    type Error = StorageError;

    fn try_from(row: VixraSessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            variables: serde_json::from_str(&row.variables)?,
            sections: serde_json::from_str(&row.sections)?,
            model_id: row.model_id,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ArcRunRow {
    id: String,
    task_id: Option<String>,
    status: String,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<ArcRunRow> for ArcRun {
    fn from(row: ArcRunRow) -> Self {
        Self {
            id: row.id,
            task_id: row.task_id,
            status: row.status,
            metadata: row.metadata.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ArcMessageRow {
    id: String,
    run_id: String,
    role: String,
    content: String,
    created_at: String,
}

impl From<ArcMessageRow> for ArcMessage {
    fn from(row: ArcMessageRow) -> Self {
        Self {
            id: row.id,
            run_id: row.run_id,
            role: row.role,
            content: row.content,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ArcArtifactRow {
    id: String,
    run_id: String,
    artifact_type: String,
    content: String,
    metadata: Option<String>,
    created_at: String,
}

impl From<ArcArtifactRow> for ArcArtifact {
    fn from(row: ArcArtifactRow) -> Self {
        Self {
            id: row.id,
            run_id: row.run_id,
            artifact_type: row.artifact_type,
            content: row.content,
            metadata: row.metadata.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: parse_timestamp(&row.created_at),
        }
    }
}
