//! In-memory storage backend.
//!
//! Keeps everything in maps behind async RwLocks. State is lost on
//! restart; intended for development and tests, not deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{StorageError, StorageResult};

use super::{
    ArcArtifact, ArcMessage, ArcRun, Comparison, DebateSession, Storage, VixraSession,
};

#[derive(Default)]
struct Tables {
    comparisons: HashMap<String, Comparison>,
    debate_sessions: HashMap<String, DebateSession>,
    vixra_sessions: HashMap<String, VixraSession>,
    arc_runs: HashMap<String, ArcRun>,
    arc_messages: Vec<ArcMessage>,
    arc_artifacts: Vec<ArcArtifact>,
}

/// Map-backed storage with no persistence.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        info!("Using in-memory storage, data will not survive restarts");
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_comparison(&self, comparison: &Comparison) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .comparisons
            .insert(comparison.id.clone(), comparison.clone());
        Ok(())
    }

    async fn get_comparison(&self, id: &str) -> StorageResult<Option<Comparison>> {
        let tables = self.tables.read().await;
        Ok(tables.comparisons.get(id).cloned())
    }

    async fn list_comparisons(&self, limit: u32) -> StorageResult<Vec<Comparison>> {
        let tables = self.tables.read().await;
        let mut all: Vec<Comparison> = tables.comparisons.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn delete_comparison(&self, id: &str) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.comparisons.remove(id);
        Ok(())
    }

    async fn save_debate_session(&self, session: &DebateSession) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .debate_sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_debate_session(&self, id: &str) -> StorageResult<Option<DebateSession>> {
        let tables = self.tables.read().await;
        Ok(tables.debate_sessions.get(id).cloned())
    }

    async fn update_debate_session(&self, session: &DebateSession) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.debate_sessions.contains_key(&session.id) {
            return Err(StorageError::SessionNotFound {
                session_id: session.id.clone(),
            });
        }
        tables
            .debate_sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn list_debate_sessions(&self, limit: u32) -> StorageResult<Vec<DebateSession>> {
        let tables = self.tables.read().await;
        let mut all: Vec<DebateSession> = tables.debate_sessions.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn delete_debate_session(&self, id: &str) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.debate_sessions.remove(id);
        Ok(())
    }

    async fn save_vixra_session(&self, session: &VixraSession) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .vixra_sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_vixra_session(&self, id: &str) -> StorageResult<Option<VixraSession>> {
        let tables = self.tables.read().await;
        Ok(tables.vixra_sessions.get(id).cloned())
    }

    async fn list_vixra_sessions(&self, limit: u32) -> StorageResult<Vec<VixraSession>> {
        let tables = self.tables.read().await;
        let mut all: Vec<VixraSession> = tables.vixra_sessions.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn create_arc_run(&self, run: &ArcRun) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.arc_runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get_arc_run(&self, id: &str) -> StorageResult<Option<ArcRun>> {
        let tables = self.tables.read().await;
        Ok(tables.arc_runs.get(id).cloned())
    }

    async fn update_arc_run_status(&self, id: &str, status: &str) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let run = tables
            .arc_runs
            .get_mut(id)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: id.to_string(),
            })?;
        run.status = status.to_string();
        run.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn add_arc_message(&self, message: &ArcMessage) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.arc_runs.contains_key(&message.run_id) {
            return Err(StorageError::RunNotFound {
                run_id: message.run_id.clone(),
            });
        }
        tables.arc_messages.push(message.clone());
        Ok(())
    }

    async fn get_arc_messages(&self, run_id: &str) -> StorageResult<Vec<ArcMessage>> {
        let tables = self.tables.read().await;
        let mut messages: Vec<ArcMessage> = tables
            .arc_messages
            .iter()
            .filter(|m| m.run_id == run_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn add_arc_artifact(&self, artifact: &ArcArtifact) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.arc_runs.contains_key(&artifact.run_id) {
            return Err(StorageError::RunNotFound {
                run_id: artifact.run_id.clone(),
            });
        }
        tables.arc_artifacts.push(artifact.clone());
        Ok(())
    }

    async fn get_arc_artifacts(&self, run_id: &str) -> StorageResult<Vec<ArcArtifact>> {
        let tables = self.tables.read().await;
        let mut artifacts: Vec<ArcArtifact> = tables
            .arc_artifacts
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect();
        artifacts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(artifacts)
    }
}
