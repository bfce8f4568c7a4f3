//! C4: bind agent, terminal and memory bank; persist and restore sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::agents::AgentId;
use crate::error::{KernelError, KernelResult};
use crate::events::{Event, EventBus};

use super::model::{Session, SessionId, SessionStatus};

const DEFAULT_TERMINATE_BATCH_SIZE: usize = 5;

/// The on-disk shape of a persisted session document, per the wire spec's
/// "Persisted session format".
#[derive(Debug, Serialize, Deserialize)]
struct PersistedDocument {
    sessions: Vec<Session>,
    metrics: PersistedMetrics,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedMetrics {
    completed_tasks: u64,
    failed_tasks: u64,
    total_task_duration_ms: u64,
}

pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Session>>,
    events: Arc<EventBus>,
    retention: chrono::Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(events: Arc<EventBus>, retention: chrono::Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            events,
            retention,
        }
    }

    /// Create a new active session. Rejects when the (agent, terminal) pair
    /// already has an active session.
    pub async fn create_session(
        &self,
        agent_id: AgentId,
        terminal_id: impl Into<String>,
        memory_bank_id: impl Into<String>,
    ) -> KernelResult<SessionId> {
        let terminal_id = terminal_id.into();
        let mut sessions = self.sessions.write().await;
        if sessions
            .values()
            .any(|s| s.agent_id == agent_id && s.terminal_id == terminal_id && s.is_active())
        {
            return Err(KernelError::Conflict(format!(
                "an active session already exists for agent {agent_id} on terminal {terminal_id}"
            )));
        }
        let session = Session::new(agent_id, terminal_id, memory_bank_id);
        let id = session.id.clone();
        sessions.insert(id.clone(), session);
        drop(sessions);

        self.events
            .emit(Event::new("session:created", id.to_string(), json!({ "sessionId": id.0 })))
            .await;
        Ok(id)
    }

    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Terminate one session. The record stays queryable until `cleanup`
    /// removes it.
    pub async fn terminate_session(&self, id: &SessionId) -> KernelResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| KernelError::NotFound { kind: "session", id: id.to_string() })?;
        if session.status == SessionStatus::Terminated {
            return Ok(());
        }
        session.terminate();
        drop(sessions);

        self.events
            .emit(Event::new("session:terminated", id.to_string(), json!({ "sessionId": id.0 })))
            .await;
        Ok(())
    }

    /// Terminate every non-terminated session in bounded-concurrency
    /// batches to avoid a flush storm.
    pub async fn terminate_all_sessions(&self) -> KernelResult<()> {
        self.terminate_all_sessions_with_batch_size(DEFAULT_TERMINATE_BATCH_SIZE).await
    }

    pub async fn terminate_all_sessions_with_batch_size(&self, batch_size: usize) -> KernelResult<()> {
        let ids: Vec<SessionId> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| s.is_active())
                .map(|s| s.id.clone())
                .collect()
        };
        for batch in ids.chunks(batch_size.max(1)) {
            let futures = batch.iter().map(|id| self.terminate_session(id));
            for result in futures::future::join_all(futures).await {
                result?;
            }
        }
        Ok(())
    }

    /// A restartable snapshot of every session.
    pub async fn all(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Remove terminated sessions older than the retention window.
    pub async fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !(s.status == SessionStatus::Terminated && s.ended_at.is_some_and(|t| t < cutoff)));
        before - sessions.len()
    }

    /// Serialize active/idle sessions to a single JSON document, written
    /// atomically (temp file + rename).
    pub async fn persist_sessions(&self, path: &Path) -> KernelResult<()> {
        let sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect();
        let document = PersistedDocument {
            sessions,
            metrics: PersistedMetrics::default(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| KernelError::External(format!("failed to serialize sessions: {e}")))?;

        let tmp_path: PathBuf = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| KernelError::External(format!("failed to write session snapshot: {e}")))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| KernelError::External(format!("failed to finalize session snapshot: {e}")))?;
        Ok(())
    }

    /// Load a persisted document, filtering to non-terminated entries.
    pub async fn restore_sessions(&self, path: &Path) -> KernelResult<usize> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| KernelError::External(format!("failed to read session snapshot: {e}")))?;
        let document: PersistedDocument = serde_json::from_slice(&bytes)
            .map_err(|e| KernelError::External(format!("failed to parse session snapshot: {e}")))?;

        let mut sessions = self.sessions.write().await;
        let mut restored = 0;
        for session in document.sessions {
            if session.status != SessionStatus::Terminated {
                sessions.insert(session.id.clone(), session);
                restored += 1;
            }
        }
        Ok(restored)
    }
}
