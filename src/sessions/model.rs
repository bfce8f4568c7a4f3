//! The session domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;

/// A cryptographically random session identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(crate::ids::generate("sess_"))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Idle,
    Terminated,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Terminated => "terminated",
        }
    }
}

/// A binding between one agent, one terminal, and one memory bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub agent_id: AgentId,
    pub memory_bank_id: String,
    pub terminal_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(agent_id: AgentId, terminal_id: impl Into<String>, memory_bank_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            agent_id,
            memory_bank_id: memory_bank_id.into(),
            terminal_id: terminal_id.into(),
            status: SessionStatus::Active,
            started_at: now,
            ended_at: None,
            last_activity: now,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self.status, SessionStatus::Terminated)
    }

    pub fn terminate(&mut self) {
        self.status = SessionStatus::Terminated;
        self.ended_at = Some(Utc::now());
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
        if self.status == SessionStatus::Idle {
            self.status = SessionStatus::Active;
        }
    }
}
