//! The agent domain model: a bounded work-handler distinguished only by its
//! capability tags and supported task types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stable, opaque agent identity. Supplied by the spawn config, not
/// generated by the kernel — callers name their agents (`worker-1`,
/// `reviewer-primary`) the way they name processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Spawning,
    Active,
    Idle,
    Busy,
    Blocked,
    Terminated,
    Error,
}

impl AgentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spawning => "spawning",
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Blocked => "blocked",
            Self::Terminated => "terminated",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Spawning => &[Self::Active, Self::Error],
            Self::Active => &[Self::Idle, Self::Busy, Self::Blocked, Self::Error, Self::Terminated],
            Self::Idle => &[Self::Active, Self::Busy, Self::Blocked, Self::Error, Self::Terminated],
            Self::Busy => &[Self::Active, Self::Idle, Self::Blocked, Self::Error, Self::Terminated],
            Self::Blocked => &[Self::Active, Self::Idle, Self::Busy, Self::Error, Self::Terminated],
            Self::Error => &[Self::Active, Self::Terminated],
            Self::Terminated => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.valid_transitions().contains(&target)
    }
}

/// A coarse health classification derived from an agent's error rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthLevel {
    /// Map an error rate in `[0, 1]` to a health level per the pool's
    /// `checkHealth` thresholds.
    #[must_use]
    pub fn from_error_rate(error_rate: f64) -> Self {
        if error_rate < 0.2 {
            Self::Healthy
        } else if error_rate < 0.5 {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }
}

/// Static configuration supplied when spawning an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: AgentId,
    pub role: String,
    pub capabilities: Vec<String>,
    pub supported_task_types: Vec<String>,
    pub max_concurrent_tasks: u32,
    pub priority: u8,
    #[serde(with = "crate::serde_helpers::duration_millis_opt")]
    pub timeout: Option<Duration>,
    pub max_retries: u32,
}

impl AgentConfig {
    #[must_use]
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: AgentId(id.into()),
            role: role.into(),
            capabilities: Vec::new(),
            supported_task_types: Vec::new(),
            max_concurrent_tasks: 1,
            priority: 50,
            timeout: None,
            max_retries: 0,
        }
    }

    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    #[must_use]
    pub fn with_supported_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.supported_task_types.push(task_type.into());
        self
    }

    #[must_use]
    pub fn with_max_concurrent_tasks(mut self, max: u32) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(100);
        self
    }

    #[must_use]
    pub fn supports(&self, task_type: &str, required_capabilities: &[String]) -> bool {
        self.supported_task_types.iter().any(|t| t == task_type)
            && required_capabilities.iter().all(|cap| self.capabilities.contains(cap))
    }
}

/// A running agent record, owned exclusively by the pool for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub config: AgentConfig,
    pub status: AgentStatus,
    pub current_task_count: u32,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub error_count: u64,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub health: Option<HealthLevel>,
}

impl Agent {
    #[must_use]
    pub fn spawning(config: AgentConfig) -> Self {
        let now = Utc::now();
        Self {
            config,
            status: AgentStatus::Spawning,
            current_task_count: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            error_count: 0,
            last_activity: now,
            created_at: now,
            health: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &AgentId {
        &self.config.id
    }

    #[must_use]
    pub fn has_spare_capacity(&self) -> bool {
        self.current_task_count < self.config.max_concurrent_tasks
    }

    pub fn transition_to(&mut self, target: AgentStatus) -> Result<(), String> {
        if !self.status.can_transition_to(target) {
            return Err(format!(
                "invalid agent transition from {} to {}",
                self.status.as_str(),
                target.as_str()
            ));
        }
        self.status = target;
        self.last_activity = Utc::now();
        Ok(())
    }

    /// Error rate used to classify health: `errorCount / max(1, completed + failed)`.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        let denominator = (self.tasks_completed + self.tasks_failed).max(1);
        self.error_count as f64 / denominator as f64
    }

    #[must_use]
    pub fn check_health(&self) -> HealthLevel {
        HealthLevel::from_error_rate(self.error_rate())
    }
}
