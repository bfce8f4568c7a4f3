//! The task domain model and its state machine.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::AgentId;

/// A task identity. Generated inside the kernel; never supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    #[must_use]
    pub fn generate() -> Self {
        Self(crate::ids::generate("task_"))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The only statuses a task may hold, per the normative state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
    Blocked,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Blocked => "blocked",
        }
    }

    /// The statuses reachable directly from this one.
    #[must_use]
    pub fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Queued, Self::Blocked, Self::Cancelled],
            Self::Queued => &[Self::Assigned, Self::Blocked, Self::Cancelled],
            Self::Assigned => &[Self::Running, Self::Cancelled],
            Self::Running => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Failed => &[Self::Queued],
            Self::Blocked => &[Self::Queued],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.valid_transitions().contains(&target)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Assigned | Self::Running)
    }
}

/// Bookkeeping carried alongside a task's core fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub retry_count: u32,
    pub max_retries: u32,
    pub required_capabilities: Vec<String>,
    pub domain: Option<String>,
    pub phase: Option<String>,
    pub parent_id: Option<TaskId>,
    pub child_ids: Vec<TaskId>,
    pub tags: Vec<String>,
}

/// A unit of work with a priority, a state-machine status, and a
/// possibly-empty set of predecessor task ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: String,
    pub description: String,
    pub priority: i32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(with = "crate::serde_helpers::duration_millis_opt")]
    pub timeout: Option<Duration>,
    pub assigned_agent: Option<AgentId>,
    pub dependencies: HashSet<TaskId>,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub metadata: TaskMetadata,
    pub version: u64,
}

impl Task {
    /// Construct a new pending task with a freshly generated id.
    #[must_use]
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            task_type: task_type.into(),
            description: description.into(),
            priority: 50,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            timeout: None,
            assigned_agent: None,
            dependencies: HashSet::new(),
            input: Value::Null,
            output: None,
            error: None,
            metadata: TaskMetadata::default(),
            version: 0,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_dependency(mut self, dep: TaskId) -> Self {
        self.dependencies.insert(dep);
        self
    }

    #[must_use]
    pub fn with_required_capability(mut self, capability: impl Into<String>) -> Self {
        self.metadata.required_capabilities.push(capability.into());
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.metadata.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.metadata.parent_id = Some(parent);
        self
    }

    #[must_use]
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        self.status.can_transition_to(target)
    }

    /// Drive the state machine. Fails with `Err(())` carrying nothing beyond
    /// the caller-visible fact that the transition is illegal; callers wrap
    /// this in a `KernelError::Conflict` at the orchestrator boundary.
    pub fn transition_to(&mut self, target: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(target) {
            return Err(format!(
                "invalid transition from {} to {}",
                self.status.as_str(),
                target.as_str()
            ));
        }
        let now = Utc::now();
        match target {
            TaskStatus::Running => self.started_at.get_or_insert(now),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                self.completed_at = Some(now);
                self.started_at.get_or_insert(now)
            }
            _ => &mut self.created_at,
        };
        self.status = target;
        self.version += 1;
        Ok(())
    }

    #[must_use]
    pub fn wait_time(&self) -> Option<chrono::Duration> {
        self.started_at.map(|started| started - self.created_at)
    }

    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }

    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.metadata.retry_count < self.metadata.max_retries
    }
}
