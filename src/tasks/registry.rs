//! C2 (registry half): the task id → record map plus aggregate counters.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::error::{KernelError, KernelResult};
use crate::events::{Event, EventBus};

use super::model::{Task, TaskId, TaskStatus};

/// Read-only snapshot of registry-wide counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskManagerMetrics {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub cancelled_tasks: u64,
    pub total_duration_ms: i64,
    pub total_wait_time_ms: i64,
}

impl TaskManagerMetrics {
    #[must_use]
    pub fn average_duration_ms(&self) -> f64 {
        if self.completed_tasks == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.completed_tasks as f64
        }
    }

    #[must_use]
    pub fn average_wait_time_ms(&self) -> f64 {
        if self.completed_tasks == 0 {
            0.0
        } else {
            self.total_wait_time_ms as f64 / self.completed_tasks as f64
        }
    }
}

pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Task>>,
    metrics: RwLock<TaskManagerMetrics>,
    events: Arc<EventBus>,
}

impl TaskRegistry {
    #[must_use]
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            metrics: RwLock::new(TaskManagerMetrics::default()),
            events,
        }
    }

    /// Insert a newly constructed task (already `pending`), increment
    /// `totalTasks`, and emit `task:created`.
    pub async fn create(&self, task: Task) -> KernelResult<TaskId> {
        let id = task.id.clone();
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&id) {
            return Err(KernelError::Conflict(format!("task {id} already exists")));
        }
        tasks.insert(id.clone(), task);
        drop(tasks);

        self.metrics.write().await.total_tasks += 1;
        self.events
            .emit(Event::new("task:created", id.to_string(), json!({ "taskId": id.0 })))
            .await;
        Ok(id)
    }

    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    pub async fn exists(&self, id: &TaskId) -> bool {
        self.tasks.read().await.contains_key(id)
    }

    /// Apply `mutator` to the task under the registry's write lock and, if
    /// it leaves the task in a terminal state for the first time, roll the
    /// result into the aggregate metrics.
    pub async fn update<F>(&self, id: &TaskId, mutator: F) -> KernelResult<Task>
    where
        F: FnOnce(&mut Task) -> KernelResult<()>,
    {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| KernelError::NotFound { kind: "task", id: id.to_string() })?;
        let was_terminal = task.status.is_terminal();
        mutator(task)?;
        let became_terminal = task.status.is_terminal() && !was_terminal;
        let snapshot = task.clone();
        drop(tasks);

        if became_terminal {
            let mut metrics = self.metrics.write().await;
            match snapshot.status {
                TaskStatus::Completed => {
                    metrics.completed_tasks += 1;
                    if let Some(d) = snapshot.duration() {
                        metrics.total_duration_ms += d.num_milliseconds();
                    }
                    if let Some(w) = snapshot.wait_time() {
                        metrics.total_wait_time_ms += w.num_milliseconds();
                    }
                }
                // A task that can still retry re-enters `queued` right after
                // this call; only the terminal failure counts (§8 scenario 5).
                TaskStatus::Failed => {
                    if !snapshot.can_retry() {
                        metrics.failed_tasks += 1;
                    }
                }
                TaskStatus::Cancelled => metrics.cancelled_tasks += 1,
                _ => {}
            }
        }
        Ok(snapshot)
    }

    /// A restartable snapshot of every task.
    pub async fn all(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    pub async fn all_non_terminal(&self) -> Vec<Task> {
        self.tasks.read().await.values().filter(|t| !t.status.is_terminal()).cloned().collect()
    }

    pub async fn metrics(&self) -> TaskManagerMetrics {
        self.metrics.read().await.clone()
    }

    /// Purge terminal tasks completed before `older_than`.
    pub async fn cleanup(&self, older_than: chrono::DateTime<Utc>) -> usize {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| !(t.status.is_terminal() && t.completed_at.is_some_and(|c| c < older_than)));
        before - tasks.len()
    }
}
