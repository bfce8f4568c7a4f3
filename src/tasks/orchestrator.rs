//! C6: admission, dispatch, dependency resolution, assignment, completion,
//! and cancellation — the task orchestrator.
//!
//! Cross-component atomicity (assignment touches both the queue and the
//! pool) is achieved by acquiring locks in the fixed order documented on
//! [`TaskOrchestrator::assign_task`]: queue, then pool.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::agents::{AgentId, AgentPool};
use crate::error::{KernelError, KernelResult};
use crate::events::{Event, EventBus};

use super::model::{Task, TaskId, TaskStatus};
use super::queue::TaskQueue;
use super::registry::{TaskManagerMetrics, TaskRegistry};

pub struct TaskOrchestrator {
    registry: Arc<TaskRegistry>,
    queue: RwLock<TaskQueue>,
    pool: Arc<AgentPool>,
    events: Arc<EventBus>,
}

impl TaskOrchestrator {
    #[must_use]
    pub fn new(registry: Arc<TaskRegistry>, pool: Arc<AgentPool>, events: Arc<EventBus>) -> Self {
        Self { registry, queue: RwLock::new(TaskQueue::new()), pool, events }
    }

    /// Create a task in `pending` status. Does not queue it — see
    /// `queue_task`.
    pub async fn create_task(&self, task: Task) -> KernelResult<TaskId> {
        self.registry.create(task).await
    }

    pub async fn create_batch_tasks(&self, tasks: Vec<Task>) -> KernelResult<Vec<TaskId>> {
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            ids.push(self.create_task(task).await?);
        }
        Ok(ids)
    }

    /// Compute whether every dependency of `task` has completed.
    async fn blocking_set(&self, task: &Task) -> HashSet<TaskId> {
        let mut blocking = HashSet::new();
        for dep_id in &task.dependencies {
            match self.registry.get(dep_id).await {
                Some(dep) if dep.status != TaskStatus::Completed => {
                    blocking.insert(dep_id.clone());
                }
                None => {
                    blocking.insert(dep_id.clone());
                }
                _ => {}
            }
        }
        blocking
    }

    /// Move a `pending` task to `queued` or `blocked` depending on whether
    /// its dependencies are already satisfied.
    pub async fn queue_task(&self, id: &TaskId) -> KernelResult<()> {
        let task = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| KernelError::NotFound { kind: "task", id: id.to_string() })?;
        let blocking = self.blocking_set(&task).await;

        let target = if blocking.is_empty() { TaskStatus::Queued } else { TaskStatus::Blocked };
        let updated = self
            .registry
            .update(id, |t| t.transition_to(target).map_err(KernelError::Conflict))
            .await?;

        if target == TaskStatus::Queued {
            self.queue.write().await.enqueue(id.clone(), updated.priority, updated.created_at);
            self.events.emit(Event::new("task:queued", id.to_string(), json!({ "taskId": id.0 }))).await;
        } else {
            let blocking_id = blocking.iter().next().cloned();
            self.events
                .emit(Event::new(
                    "task:blocked",
                    id.to_string(),
                    json!({ "taskId": id.0, "blockingId": blocking_id.map(|b| b.0) }),
                ))
                .await;
        }
        Ok(())
    }

    /// Every `addDependency` checks the target exists and that inserting
    /// the edge would not create a cycle: a depth-first walk starting at
    /// the new predecessor that would reach `task_id` means `task_id`
    /// already transitively depends on the predecessor.
    pub async fn add_dependency(&self, task_id: &TaskId, predecessor_id: &TaskId) -> KernelResult<()> {
        if !self.registry.exists(predecessor_id).await {
            return Err(KernelError::NotFound { kind: "task", id: predecessor_id.to_string() });
        }
        if self.would_create_cycle(task_id, predecessor_id).await {
            return Err(KernelError::Validation(format!(
                "adding dependency {predecessor_id} to {task_id} would create a cycle"
            )));
        }
        self.registry
            .update(task_id, |t| {
                t.dependencies.insert(predecessor_id.clone());
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn remove_dependency(&self, task_id: &TaskId, predecessor_id: &TaskId) -> KernelResult<()> {
        self.registry
            .update(task_id, |t| {
                t.dependencies.remove(predecessor_id);
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn would_create_cycle(&self, task_id: &TaskId, predecessor_id: &TaskId) -> bool {
        if task_id == predecessor_id {
            return true;
        }
        let mut visited = HashSet::new();
        let mut stack = vec![predecessor_id.clone()];
        while let Some(current) = stack.pop() {
            if &current == task_id {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(task) = self.registry.get(&current).await {
                stack.extend(task.dependencies.iter().cloned());
            }
        }
        false
    }

    /// Walk the reverse edges of a just-completed task; any dependent whose
    /// blocking set becomes empty moves from `blocked` to `queued`.
    async fn unblock_dependents(&self, completed_id: &TaskId) -> KernelResult<()> {
        let dependents: Vec<Task> = self
            .registry
            .all()
            .await
            .into_iter()
            .filter(|t| t.status == TaskStatus::Blocked && t.dependencies.contains(completed_id))
            .collect();

        for dependent in dependents {
            let blocking = self.blocking_set(&dependent).await;
            if blocking.is_empty() {
                let updated = self
                    .registry
                    .update(&dependent.id, |t| t.transition_to(TaskStatus::Queued).map_err(KernelError::Conflict))
                    .await?;
                self.queue.write().await.enqueue(dependent.id.clone(), updated.priority, updated.created_at);
                self.events
                    .emit(Event::new("task:queued", dependent.id.to_string(), json!({ "taskId": dependent.id.0 })))
                    .await;
            }
        }
        Ok(())
    }

    /// Return the highest-priority queued, non-blocked task an agent can
    /// run, without removing it from the queue. When `agent_id` is `None`,
    /// returns the head of the queue regardless of capability.
    pub async fn get_next_task(&self, agent_id: Option<&AgentId>) -> Option<TaskId> {
        let queue = self.queue.read().await;
        match agent_id {
            None => queue.peek().cloned(),
            Some(agent_id) => {
                let agent = self.pool.get(agent_id).await?;
                for id in queue.snapshot() {
                    if let Some(task) = self.registry.get(&id).await {
                        if agent.config.supports(&task.task_type, &task.metadata.required_capabilities) {
                            return Some(id);
                        }
                    }
                }
                None
            }
        }
    }

    /// Dequeue + set `assignedAgent` + `status=assigned` +
    /// `agent.currentTaskCount++` + emit `task:assigned`, as one atomic
    /// step. Locks are acquired queue-then-pool to match the crate-wide
    /// ordering. If the agent cannot take the task after dequeue (e.g. it
    /// was terminated concurrently), the task is re-enqueued at the same
    /// priority.
    pub async fn assign_task(&self, agent_id: &AgentId) -> KernelResult<Option<TaskId>> {
        let Some(task_id) = self.get_next_task(Some(agent_id)).await else {
            return Ok(None);
        };

        let mut queue = self.queue.write().await;
        if !queue.remove_by_id(&task_id) {
            return Ok(None);
        }

        let reservation = self.pool.reserve_slot(agent_id).await;
        if let Err(err) = reservation {
            let task = self.registry.get(&task_id).await;
            if let Some(task) = task {
                queue.enqueue(task_id.clone(), task.priority, task.created_at);
            }
            drop(queue);
            return Err(err);
        }
        drop(queue);

        let updated = self
            .registry
            .update(&task_id, |t| {
                t.assigned_agent = Some(agent_id.clone());
                t.transition_to(TaskStatus::Assigned).map_err(KernelError::Conflict)
            })
            .await;

        match updated {
            Ok(_) => {
                self.events
                    .emit(Event::new(
                        "task:assigned",
                        task_id.to_string(),
                        json!({ "taskId": task_id.0, "agentId": agent_id.0 }),
                    ))
                    .await;
                Ok(Some(task_id))
            }
            Err(err) => {
                self.pool.release_slot(agent_id, false).await.ok();
                let mut queue = self.queue.write().await;
                if let Some(task) = self.registry.get(&task_id).await {
                    queue.enqueue(task_id.clone(), task.priority, task.created_at);
                }
                Err(err)
            }
        }
    }

    pub async fn start_task(&self, id: &TaskId) -> KernelResult<()> {
        self.registry
            .update(id, |t| t.transition_to(TaskStatus::Running).map_err(KernelError::Conflict))
            .await?;
        self.events.emit(Event::new("task:started", id.to_string(), json!({ "taskId": id.0 }))).await;
        Ok(())
    }

    pub async fn complete_task(&self, id: &TaskId, result: Value) -> KernelResult<()> {
        let task = self
            .registry
            .update(id, |t| {
                t.output = Some(result.clone());
                t.transition_to(TaskStatus::Completed).map_err(KernelError::Conflict)
            })
            .await?;

        if let Some(agent_id) = &task.assigned_agent {
            self.pool.release_slot(agent_id, true).await.ok();
        }
        self.events.emit(Event::new("task:completed", id.to_string(), json!({ "taskId": id.0 }))).await;
        self.unblock_dependents(id).await?;
        Ok(())
    }

    /// Record the error; if `retryCount < maxRetries` the task re-enters
    /// `queued` with `retryCount + 1`, else it is terminal `failed`.
    pub async fn fail_task(&self, id: &TaskId, error: impl Into<String>) -> KernelResult<()> {
        let error = error.into();
        let task = self
            .registry
            .update(id, |t| {
                t.error = Some(error.clone());
                t.transition_to(TaskStatus::Failed).map_err(KernelError::Conflict)
            })
            .await?;

        if let Some(agent_id) = &task.assigned_agent {
            self.pool.release_slot(agent_id, false).await.ok();
        }

        let retryable = task.can_retry();
        self.events
            .emit(Event::new(
                "task:failed",
                id.to_string(),
                json!({ "taskId": id.0, "error": task.error, "retryable": retryable }),
            ))
            .await;

        if retryable {
            self.retry_task(id).await?;
        }
        Ok(())
    }

    pub async fn retry_task(&self, id: &TaskId) -> KernelResult<()> {
        let updated = self
            .registry
            .update(id, |t| {
                t.metadata.retry_count += 1;
                t.transition_to(TaskStatus::Queued).map_err(KernelError::Conflict)
            })
            .await?;
        self.queue.write().await.enqueue(id.clone(), updated.priority, updated.created_at);
        self.events.emit(Event::new("task:queued", id.to_string(), json!({ "taskId": id.0 }))).await;
        Ok(())
    }

    /// Valid from any pre-terminal state. If the task was assigned or
    /// running, its agent's `currentTaskCount` is decremented.
    pub async fn cancel_task(&self, id: &TaskId) -> KernelResult<()> {
        let task = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| KernelError::NotFound { kind: "task", id: id.to_string() })?;
        if task.status.is_terminal() {
            return Err(KernelError::Conflict(format!("task {id} is already terminal")));
        }

        let was_active = task.status.is_active();
        self.queue.write().await.remove_by_id(id);
        self.registry
            .update(id, |t| t.transition_to(TaskStatus::Cancelled).map_err(KernelError::Conflict))
            .await?;

        if was_active {
            if let Some(agent_id) = &task.assigned_agent {
                self.pool.release_slot(agent_id, false).await.ok();
            }
        }
        self.events.emit(Event::new("task:cancelled", id.to_string(), json!({ "taskId": id.0 }))).await;
        Ok(())
    }

    pub async fn update_priority(&self, id: &TaskId, priority: i32) -> KernelResult<()> {
        self.registry.update(id, |t| { t.priority = priority; Ok(()) }).await?;
        self.queue.write().await.update_priority(id, priority);
        Ok(())
    }

    pub async fn metrics(&self) -> TaskManagerMetrics {
        self.registry.metrics().await
    }

    pub async fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.registry.get(id).await
    }

    pub async fn all_tasks(&self) -> Vec<Task> {
        self.registry.all().await
    }

    /// Per §5: if every non-terminal task is blocked and the union of their
    /// blockers is itself a subset of non-terminal tasks, nothing can ever
    /// make progress. Reported, never auto-recovered.
    pub async fn detect_deadlock(&self) -> Option<Vec<TaskId>> {
        let non_terminal = self.registry.all_non_terminal().await;
        if non_terminal.is_empty() {
            return None;
        }
        if !non_terminal.iter().all(|t| t.status == TaskStatus::Blocked) {
            return None;
        }
        let non_terminal_ids: HashSet<TaskId> = non_terminal.iter().map(|t| t.id.clone()).collect();
        let mut blockers = HashSet::new();
        for task in &non_terminal {
            blockers.extend(task.dependencies.iter().cloned());
        }
        if blockers.is_subset(&non_terminal_ids) && !blockers.is_empty() {
            Some(non_terminal_ids.into_iter().collect())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentConfig;

    fn orchestrator() -> (Arc<TaskOrchestrator>, Arc<AgentPool>) {
        let events = Arc::new(EventBus::new());
        let registry = Arc::new(TaskRegistry::new(events.clone()));
        let pool = Arc::new(AgentPool::new(10, events.clone()));
        (Arc::new(TaskOrchestrator::new(registry, pool.clone(), events)), pool)
    }

    #[tokio::test]
    async fn linear_pipeline_scenario() {
        let (orch, pool) = orchestrator();
        pool.spawn(
            AgentConfig::new("a1", "worker")
                .with_supported_task_type("build")
                .with_max_concurrent_tasks(2),
        )
        .await
        .unwrap();

        let t1 = orch.create_task(Task::new("build", "t1")).await.unwrap();
        let t2 = orch.create_task(Task::new("build", "t2")).await.unwrap();
        orch.add_dependency(&t2, &t1).await.unwrap();

        orch.queue_task(&t1).await.unwrap();
        orch.queue_task(&t2).await.unwrap();

        let task2 = orch.get_task(&t2).await.unwrap();
        assert_eq!(task2.status, TaskStatus::Blocked);

        let agent_id = AgentId::from("a1");
        let assigned = orch.assign_task(&agent_id).await.unwrap().unwrap();
        assert_eq!(assigned, t1);
        orch.start_task(&t1).await.unwrap();
        orch.complete_task(&t1, json!({})).await.unwrap();

        let task2 = orch.get_task(&t2).await.unwrap();
        assert_eq!(task2.status, TaskStatus::Queued);

        let assigned2 = orch.assign_task(&agent_id).await.unwrap().unwrap();
        assert_eq!(assigned2, t2);
        orch.start_task(&t2).await.unwrap();
        orch.complete_task(&t2, json!({})).await.unwrap();

        let metrics = orch.metrics().await;
        assert_eq!(metrics.completed_tasks, 2);
    }

    #[tokio::test]
    async fn priority_tie_break_scenario() {
        let (orch, pool) = orchestrator();
        pool.spawn(AgentConfig::new("a1", "worker").with_supported_task_type("build"))
            .await
            .unwrap();

        let ta = orch.create_task(Task::new("build", "ta").with_priority(80)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let tb = orch.create_task(Task::new("build", "tb").with_priority(80)).await.unwrap();

        orch.queue_task(&ta).await.unwrap();
        orch.queue_task(&tb).await.unwrap();

        assert_eq!(orch.get_next_task(None).await, Some(ta.clone()));

        orch.update_priority(&tb, 90).await.unwrap();
        assert_eq!(orch.get_next_task(None).await, Some(tb));
    }

    #[tokio::test]
    async fn cycle_detection_scenario() {
        let (orch, _pool) = orchestrator();
        let t1 = orch.create_task(Task::new("build", "t1")).await.unwrap();
        let t2 = orch.create_task(Task::new("build", "t2")).await.unwrap();
        let t3 = orch.create_task(Task::new("build", "t3")).await.unwrap();

        orch.add_dependency(&t2, &t1).await.unwrap();
        orch.add_dependency(&t3, &t2).await.unwrap();

        let err = orch.add_dependency(&t1, &t3).await.unwrap_err();
        assert!(matches!(err, KernelError::Validation(_)));

        let t1_task = orch.get_task(&t1).await.unwrap();
        assert!(!t1_task.dependencies.contains(&t3));
    }

    #[tokio::test]
    async fn retry_exhaustion_scenario() {
        let (orch, pool) = orchestrator();
        pool.spawn(AgentConfig::new("a1", "worker").with_supported_task_type("build"))
            .await
            .unwrap();
        let agent_id = AgentId::from("a1");

        let id = orch.create_task(Task::new("build", "t").with_max_retries(2)).await.unwrap();
        orch.queue_task(&id).await.unwrap();

        for _ in 0..3 {
            orch.assign_task(&agent_id).await.unwrap();
            orch.start_task(&id).await.unwrap();
            orch.fail_task(&id, "boom").await.unwrap();
        }

        let task = orch.get_task(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(orch.metrics().await.failed_tasks, 1);
    }

    #[tokio::test]
    async fn assignment_precondition_failure_returns_task_to_queue_unchanged() {
        let (orch, pool) = orchestrator();
        pool.spawn(AgentConfig::new("a1", "worker").with_supported_task_type("build").with_max_concurrent_tasks(0))
            .await
            .unwrap();
        let id = orch.create_task(Task::new("build", "t").with_priority(77)).await.unwrap();
        orch.queue_task(&id).await.unwrap();

        let agent_id = AgentId::from("a1");
        let err = orch.assign_task(&agent_id).await.unwrap_err();
        assert!(matches!(err, KernelError::Capacity(_)));

        let task = orch.get_task(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.priority, 77);
    }
}
