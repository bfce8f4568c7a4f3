//! C3: a fixed-capacity pool of agents.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;

use crate::error::{KernelError, KernelResult};
use crate::events::{Event, EventBus};

use super::model::{Agent, AgentConfig, AgentId, AgentStatus, HealthLevel};

/// Per-id outcome of a `spawn_batch` call.
#[derive(Debug, Clone)]
pub enum SpawnBatchOutcome {
    Spawned(AgentId),
    Failed(AgentId, KernelError),
}

/// Fixed-capacity agent pool. `Arc<RwLock<_>>`-guarded so it can be shared
/// across the orchestrator, the swarm coordinator and the health monitor.
pub struct AgentPool {
    agents: RwLock<HashMap<AgentId, Agent>>,
    max_agents: usize,
    events: Arc<EventBus>,
}

impl AgentPool {
    #[must_use]
    pub fn new(max_agents: usize, events: Arc<EventBus>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            max_agents,
            events,
        }
    }

    /// Spawn a single agent. Rejects when the pool is at capacity or the id
    /// is already in use.
    pub async fn spawn(&self, config: AgentConfig) -> KernelResult<AgentId> {
        let mut agents = self.agents.write().await;
        if agents.contains_key(&config.id) {
            return Err(KernelError::Conflict(format!("agent {} already exists", config.id)));
        }
        if agents.len() >= self.max_agents {
            return Err(KernelError::Capacity("maximum concurrent agents reached".into()));
        }
        let id = config.id.clone();
        let mut agent = Agent::spawning(config);
        agent.transition_to(AgentStatus::Active).expect("spawning always permits active");
        agents.insert(id.clone(), agent);
        drop(agents);

        self.events
            .emit(Event::new("agent:spawned", id.to_string(), json!({ "agentId": id.0 })))
            .await;
        Ok(id)
    }

    /// Spawn every config in `configs`, all-or-nothing on the capacity
    /// check: if the whole batch would exceed capacity, none are spawned.
    /// Individual id conflicts still fail per-entry.
    pub async fn spawn_batch(&self, configs: Vec<AgentConfig>) -> KernelResult<Vec<SpawnBatchOutcome>> {
        {
            let agents = self.agents.read().await;
            if agents.len() + configs.len() > self.max_agents {
                return Err(KernelError::Capacity("maximum concurrent agents reached".into()));
            }
        }
        let mut outcomes = Vec::with_capacity(configs.len());
        for config in configs {
            let id = config.id.clone();
            match self.spawn(config).await {
                Ok(id) => outcomes.push(SpawnBatchOutcome::Spawned(id)),
                Err(err) => outcomes.push(SpawnBatchOutcome::Failed(id, err)),
            }
        }
        Ok(outcomes)
    }

    /// Terminate an agent and remove it from the pool.
    pub async fn terminate(&self, id: &AgentId, reason: Option<String>) -> KernelResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| KernelError::NotFound { kind: "agent", id: id.to_string() })?;
        agent
            .transition_to(AgentStatus::Terminated)
            .map_err(KernelError::Conflict)?;
        agents.remove(id);
        drop(agents);

        self.events
            .emit(Event::new(
                "agent:terminated",
                id.to_string(),
                json!({ "agentId": id.0, "reason": reason }),
            ))
            .await;
        Ok(())
    }

    /// Terminate and re-spawn with the same configuration.
    pub async fn restart(&self, id: &AgentId) -> KernelResult<AgentId> {
        let config = {
            let agents = self.agents.read().await;
            agents
                .get(id)
                .ok_or_else(|| KernelError::NotFound { kind: "agent", id: id.to_string() })?
                .config
                .clone()
        };
        self.terminate(id, Some("restart".to_string())).await?;
        self.spawn(config).await
    }

    pub async fn get(&self, id: &AgentId) -> Option<Agent> {
        self.agents.read().await.get(id).cloned()
    }

    /// A restartable snapshot of every agent currently in the pool. Does not
    /// hold the lock while the caller iterates.
    pub async fn all(&self) -> Vec<Agent> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// Recompute and record an agent's health classification, emitting
    /// `agent:health-changed` when it is not healthy.
    pub async fn check_health(&self, id: &AgentId) -> KernelResult<HealthLevel> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| KernelError::NotFound { kind: "agent", id: id.to_string() })?;
        let level = agent.check_health();
        agent.health = Some(level);
        drop(agents);

        if level != HealthLevel::Healthy {
            self.events
                .emit(Event::new(
                    "agent:health-changed",
                    id.to_string(),
                    json!({ "agentId": id.0, "health": format!("{level:?}") }),
                ))
                .await;
        }
        Ok(level)
    }

    /// Claim one unit of capacity on an active, non-terminated agent.
    /// Returns an error if the agent is missing, terminated, or already at
    /// its configured concurrency limit.
    pub async fn reserve_slot(&self, id: &AgentId) -> KernelResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| KernelError::NotFound { kind: "agent", id: id.to_string() })?;
        if agent.status == AgentStatus::Terminated {
            return Err(KernelError::Conflict(format!("agent {id} is terminated")));
        }
        if !agent.has_spare_capacity() {
            return Err(KernelError::Capacity(format!("agent {id} at max concurrent tasks")));
        }
        agent.current_task_count += 1;
        agent.last_activity = chrono::Utc::now();
        Ok(())
    }

    /// Release one unit of capacity, recording task outcome counters.
    pub async fn release_slot(&self, id: &AgentId, succeeded: bool) -> KernelResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| KernelError::NotFound { kind: "agent", id: id.to_string() })?;
        agent.current_task_count = agent.current_task_count.saturating_sub(1);
        if succeeded {
            agent.tasks_completed += 1;
        } else {
            agent.tasks_failed += 1;
            agent.error_count += 1;
        }
        agent.last_activity = chrono::Utc::now();
        Ok(())
    }

    /// Agents matching a task's required task type and capabilities, with
    /// spare capacity, ordered by highest configured priority first.
    pub async fn capable_agents(&self, task_type: &str, required_capabilities: &[String]) -> Vec<Agent> {
        let mut matches: Vec<Agent> = self
            .agents
            .read()
            .await
            .values()
            .filter(|a| {
                a.status != AgentStatus::Terminated
                    && a.has_spare_capacity()
                    && a.config.supports(task_type, required_capabilities)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.config.priority.cmp(&a.config.priority));
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> Arc<EventBus> {
        Arc::new(EventBus::new())
    }

    #[tokio::test]
    async fn spawn_rejects_exactly_when_pool_is_full() {
        let pool = AgentPool::new(2, bus());
        pool.spawn(AgentConfig::new("a1", "worker")).await.unwrap();
        pool.spawn(AgentConfig::new("a2", "worker")).await.unwrap();
        let err = pool.spawn(AgentConfig::new("a3", "worker")).await.unwrap_err();
        assert!(matches!(err, KernelError::Capacity(_)));
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn spawn_rejects_duplicate_id() {
        let pool = AgentPool::new(5, bus());
        pool.spawn(AgentConfig::new("a1", "worker")).await.unwrap();
        let err = pool.spawn(AgentConfig::new("a1", "worker")).await.unwrap_err();
        assert!(matches!(err, KernelError::Conflict(_)));
    }

    #[tokio::test]
    async fn spawn_batch_is_all_or_nothing_on_capacity() {
        let pool = AgentPool::new(1, bus());
        let err = pool
            .spawn_batch(vec![AgentConfig::new("a1", "worker"), AgentConfig::new("a2", "worker")])
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::Capacity(_)));
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn terminate_removes_from_pool() {
        let pool = AgentPool::new(5, bus());
        pool.spawn(AgentConfig::new("a1", "worker")).await.unwrap();
        pool.terminate(&AgentId::from("a1"), None).await.unwrap();
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn reserve_slot_respects_max_concurrent_tasks() {
        let pool = AgentPool::new(5, bus());
        pool.spawn(AgentConfig::new("a1", "worker").with_max_concurrent_tasks(1))
            .await
            .unwrap();
        let id = AgentId::from("a1");
        pool.reserve_slot(&id).await.unwrap();
        let err = pool.reserve_slot(&id).await.unwrap_err();
        assert!(matches!(err, KernelError::Capacity(_)));
    }

    #[tokio::test]
    async fn capable_agents_filters_by_type_and_capability_and_orders_by_priority() {
        let pool = AgentPool::new(5, bus());
        pool.spawn(
            AgentConfig::new("low", "worker")
                .with_supported_task_type("build")
                .with_capability("rust")
                .with_priority(10),
        )
        .await
        .unwrap();
        pool.spawn(
            AgentConfig::new("high", "worker")
                .with_supported_task_type("build")
                .with_capability("rust")
                .with_priority(90),
        )
        .await
        .unwrap();
        pool.spawn(AgentConfig::new("wrong-type", "worker").with_supported_task_type("test"))
            .await
            .unwrap();

        let matches = pool.capable_agents("build", &["rust".to_string()]).await;
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id().0, "high");
    }
}
