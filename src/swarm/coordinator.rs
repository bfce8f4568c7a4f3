//! C7: the single coordination engine. Owns topology, message routing and
//! consensus, and drives the swarm-wide lifecycle state machine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::agents::AgentPool;
use crate::error::{KernelError, KernelResult};
use crate::events::{Event, EventBus, RESERVED_DEADLOCK};
use crate::health::{HealthMonitor, HealthStatus};
use crate::plugins::PluginRegistry;
use crate::sessions::SessionManager;
use crate::tasks::TaskOrchestrator;

use super::consensus::{ConsensusCoordinator, ConsensusOutcome, ConsensusStrategy};
use super::message_bus::MessageBus;
use super::topology::{ConsecutiveUnhealthyPolicy, Topology, TopologyAdaptationPolicy, TopologyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmState {
    Initializing,
    Running,
    Degraded,
    Stopped,
}

impl SwarmState {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Initializing, Self::Running)
                | (Self::Running, Self::Degraded)
                | (Self::Degraded, Self::Running)
                | (Self::Running, Self::Stopped)
                | (Self::Degraded, Self::Stopped)
        )
    }
}

/// Everything the coordinator needs at construction time. Grouped into one
/// struct because the constructor otherwise takes an unreadable number of
/// positional `Arc`s.
pub struct SwarmDependencies {
    pub pool: Arc<AgentPool>,
    pub sessions: Arc<SessionManager>,
    pub health: Arc<HealthMonitor>,
    pub plugins: Arc<RwLock<PluginRegistry>>,
    pub events: Arc<EventBus>,
    pub consensus_strategy: Arc<dyn ConsensusStrategy>,
    pub tasks: Arc<TaskOrchestrator>,
}

pub struct SwarmCoordinator {
    state: RwLock<SwarmState>,
    topology: Arc<RwLock<Topology>>,
    message_bus: MessageBus,
    consensus: ConsensusCoordinator,
    pool: Arc<AgentPool>,
    sessions: Arc<SessionManager>,
    health: Arc<HealthMonitor>,
    plugins: Arc<RwLock<PluginRegistry>>,
    events: Arc<EventBus>,
    tasks: Arc<TaskOrchestrator>,
    phase: RwLock<u32>,
    milestones: RwLock<std::collections::HashMap<String, bool>>,
    adaptation_policy: Arc<dyn TopologyAdaptationPolicy>,
    consecutive_unhealthy: AtomicU32,
    admitting: RwLock<bool>,
}

impl SwarmCoordinator {
    #[must_use]
    pub fn new(kind: TopologyKind, inbox_capacity: usize, deps: SwarmDependencies) -> Self {
        let topology = Arc::new(RwLock::new(Topology::new(kind)));
        let message_bus = MessageBus::new(inbox_capacity, topology.clone(), deps.events.clone());
        Self {
            state: RwLock::new(SwarmState::Initializing),
            topology,
            message_bus,
            consensus: ConsensusCoordinator::new(deps.consensus_strategy),
            pool: deps.pool,
            sessions: deps.sessions,
            health: deps.health,
            plugins: deps.plugins,
            events: deps.events,
            tasks: deps.tasks,
            phase: RwLock::new(0),
            milestones: RwLock::new(std::collections::HashMap::new()),
            adaptation_policy: Arc::new(ConsecutiveUnhealthyPolicy::default()),
            consecutive_unhealthy: AtomicU32::new(0),
            admitting: RwLock::new(true),
        }
    }

    /// Start the background deadlock ticker. Returns a handle that resolves
    /// once `shutdown_rx` fires or is dropped, mirroring [`HealthMonitor::start`].
    #[must_use]
    pub fn start_deadlock_watch(
        self: Arc<Self>,
        check_interval: Duration,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_interval);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Some(blocked) = self.tasks.detect_deadlock().await {
                            let ids: Vec<String> = blocked.iter().map(|id| id.0.clone()).collect();
                            tracing::warn!(tasks = ?ids, "deadlock detected");
                            self.events
                                .emit(Event::new(RESERVED_DEADLOCK, "swarm-coordinator", json!({ "taskIds": ids })))
                                .await;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("deadlock watch received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    #[must_use]
    pub fn message_bus(&self) -> &MessageBus {
        &self.message_bus
    }

    #[must_use]
    pub fn topology(&self) -> &Arc<RwLock<Topology>> {
        &self.topology
    }

    pub async fn state(&self) -> SwarmState {
        *self.state.read().await
    }

    async fn transition(&self, target: SwarmState) -> KernelResult<()> {
        let mut state = self.state.write().await;
        if !state.can_transition_to(target) {
            return Err(KernelError::Conflict(format!("cannot move swarm state from {state:?} to {target:?}")));
        }
        *state = target;
        Ok(())
    }

    /// Load plugins, start the health monitor, and move from `initializing`
    /// to `running`.
    pub async fn initialize(&self, config_for: impl Fn(&str) -> Value) -> KernelResult<()> {
        self.plugins.write().await.initialize(config_for).await.map_err(|err| KernelError::Fatal(err.to_string()))?;
        self.transition(SwarmState::Running).await?;
        self.events.emit(Event::new("swarm:initialized", "swarm-coordinator", json!({}))).await;
        Ok(())
    }

    pub async fn add_agent_to_topology(&self, id: crate::agents::AgentId) {
        self.topology.write().await.add_member(id.clone());
        self.message_bus.register_agent(id).await;
    }

    pub async fn remove_agent_from_topology(&self, id: &crate::agents::AgentId) {
        self.topology.write().await.remove_member(id);
        self.message_bus.remove_agent(id).await;
    }

    /// Drives `running ↔ degraded`. Wired as a [`HealthMonitor`] change
    /// callback by whatever assembles the kernel.
    pub async fn on_health_change(&self, status: HealthStatus) {
        match status {
            HealthStatus::Unhealthy => {
                let count = self.consecutive_unhealthy.fetch_add(1, Ordering::SeqCst) + 1;
                if *self.state.read().await == SwarmState::Running {
                    let _ = self.transition(SwarmState::Degraded).await;
                    self.events.emit(Event::new("swarm:degraded", "swarm-coordinator", json!({}))).await;
                }
                if let Some(fallback) = self.adaptation_policy.should_adapt(count) {
                    let previous = self.topology.read().await.kind();
                    if previous != fallback {
                        self.topology.write().await.set_kind(fallback);
                        self.events
                            .emit(Event::new(
                                "swarm:topology-changed",
                                "swarm-coordinator",
                                json!({ "from": format!("{previous:?}"), "to": format!("{fallback:?}") }),
                            ))
                            .await;
                    }
                }
            }
            HealthStatus::Healthy => {
                self.consecutive_unhealthy.store(0, Ordering::SeqCst);
                if *self.state.read().await == SwarmState::Degraded {
                    let _ = self.transition(SwarmState::Running).await;
                    self.events.emit(Event::new("swarm:recovered", "swarm-coordinator", json!({}))).await;
                }
            }
            HealthStatus::Degraded => {}
        }
    }

    /// Purely observational: advances a coarse, ordered phase counter.
    pub async fn advance_phase(&self) -> u32 {
        let mut phase = self.phase.write().await;
        *phase += 1;
        self.events.emit(Event::new("swarm:phase-advanced", "swarm-coordinator", json!({ "phase": *phase }))).await;
        *phase
    }

    pub async fn current_phase(&self) -> u32 {
        *self.phase.read().await
    }

    /// Marks a milestone complete. Never blocks task flow — purely
    /// informational.
    pub async fn record_milestone(&self, name: impl Into<String>) {
        let name = name.into();
        self.milestones.write().await.insert(name.clone(), true);
        self.events
            .emit(Event::new("swarm:milestone-reached", "swarm-coordinator", json!({ "milestone": name })))
            .await;
    }

    pub async fn milestone_reached(&self, name: &str) -> bool {
        self.milestones.read().await.get(name).copied().unwrap_or(false)
    }

    pub async fn request_consensus(
        &self,
        options: Vec<String>,
        voters: Vec<String>,
        timeout: Duration,
    ) -> KernelResult<ConsensusOutcome> {
        let round_id = self.consensus.begin_round(options, voters).await;
        self.consensus.resolve(&round_id, timeout).await
    }

    #[must_use]
    pub fn consensus(&self) -> &ConsensusCoordinator {
        &self.consensus
    }

    /// Stop admission, drain in-flight work for up to `grace`, terminate all
    /// sessions, terminate every agent lowest-priority-first, stop the
    /// health monitor, and move to `stopped`.
    pub async fn shutdown(&self, grace: Duration, health_shutdown: tokio::sync::broadcast::Sender<()>) -> KernelResult<()> {
        if self.state().await == SwarmState::Stopped {
            return Ok(());
        }
        *self.admitting.write().await = false;
        tokio::time::sleep(grace).await;

        let _ = self.sessions.terminate_all_sessions().await;

        let mut agents = self.pool.all().await;
        agents.sort_by_key(|a| a.config.priority);
        for agent in agents {
            let _ = self.pool.terminate(agent.id(), Some("swarm shutdown".to_string())).await;
        }

        let _ = health_shutdown.send(());
        self.transition(SwarmState::Stopped).await?;
        self.events.emit(Event::new("swarm:shutdown", "swarm-coordinator", json!({}))).await;
        Ok(())
    }

    pub async fn is_admitting(&self) -> bool {
        *self.admitting.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentConfig;
    use crate::plugins::PluginRegistry;
    use crate::swarm::consensus::QuorumVoteStrategy;

    async fn coordinator() -> SwarmCoordinator {
        let events = Arc::new(EventBus::new());
        let pool = Arc::new(AgentPool::new(10, events.clone()));
        let sessions = Arc::new(SessionManager::new(events.clone(), chrono::Duration::hours(1)));
        let health = Arc::new(HealthMonitor::new(events.clone(), Duration::from_secs(60)));
        let plugins = Arc::new(RwLock::new(PluginRegistry::new(events.clone())));
        let registry = Arc::new(crate::tasks::TaskRegistry::new(events.clone()));
        let tasks = Arc::new(TaskOrchestrator::new(registry, pool.clone(), events.clone()));
        SwarmCoordinator::new(
            TopologyKind::Mesh,
            16,
            SwarmDependencies {
                pool,
                sessions,
                health,
                plugins,
                events,
                consensus_strategy: Arc::new(QuorumVoteStrategy),
                tasks,
            },
        )
    }

    #[tokio::test]
    async fn initialize_moves_from_initializing_to_running() {
        let coord = coordinator().await;
        coord.initialize(|_| json!({})).await.unwrap();
        assert_eq!(coord.state().await, SwarmState::Running);
    }

    #[tokio::test]
    async fn sustained_unhealthy_signals_degrade_then_adapt_topology() {
        let coord = coordinator().await;
        coord.initialize(|_| json!({})).await.unwrap();

        coord.on_health_change(HealthStatus::Unhealthy).await;
        assert_eq!(coord.state().await, SwarmState::Degraded);
        assert_eq!(coord.topology.read().await.kind(), TopologyKind::Mesh);

        coord.on_health_change(HealthStatus::Unhealthy).await;
        coord.on_health_change(HealthStatus::Unhealthy).await;

        coord.on_health_change(HealthStatus::Healthy).await;
        assert_eq!(coord.state().await, SwarmState::Running);
    }

    #[tokio::test]
    async fn topology_adapts_to_a_fallback_kind_after_adaptive_starts() {
        let events = Arc::new(EventBus::new());
        let pool = Arc::new(AgentPool::new(10, events.clone()));
        let sessions = Arc::new(SessionManager::new(events.clone(), chrono::Duration::hours(1)));
        let health = Arc::new(HealthMonitor::new(events.clone(), Duration::from_secs(60)));
        let plugins = Arc::new(RwLock::new(PluginRegistry::new(events.clone())));
        let registry = Arc::new(crate::tasks::TaskRegistry::new(events.clone()));
        let tasks = Arc::new(TaskOrchestrator::new(registry, pool.clone(), events.clone()));
        let coord = SwarmCoordinator::new(
            TopologyKind::Adaptive,
            16,
            SwarmDependencies { pool, sessions, health, plugins, events, consensus_strategy: Arc::new(QuorumVoteStrategy), tasks },
        );
        coord.initialize(|_| json!({})).await.unwrap();
        for _ in 0..3 {
            coord.on_health_change(HealthStatus::Unhealthy).await;
        }
        assert_eq!(coord.topology.read().await.kind(), TopologyKind::Mesh);
    }

    #[tokio::test]
    async fn shutdown_terminates_agents_lowest_priority_first_and_stops() {
        let coord = coordinator().await;
        coord.initialize(|_| json!({})).await.unwrap();
        coord.pool.spawn(AgentConfig::new("low", "worker").with_priority(10)).await.unwrap();
        coord.pool.spawn(AgentConfig::new("high", "worker").with_priority(90)).await.unwrap();

        let (tx, _rx) = tokio::sync::broadcast::channel(1);
        coord.shutdown(Duration::from_millis(1), tx).await.unwrap();

        assert_eq!(coord.state().await, SwarmState::Stopped);
        assert_eq!(coord.pool.len().await, 0);
    }

    #[tokio::test]
    async fn milestones_are_observational_only() {
        let coord = coordinator().await;
        assert!(!coord.milestone_reached("phase-1-complete").await);
        coord.record_milestone("phase-1-complete").await;
        assert!(coord.milestone_reached("phase-1-complete").await);
    }
}
