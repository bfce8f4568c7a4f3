//! Claude-Flow orchestration core: an in-process kernel wiring together
//! the event bus, task queue/registry/orchestrator, agent pool, session
//! manager, health monitor, swarm coordinator, plugin registry, and
//! configuration kernel behind one constructor.

pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod ids;
pub mod mcp;
pub mod plugins;
pub mod serde_helpers;
pub mod sessions;
pub mod swarm;
pub mod tasks;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};

use agents::AgentPool;
use config::SystemConfig;
use error::KernelResult;
use events::EventBus;
use health::HealthMonitor;
use mcp::Dispatcher;
use plugins::PluginRegistry;
use sessions::SessionManager;
use swarm::{SwarmCoordinator, SwarmDependencies, TopologyKind};
use tasks::{TaskOrchestrator, TaskRegistry};

/// The fully assembled orchestration core. Every public method a transport
/// needs is reachable from here; `mcp::Dispatcher` only needs a slice of
/// it, constructed via [`Kernel::dispatcher`].
pub struct Kernel {
    pub config: SystemConfig,
    pub events: Arc<EventBus>,
    pub agents: Arc<AgentPool>,
    pub tasks: Arc<TaskOrchestrator>,
    pub sessions: Arc<SessionManager>,
    pub health: Arc<HealthMonitor>,
    pub swarm: Arc<SwarmCoordinator>,
    pub plugins: Arc<RwLock<PluginRegistry>>,
    health_shutdown: broadcast::Sender<()>,
}

impl Kernel {
    /// Assemble every subsystem from `config`, install the default event
    /// logger, wire the swarm coordinator as the health monitor's change
    /// callback, and seed topology membership from the agent pool (empty
    /// at this point — real membership is added as agents spawn).
    pub async fn new(config: SystemConfig) -> Self {
        let events = Arc::new(EventBus::new());
        events.install_default_logger().await;

        let agents = Arc::new(AgentPool::new(config.agents.max_agents, events.clone()));
        let registry = Arc::new(TaskRegistry::new(events.clone()));
        let tasks = Arc::new(TaskOrchestrator::new(registry, agents.clone(), events.clone()));
        let sessions = Arc::new(SessionManager::new(
            events.clone(),
            chrono::Duration::seconds(config.orchestrator.shutdown_grace_secs as i64),
        ));
        let health = Arc::new(HealthMonitor::new(
            events.clone(),
            Duration::from_millis(config.orchestrator.health_check_interval_ms),
        ));
        let plugins = Arc::new(RwLock::new(PluginRegistry::new(events.clone())));

        let topology_kind = TopologyKind::parse_str(&config.swarm.topology).unwrap_or(TopologyKind::Mesh);
        let swarm = Arc::new(SwarmCoordinator::new(
            topology_kind,
            config.swarm.inbox_capacity,
            SwarmDependencies {
                pool: agents.clone(),
                sessions: sessions.clone(),
                health: health.clone(),
                plugins: plugins.clone(),
                events: events.clone(),
                consensus_strategy: Arc::new(swarm::QuorumVoteStrategy),
                tasks: tasks.clone(),
            },
        ));

        let swarm_for_callback = swarm.clone();
        health
            .on_change(move |status| {
                let swarm = swarm_for_callback.clone();
                tokio::spawn(async move {
                    swarm.on_health_change(status).await;
                });
            })
            .await;

        let (health_shutdown, _rx) = broadcast::channel(1);

        Self { config, events, agents, tasks, sessions, health, swarm, plugins, health_shutdown }
    }

    /// Start the swarm (loads plugins, begins accepting work), the health
    /// monitor's background ticker, and the periodic deadlock watch. Both
    /// tickers share the kernel's single shutdown broadcast.
    pub async fn start(&self) -> KernelResult<()> {
        self.swarm.initialize(|_plugin_name| serde_json::json!({})).await?;
        self.health.clone().start(self.health_shutdown.subscribe());
        self.swarm.clone().start_deadlock_watch(
            Duration::from_millis(self.config.orchestrator.deadlock_check_interval_ms),
            self.health_shutdown.subscribe(),
        );
        Ok(())
    }

    /// Orderly shutdown: delegates to the swarm coordinator, which itself
    /// stops the health monitor via the shared shutdown channel.
    pub async fn shutdown(&self) -> KernelResult<()> {
        self.swarm.shutdown(Duration::from_secs(self.config.orchestrator.shutdown_grace_secs), self.health_shutdown.clone()).await
    }

    /// Build a dispatcher over this kernel's task and agent subsystems for
    /// an MCP transport to route requests through.
    #[must_use]
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(self.tasks.clone(), self.agents.clone()))
    }
}
