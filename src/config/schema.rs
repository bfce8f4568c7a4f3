//! Typed configuration shapes with defaults, mirroring the teacher's
//! `domain/models/config.rs` split into one struct per concern plus a
//! system config that aggregates them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Storage backend selectable for the memory subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Sqlite,
    Agentdb,
    Hybrid,
    Redis,
    Memory,
}

impl MemoryType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Agentdb => "agentdb",
            Self::Hybrid => "hybrid",
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }

    #[must_use]
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "sqlite" => Some(Self::Sqlite),
            "agentdb" => Some(Self::Agentdb),
            "hybrid" => Some(Self::Hybrid),
            "redis" => Some(Self::Redis),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Wire transport selectable for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpTransport {
    Stdio,
    Http,
    Websocket,
}

impl McpTransport {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::Websocket => "websocket",
        }
    }

    #[must_use]
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "stdio" => Some(Self::Stdio),
            "http" => Some(Self::Http),
            "websocket" => Some(Self::Websocket),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentTypeConfig {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub supported_task_types: Vec<String>,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: u32,
    #[serde(default = "default_agent_priority")]
    pub priority: u8,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_role() -> String {
    "worker".to_string()
}

const fn default_max_concurrent_tasks() -> u32 {
    1
}

const fn default_agent_priority() -> u8 {
    50
}

const fn default_max_retries() -> u32 {
    3
}

impl Default for AgentTypeConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            capabilities: Vec::new(),
            supported_task_types: Vec::new(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            priority: default_agent_priority(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentPoolConfig {
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    #[serde(default)]
    pub types: HashMap<String, AgentTypeConfig>,
}

const fn default_max_agents() -> usize {
    10
}

impl Default for AgentPoolConfig {
    fn default() -> Self {
        Self { max_agents: default_max_agents(), types: HashMap::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_cleanup_after_secs")]
    pub cleanup_after_secs: u64,
}

const fn default_cleanup_after_secs() -> u64 {
    86_400
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self { max_retries: default_max_retries(), cleanup_after_secs: default_cleanup_after_secs() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SwarmConfig {
    #[serde(default = "default_swarm_topology")]
    pub topology: String,
    #[serde(default = "default_quorum_threshold")]
    pub consensus_threshold: f64,
    #[serde(default = "default_consensus_timeout_ms")]
    pub consensus_timeout_ms: u64,
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

fn default_swarm_topology() -> String {
    "mesh".to_string()
}

const fn default_quorum_threshold() -> f64 {
    0.66
}

const fn default_consensus_timeout_ms() -> u64 {
    5_000
}

const fn default_inbox_capacity() -> usize {
    100
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            topology: default_swarm_topology(),
            consensus_threshold: default_quorum_threshold(),
            consensus_timeout_ms: default_consensus_timeout_ms(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemoryConfig {
    #[serde(default = "default_memory_type")]
    pub backend: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_memory_type() -> String {
    MemoryType::Sqlite.as_str().to_string()
}

fn default_data_dir() -> String {
    ".claude-flow".to_string()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { backend: default_memory_type(), data_dir: default_data_dir() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct McpServerConfig {
    pub name: String,
    #[serde(default = "default_mcp_transport")]
    pub transport: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_mcp_transport() -> String {
    McpTransport::Stdio.as_str().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_deadlock_check_interval_ms")]
    pub deadlock_check_interval_ms: u64,
}

const fn default_shutdown_grace_secs() -> u64 {
    30
}

const fn default_health_check_interval_ms() -> u64 {
    10_000
}

const fn default_deadlock_check_interval_ms() -> u64 {
    15_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: default_shutdown_grace_secs(),
            health_check_interval_ms: default_health_check_interval_ms(),
            deadlock_check_interval_ms: default_deadlock_check_interval_ms(),
        }
    }
}

/// Aggregate system configuration: the single typed value the kernel is
/// constructed from, and the extraction target of the layered loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SystemConfig {
    #[serde(default)]
    pub agents: AgentPoolConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub swarm: SwarmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            agents: AgentPoolConfig::default(),
            tasks: TaskConfig::default(),
            swarm: SwarmConfig::default(),
            memory: MemoryConfig::default(),
            mcp_servers: Vec::new(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// One validation failure: where it was found, a stable code for
/// programmatic handling, and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigError {
    pub path: String,
    pub code: &'static str,
    pub message: String,
}

impl ConfigError {
    #[must_use]
    pub fn new(path: impl Into<String>, code: &'static str, message: impl Into<String>) -> Self {
        Self { path: path.into(), code, message: message.into() }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.path, self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_type_round_trips_through_its_string_form() {
        for kind in [MemoryType::Sqlite, MemoryType::Agentdb, MemoryType::Hybrid, MemoryType::Redis, MemoryType::Memory] {
            assert_eq!(MemoryType::parse_str(kind.as_str()), Some(kind));
        }
        assert_eq!(MemoryType::parse_str("bogus"), None);
    }

    #[test]
    fn mcp_transport_round_trips_through_its_string_form() {
        for kind in [McpTransport::Stdio, McpTransport::Http, McpTransport::Websocket] {
            assert_eq!(McpTransport::parse_str(kind.as_str()), Some(kind));
        }
        assert_eq!(McpTransport::parse_str("bogus"), None);
    }

    #[test]
    fn default_system_config_has_expected_shape() {
        let config = SystemConfig::default();
        assert_eq!(config.agents.max_agents, 10);
        assert_eq!(config.swarm.topology, "mesh");
        assert!((config.swarm.consensus_threshold - 0.66).abs() < f64::EPSILON);
        assert_eq!(config.memory.backend, "sqlite");
    }
}
