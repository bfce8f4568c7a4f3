//! C9: the configuration kernel — typed schema, layered loader, and role
//! presets.

mod loader;
mod presets;
mod schema;

pub use loader::ConfigLoader;
pub use presets::{by_role as preset_by_role, coder, coordinator, researcher, reviewer, tester};
pub use schema::{
    AgentPoolConfig, AgentTypeConfig, ConfigError, McpServerConfig, McpTransport, MemoryConfig,
    MemoryType, OrchestratorConfig, SwarmConfig, SystemConfig, TaskConfig,
};
