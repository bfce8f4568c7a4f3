//! C3: the agent pool and its lifecycle.

mod model;
mod pool;

pub use model::{Agent, AgentConfig, AgentId, AgentStatus, HealthLevel};
pub use pool::{AgentPool, SpawnBatchOutcome};
