//! The plugin contract.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::KernelResult;
use crate::events::EventBus;

/// Handed to every plugin's `initialize`: the event bus, a service
/// container, and the plugin's own slice of validated configuration.
/// Plugins never reach into the kernel beyond what this context exposes.
pub struct PluginContext {
    pub events: Arc<EventBus>,
    pub services: HashMap<String, Arc<dyn Any + Send + Sync>>,
    pub config: Value,
}

impl PluginContext {
    #[must_use]
    pub fn new(events: Arc<EventBus>, config: Value) -> Self {
        Self { events, services: HashMap::new(), config }
    }
}

/// An external module contributing agent types, task types, tools, CLI
/// commands, or memory backends, initialised and shut down by the kernel in
/// dependency order.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn dependencies(&self) -> &[String] {
        &[]
    }

    async fn initialize(&self, ctx: &PluginContext) -> KernelResult<()>;
    async fn shutdown(&self, ctx: &PluginContext) -> KernelResult<()>;

    fn register_agent_types(&self) -> Vec<String> {
        Vec::new()
    }
    fn register_task_types(&self) -> Vec<String> {
        Vec::new()
    }
    fn register_mcp_tools(&self) -> Vec<String> {
        Vec::new()
    }
    fn register_cli_commands(&self) -> Vec<String> {
        Vec::new()
    }
    fn register_memory_backends(&self) -> Vec<String> {
        Vec::new()
    }
}
