//! C8: dependency-ordered plugin load, contribution gathering, and
//! reverse-order shutdown.
//!
//! The topological ordering is the same depth-first, visited/rec-stack/path
//! cycle detection used for task dependency graphs, generalized from task
//! ids to plugin names.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use super::plugin::{Plugin, PluginContext};
use crate::events::EventBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginLifecycleState {
    Uninitialized,
    Initializing,
    Initialized,
    ShuttingDown,
    Shutdown,
    Error,
}

#[derive(Debug, Clone)]
pub struct PluginRecord {
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,
    pub state: PluginLifecycleState,
    pub agent_type_count: usize,
    pub task_type_count: usize,
    pub mcp_tool_count: usize,
    pub cli_command_count: usize,
    pub memory_backend_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PluginRegistryError {
    #[error("plugin {0} is already registered")]
    DuplicateName(String),
    #[error("plugin {0} has an empty name")]
    InvalidPlugin(String),
    #[error("CIRCULAR_DEPENDENCY: cycle detected among plugins: {0:?}")]
    CircularDependency(Vec<String>),
    #[error("INITIALIZATION_FAILED: plugin {plugin} failed to initialize: {reason}")]
    InitializationFailed { plugin: String, reason: String },
    #[error("plugin {0} is not registered")]
    NotFound(String),
}

struct Entry {
    plugin: Arc<dyn Plugin>,
    state: PluginLifecycleState,
}

pub struct PluginRegistry {
    entries: HashMap<String, Entry>,
    agent_types: HashMap<String, String>,
    task_types: HashMap<String, String>,
    mcp_tools: HashMap<String, String>,
    cli_commands: HashMap<String, String>,
    memory_backends: HashMap<String, String>,
    events: Arc<EventBus>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            entries: HashMap::new(),
            agent_types: HashMap::new(),
            task_types: HashMap::new(),
            mcp_tools: HashMap::new(),
            cli_commands: HashMap::new(),
            memory_backends: HashMap::new(),
            events,
        }
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PluginRegistryError> {
        let name = plugin.name().to_string();
        if name.is_empty() {
            return Err(PluginRegistryError::InvalidPlugin("<empty>".into()));
        }
        if self.entries.contains_key(&name) {
            return Err(PluginRegistryError::DuplicateName(name));
        }
        self.entries.insert(name, Entry { plugin, state: PluginLifecycleState::Uninitialized });
        Ok(())
    }

    fn topological_order(&self) -> Result<Vec<String>, PluginRegistryError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut rec_stack: HashSet<String> = HashSet::new();
        let mut path: Vec<String> = Vec::new();
        let mut order: Vec<String> = Vec::new();

        fn visit(
            name: &str,
            entries: &HashMap<String, Entry>,
            visited: &mut HashSet<String>,
            rec_stack: &mut HashSet<String>,
            path: &mut Vec<String>,
            order: &mut Vec<String>,
        ) -> Result<(), PluginRegistryError> {
            if rec_stack.contains(name) {
                path.push(name.to_string());
                let cycle_start = path.iter().position(|n| n == name).unwrap_or(0);
                return Err(PluginRegistryError::CircularDependency(path[cycle_start..].to_vec()));
            }
            if visited.contains(name) {
                return Ok(());
            }
            visited.insert(name.to_string());
            rec_stack.insert(name.to_string());
            path.push(name.to_string());

            if let Some(entry) = entries.get(name) {
                for dep in entry.plugin.dependencies() {
                    visit(dep, entries, visited, rec_stack, path, order)?;
                }
            }

            path.pop();
            rec_stack.remove(name);
            order.push(name.to_string());
            Ok(())
        }

        let names: Vec<String> = self.entries.keys().cloned().collect();
        for name in names {
            visit(&name, &self.entries, &mut visited, &mut rec_stack, &mut path, &mut order)?;
        }
        Ok(order)
    }

    /// Initialize every registered plugin in dependency order. On the first
    /// failure, every already-initialized plugin is shut down in reverse
    /// order and the whole call fails.
    pub async fn initialize(&mut self, config_for: impl Fn(&str) -> Value) -> Result<(), PluginRegistryError> {
        let order = self.topological_order()?;
        let mut initialized: Vec<String> = Vec::new();

        for name in &order {
            let plugin = self.entries.get(name).expect("name came from entries").plugin.clone();
            self.entries.get_mut(name).unwrap().state = PluginLifecycleState::Initializing;
            let ctx = PluginContext::new(self.events.clone(), config_for(name));

            match plugin.initialize(&ctx).await {
                Ok(()) => {
                    self.entries.get_mut(name).unwrap().state = PluginLifecycleState::Initialized;
                    for t in plugin.register_agent_types() {
                        self.agent_types.insert(t, name.clone());
                    }
                    for t in plugin.register_task_types() {
                        self.task_types.insert(t, name.clone());
                    }
                    for t in plugin.register_mcp_tools() {
                        self.mcp_tools.insert(t, name.clone());
                    }
                    for t in plugin.register_cli_commands() {
                        self.cli_commands.insert(t, name.clone());
                    }
                    for t in plugin.register_memory_backends() {
                        self.memory_backends.insert(t, name.clone());
                    }
                    initialized.push(name.clone());
                }
                Err(err) => {
                    self.entries.get_mut(name).unwrap().state = PluginLifecycleState::Error;
                    for rollback_name in initialized.iter().rev() {
                        let rollback_plugin = self.entries.get(rollback_name).unwrap().plugin.clone();
                        let rollback_ctx = PluginContext::new(self.events.clone(), config_for(rollback_name));
                        if let Err(shutdown_err) = rollback_plugin.shutdown(&rollback_ctx).await {
                            tracing::error!(plugin = %rollback_name, error = %shutdown_err, "rollback shutdown failed");
                        }
                        self.entries.get_mut(rollback_name).unwrap().state = PluginLifecycleState::Shutdown;
                        self.remove_contributions(rollback_name);
                    }
                    return Err(PluginRegistryError::InitializationFailed {
                        plugin: name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn remove_contributions(&mut self, plugin_name: &str) {
        self.agent_types.retain(|_, owner| owner != plugin_name);
        self.task_types.retain(|_, owner| owner != plugin_name);
        self.mcp_tools.retain(|_, owner| owner != plugin_name);
        self.cli_commands.retain(|_, owner| owner != plugin_name);
        self.memory_backends.retain(|_, owner| owner != plugin_name);
    }

    /// Shut down every initialized plugin in reverse topological order.
    /// Individual failures are logged but never abort the sweep.
    pub async fn shutdown(&mut self, config_for: impl Fn(&str) -> Value) -> Result<(), PluginRegistryError> {
        let order = self.topological_order()?;
        for name in order.iter().rev() {
            let entry = self.entries.get_mut(name).unwrap();
            if entry.state != PluginLifecycleState::Initialized {
                continue;
            }
            entry.state = PluginLifecycleState::ShuttingDown;
            let plugin = entry.plugin.clone();
            let ctx = PluginContext::new(self.events.clone(), config_for(name));
            if let Err(err) = plugin.shutdown(&ctx).await {
                tracing::error!(plugin = %name, error = %err, "plugin shutdown failed");
            }
            self.entries.get_mut(name).unwrap().state = PluginLifecycleState::Shutdown;
        }
        Ok(())
    }

    #[must_use]
    pub fn record(&self, name: &str) -> Option<PluginRecord> {
        let entry = self.entries.get(name)?;
        Some(PluginRecord {
            name: name.to_string(),
            version: entry.plugin.version().to_string(),
            dependencies: entry.plugin.dependencies().to_vec(),
            state: entry.state,
            agent_type_count: self.agent_types.values().filter(|o| *o == name).count(),
            task_type_count: self.task_types.values().filter(|o| *o == name).count(),
            mcp_tool_count: self.mcp_tools.values().filter(|o| *o == name).count(),
            cli_command_count: self.cli_commands.values().filter(|o| *o == name).count(),
            memory_backend_count: self.memory_backends.values().filter(|o| *o == name).count(),
        })
    }

    #[must_use]
    pub fn agent_type_owner(&self, agent_type: &str) -> Option<&str> {
        self.agent_types.get(agent_type).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{KernelError, KernelResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestPlugin {
        name: &'static str,
        deps: Vec<String>,
        fail_init: bool,
        init_order: Arc<std::sync::Mutex<Vec<&'static str>>>,
        shutdown_order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait::async_trait]
    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn dependencies(&self) -> &[String] {
            &self.deps
        }
        async fn initialize(&self, _ctx: &PluginContext) -> KernelResult<()> {
            if self.fail_init {
                return Err(KernelError::Fatal(format!("{} exploded", self.name)));
            }
            self.init_order.lock().unwrap().push(self.name);
            Ok(())
        }
        async fn shutdown(&self, _ctx: &PluginContext) -> KernelResult<()> {
            self.shutdown_order.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    fn events() -> Arc<EventBus> {
        Arc::new(EventBus::new())
    }

    #[tokio::test]
    async fn register_rejects_duplicate_names() {
        let mut registry = PluginRegistry::new(events());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let p1 = Arc::new(TestPlugin { name: "p1", deps: vec![], fail_init: false, init_order: order.clone(), shutdown_order: order.clone() });
        registry.register(p1.clone()).unwrap();
        let err = registry.register(p1).unwrap_err();
        assert!(matches!(err, PluginRegistryError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn initializes_in_dependency_order() {
        let mut registry = PluginRegistry::new(events());
        let init_order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let shutdown_order = Arc::new(std::sync::Mutex::new(Vec::new()));

        registry
            .register(Arc::new(TestPlugin {
                name: "p2",
                deps: vec!["p1".to_string()],
                fail_init: false,
                init_order: init_order.clone(),
                shutdown_order: shutdown_order.clone(),
            }))
            .unwrap();
        registry
            .register(Arc::new(TestPlugin {
                name: "p1",
                deps: vec![],
                fail_init: false,
                init_order: init_order.clone(),
                shutdown_order: shutdown_order.clone(),
            }))
            .unwrap();

        registry.initialize(|_| Value::Null).await.unwrap();
        assert_eq!(*init_order.lock().unwrap(), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn cycle_fails_the_whole_initialization() {
        let mut registry = PluginRegistry::new(events());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        registry
            .register(Arc::new(TestPlugin { name: "a", deps: vec!["b".to_string()], fail_init: false, init_order: order.clone(), shutdown_order: order.clone() }))
            .unwrap();
        registry
            .register(Arc::new(TestPlugin { name: "b", deps: vec!["a".to_string()], fail_init: false, init_order: order.clone(), shutdown_order: order.clone() }))
            .unwrap();

        let err = registry.initialize(|_| Value::Null).await.unwrap_err();
        assert!(matches!(err, PluginRegistryError::CircularDependency(_)));
    }

    #[tokio::test]
    async fn failed_plugin_rolls_back_already_initialized_ones_in_reverse_order() {
        let mut registry = PluginRegistry::new(events());
        let init_order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let shutdown_order = Arc::new(std::sync::Mutex::new(Vec::new()));

        registry
            .register(Arc::new(TestPlugin { name: "p1", deps: vec![], fail_init: false, init_order: init_order.clone(), shutdown_order: shutdown_order.clone() }))
            .unwrap();
        registry
            .register(Arc::new(TestPlugin {
                name: "p2",
                deps: vec!["p1".to_string()],
                fail_init: false,
                init_order: init_order.clone(),
                shutdown_order: shutdown_order.clone(),
            }))
            .unwrap();
        registry
            .register(Arc::new(TestPlugin {
                name: "p3",
                deps: vec!["p2".to_string()],
                fail_init: true,
                init_order: init_order.clone(),
                shutdown_order: shutdown_order.clone(),
            }))
            .unwrap();

        let err = registry.initialize(|_| Value::Null).await.unwrap_err();
        assert!(matches!(err, PluginRegistryError::InitializationFailed { .. }));
        assert_eq!(*shutdown_order.lock().unwrap(), vec!["p2", "p1"]);
        assert_eq!(registry.record("p1").unwrap().state, PluginLifecycleState::Shutdown);
    }

    #[tokio::test]
    async fn shutdown_failures_are_logged_but_do_not_abort_the_sweep() {
        let mut registry = PluginRegistry::new(events());
        let calls = Arc::new(AtomicUsize::new(0));
        struct FlakyShutdown {
            calls: Arc<AtomicUsize>,
        }
        #[async_trait::async_trait]
        impl Plugin for FlakyShutdown {
            fn name(&self) -> &str {
                "flaky"
            }
            fn version(&self) -> &str {
                "1.0.0"
            }
            async fn initialize(&self, _ctx: &PluginContext) -> KernelResult<()> {
                Ok(())
            }
            async fn shutdown(&self, _ctx: &PluginContext) -> KernelResult<()> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(KernelError::External("disk full".into()))
            }
        }
        registry.register(Arc::new(FlakyShutdown { calls: calls.clone() })).unwrap();
        registry.initialize(|_| Value::Null).await.unwrap();
        registry.shutdown(|_| Value::Null).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.record("flaky").unwrap().state, PluginLifecycleState::Shutdown);
    }
}
