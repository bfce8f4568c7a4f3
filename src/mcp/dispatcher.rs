//! Method routing shared by the stdio and HTTP transports: one dispatcher
//! per kernel, called by both so the tool surface is identical regardless
//! of how a request arrived.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::agents::{AgentConfig, AgentId, AgentPool};
use crate::tasks::{Task, TaskId, TaskOrchestrator};

use super::error::to_json_rpc_error;
use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Holds the kernel components the dispatcher routes `tools/call` into.
/// A thin façade rather than the full kernel so the MCP layer can be
/// exercised without constructing every subsystem.
pub struct Dispatcher {
    pub tasks: Arc<TaskOrchestrator>,
    pub agents: Arc<AgentPool>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(tasks: Arc<TaskOrchestrator>, agents: Arc<AgentPool>) -> Self {
        Self { tasks, agents }
    }

    /// Handle one already-parsed request. Returns `None` for notifications
    /// (no `id`), matching JSON-RPC 2.0 semantics.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            return None;
        }
        let id = request.id.clone();
        let result = self.route(&request.method, request.params.unwrap_or_else(|| json!({}))).await;
        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(rpc_err) => JsonRpcResponse::failure(id, rpc_err),
        })
    }

    async fn route(&self, method: &str, params: Value) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "claude-flow", "version": env!("CARGO_PKG_VERSION") },
            })),
            "tools/list" => Ok(Self::tools_list()),
            "tools/call" => self.tools_call(&params).await,
            _ => Err(JsonRpcError::new(JsonRpcError::METHOD_NOT_FOUND, format!("method not found: {method}"))),
        }
    }

    fn tools_list() -> Value {
        json!({
            "tools": [
                {
                    "name": "task_create",
                    "description": "Create and queue a task",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "taskType": { "type": "string" },
                            "priority": { "type": "integer" },
                            "requiredCapabilities": { "type": "array", "items": { "type": "string" } }
                        },
                        "required": ["taskType"]
                    }
                },
                {
                    "name": "task_get",
                    "description": "Fetch a task by id",
                    "inputSchema": {
                        "type": "object",
                        "properties": { "taskId": { "type": "string" } },
                        "required": ["taskId"]
                    }
                },
                {
                    "name": "agent_spawn",
                    "description": "Spawn an agent from config",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "role": { "type": "string" }
                        },
                        "required": ["id", "role"]
                    }
                }
            ]
        })
    }

    async fn tools_call(&self, params: &Value) -> Result<Value, JsonRpcError> {
        let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match name {
            "task_create" => self.tool_task_create(&arguments).await,
            "task_get" => self.tool_task_get(&arguments).await,
            "agent_spawn" => self.tool_agent_spawn(&arguments).await,
            _ => Err(JsonRpcError::new(JsonRpcError::METHOD_NOT_FOUND, format!("unknown tool: {name}"))),
        }
    }

    async fn tool_task_create(&self, args: &Value) -> Result<Value, JsonRpcError> {
        let task_type = args
            .get("taskType")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::new(JsonRpcError::INVALID_REQUEST, "missing taskType"))?;
        let priority = args.get("priority").and_then(Value::as_i64).unwrap_or(0) as i32;
        let required_capabilities: Vec<String> = args
            .get("requiredCapabilities")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let mut task = Task::new(task_type, String::new()).with_priority(priority);
        for cap in required_capabilities {
            task = task.with_required_capability(cap);
        }
        let id = task.id.clone();

        self.tasks.create_task(task).await.map_err(|e| to_json_rpc_error(&e))?;
        self.tasks.queue_task(&id).await.map_err(|e| to_json_rpc_error(&e))?;

        Ok(json!({ "taskId": id.0 }))
    }

    async fn tool_task_get(&self, args: &Value) -> Result<Value, JsonRpcError> {
        let task_id = args
            .get("taskId")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::new(JsonRpcError::INVALID_REQUEST, "missing taskId"))?;
        let task = self
            .tasks
            .get_task(&TaskId(task_id.to_string()))
            .await
            .ok_or_else(|| JsonRpcError::new(JsonRpcError::GENERIC, format!("task {task_id} not found")))?;
        serde_json::to_value(&task).map_err(|e| JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()))
    }

    async fn tool_agent_spawn(&self, args: &Value) -> Result<Value, JsonRpcError> {
        let id = args
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::new(JsonRpcError::INVALID_REQUEST, "missing id"))?;
        let role = args.get("role").and_then(Value::as_str).unwrap_or("worker");

        let config = AgentConfig::new(id, role);
        let spawned: AgentId = self.agents.spawn(config).await.map_err(|e| to_json_rpc_error(&e))?;
        Ok(json!({ "agentId": spawned.0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;

    fn dispatcher() -> Dispatcher {
        let events = Arc::new(EventBus::new());
        Dispatcher::new(
            Arc::new(TaskOrchestrator::new(
                Arc::new(crate::tasks::TaskRegistry::new(events.clone())),
                Arc::new(AgentPool::new(10, events.clone())),
                events.clone(),
            )),
            Arc::new(AgentPool::new(10, events)),
        )
    }

    #[tokio::test]
    async fn notification_produces_no_response() {
        let d = dispatcher();
        let req: JsonRpcRequest = serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(d.handle(req).await.is_none());
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let d = dispatcher();
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"bogus"}"#).unwrap();
        let resp = d.handle(req).await.unwrap();
        assert_eq!(resp.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn task_create_then_get_round_trips() {
        let d = dispatcher();
        let create_req: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/call",
            "params": { "name": "task_create", "arguments": { "taskType": "build" } }
        }))
        .unwrap();
        let resp = d.handle(create_req).await.unwrap();
        let task_id = resp.result.unwrap()["taskId"].as_str().unwrap().to_string();

        let get_req: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/call",
            "params": { "name": "task_get", "arguments": { "taskId": task_id } }
        }))
        .unwrap();
        let resp = d.handle(get_req).await.unwrap();
        assert!(resp.error.is_none());
        assert_eq!(resp.result.unwrap()["task_type"], "build");
    }
}
