//! Black-box coverage of the kernel's public surface, exercised through
//! `Kernel` rather than any single module's internals.

use claude_flow_core::agents::AgentConfig;
use claude_flow_core::config::SystemConfig;
use claude_flow_core::tasks::{Task, TaskStatus};
use claude_flow_core::Kernel;
use serde_json::json;

async fn running_kernel() -> Kernel {
    let kernel = Kernel::new(SystemConfig::default()).await;
    kernel.start().await.unwrap();
    kernel
}

#[tokio::test]
async fn linear_pipeline_completes_both_tasks_through_the_kernel() {
    let kernel = running_kernel().await;
    kernel
        .agents
        .spawn(AgentConfig::new("a1", "worker").with_supported_task_type("build"))
        .await
        .unwrap();

    let t1 = kernel.tasks.create_task(Task::new("build", "t1")).await.unwrap();
    let t2 = kernel.tasks.create_task(Task::new("build", "t2")).await.unwrap();
    kernel.tasks.add_dependency(&t2, &t1).await.unwrap();
    kernel.tasks.queue_task(&t1).await.unwrap();
    kernel.tasks.queue_task(&t2).await.unwrap();

    let agent_id = kernel.agents.all().await[0].id().clone();
    let assigned = kernel.tasks.assign_task(&agent_id).await.unwrap().unwrap();
    assert_eq!(assigned, t1);
    kernel.tasks.start_task(&t1).await.unwrap();
    kernel.tasks.complete_task(&t1, json!({})).await.unwrap();

    let assigned2 = kernel.tasks.assign_task(&agent_id).await.unwrap().unwrap();
    assert_eq!(assigned2, t2);
    kernel.tasks.start_task(&t2).await.unwrap();
    kernel.tasks.complete_task(&t2, json!({})).await.unwrap();

    assert_eq!(kernel.tasks.get_task(&t1).await.unwrap().status, TaskStatus::Completed);
    assert_eq!(kernel.tasks.get_task(&t2).await.unwrap().status, TaskStatus::Completed);
    assert_eq!(kernel.tasks.metrics().await.completed_tasks, 2);
}

#[tokio::test]
async fn capacity_rejection_keeps_pool_size_at_the_configured_max() {
    let mut config = SystemConfig::default();
    config.agents.max_agents = 2;
    let kernel = Kernel::new(config).await;
    kernel.start().await.unwrap();

    kernel.agents.spawn(AgentConfig::new("a1", "worker")).await.unwrap();
    kernel.agents.spawn(AgentConfig::new("a2", "worker")).await.unwrap();
    let err = kernel.agents.spawn(AgentConfig::new("a3", "worker")).await.unwrap_err();

    assert!(err.to_string().to_lowercase().contains("maximum"));
    assert_eq!(kernel.agents.len().await, 2);
}

#[tokio::test]
async fn shutdown_is_idempotent_and_stops_the_swarm_exactly_once() {
    let kernel = running_kernel().await;
    kernel.shutdown().await.unwrap();
    // A second shutdown call must not panic or re-run agent termination;
    // the swarm is already stopped and has nothing left to drain.
    kernel.shutdown().await.unwrap();
    assert_eq!(kernel.swarm.state().await, claude_flow_core::swarm::SwarmState::Stopped);
}

#[tokio::test]
async fn dispatcher_round_trips_a_task_created_over_json_rpc() {
    let kernel = running_kernel().await;
    let dispatcher = kernel.dispatcher();
    let create = claude_flow_core::mcp::JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(json!(1)),
        method: "tools/call".to_string(),
        params: Some(json!({
            "name": "task_create",
            "arguments": { "taskType": "build", "priority": 10 }
        })),
    };
    let response = dispatcher.handle(create).await.unwrap();
    assert!(response.error.is_none());
}
