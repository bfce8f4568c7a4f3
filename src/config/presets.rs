//! Default [`AgentTypeConfig`] values for common agent roles, consumed by
//! `registerAgentTypes` the way the teacher's `defaults` section of
//! `AgentConfiguration` supplies a fallback for agent types no explicit
//! contract names.

use super::schema::AgentTypeConfig;

#[must_use]
pub fn coordinator() -> AgentTypeConfig {
    AgentTypeConfig {
        role: "coordinator".to_string(),
        capabilities: vec!["planning".to_string(), "delegation".to_string()],
        supported_task_types: vec!["orchestration".to_string()],
        max_concurrent_tasks: 5,
        priority: 90,
        max_retries: 2,
    }
}

#[must_use]
pub fn researcher() -> AgentTypeConfig {
    AgentTypeConfig {
        role: "researcher".to_string(),
        capabilities: vec!["search".to_string(), "summarization".to_string()],
        supported_task_types: vec!["research".to_string()],
        max_concurrent_tasks: 3,
        priority: 50,
        max_retries: 3,
    }
}

#[must_use]
pub fn coder() -> AgentTypeConfig {
    AgentTypeConfig {
        role: "coder".to_string(),
        capabilities: vec!["code-generation".to_string(), "refactoring".to_string()],
        supported_task_types: vec!["implementation".to_string()],
        max_concurrent_tasks: 2,
        priority: 60,
        max_retries: 3,
    }
}

#[must_use]
pub fn reviewer() -> AgentTypeConfig {
    AgentTypeConfig {
        role: "reviewer".to_string(),
        capabilities: vec!["code-review".to_string(), "static-analysis".to_string()],
        supported_task_types: vec!["review".to_string()],
        max_concurrent_tasks: 2,
        priority: 70,
        max_retries: 2,
    }
}

#[must_use]
pub fn tester() -> AgentTypeConfig {
    AgentTypeConfig {
        role: "tester".to_string(),
        capabilities: vec!["test-execution".to_string(), "validation".to_string()],
        supported_task_types: vec!["testing".to_string()],
        max_concurrent_tasks: 2,
        priority: 55,
        max_retries: 2,
    }
}

/// Look up a preset by role name, matching the names `registerAgentTypes`
/// is expected to register under.
#[must_use]
pub fn by_role(role: &str) -> Option<AgentTypeConfig> {
    match role {
        "coordinator" => Some(coordinator()),
        "researcher" => Some(researcher()),
        "coder" => Some(coder()),
        "reviewer" => Some(reviewer()),
        "tester" => Some(tester()),
        _ => None,
    }
}
