//! Newline-delimited JSON-RPC 2.0 over stdin/stdout, grounded in the
//! teacher's `adapters/mcp/stdio_server.rs`. Protocol traffic is on
//! stdout; diagnostics go to `tracing` (which the caller routes to
//! stderr), never interleaved with protocol frames.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::dispatcher::Dispatcher;
use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

pub struct StdioServer {
    dispatcher: Arc<Dispatcher>,
}

impl StdioServer {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        tracing::info!("mcp stdio server started");

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(line).await {
                let mut bytes = serde_json::to_vec(&response)?;
                bytes.push(b'\n');
                stdout.write_all(&bytes).await?;
                stdout.flush().await?;
            }
        }

        tracing::info!("mcp stdio server stopped");
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    None,
                    JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("parse error: {e}")),
                ))
            }
        };
        self.dispatcher.handle(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentPool;
    use crate::events::EventBus;
    use crate::tasks::{TaskOrchestrator, TaskRegistry};

    fn server() -> StdioServer {
        let events = Arc::new(EventBus::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(TaskOrchestrator::new(
                Arc::new(TaskRegistry::new(events.clone())),
                Arc::new(AgentPool::new(10, events.clone())),
                events.clone(),
            )),
            Arc::new(AgentPool::new(10, events)),
        ));
        StdioServer::new(dispatcher)
    }

    #[tokio::test]
    async fn malformed_json_produces_a_parse_error_response() {
        let server = server();
        let response = server.handle_line("not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::PARSE_ERROR);
    }

    #[tokio::test]
    async fn notification_line_produces_no_response() {
        let server = server();
        let response = server.handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn initialize_request_reports_server_info() {
        let server = server();
        let response = server.handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#).await.unwrap();
        assert_eq!(response.result.unwrap()["serverInfo"]["name"], "claude-flow");
    }
}
