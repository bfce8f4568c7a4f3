//! Orchestration core entry point: load configuration, assemble the
//! kernel, and serve MCP over whichever transport the configuration
//! names. No CLI surface beyond that — orchestration is driven entirely
//! through MCP tool calls once the process is up.

use claude_flow_core::config::{ConfigLoader, McpTransport};
use claude_flow_core::mcp::{AuthConfig, CorsConfig, HttpServer, StdioServer};
use claude_flow_core::Kernel;
use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    let (config, config_errors) = ConfigLoader::load(&cwd).context("failed to load configuration")?;
    for error in &config_errors {
        tracing::warn!(%error, "configuration validation issue");
    }

    let kernel = Kernel::new(config).await;
    kernel.start().await.context("failed to start kernel")?;

    let dispatcher = kernel.dispatcher();
    let transport = kernel
        .config
        .mcp_servers
        .first()
        .and_then(|server| McpTransport::parse_str(&server.transport))
        .unwrap_or(McpTransport::Stdio);

    let serve_result = match transport {
        McpTransport::Stdio => StdioServer::new(dispatcher).run().await,
        McpTransport::Http | McpTransport::Websocket => {
            let port = kernel.config.mcp_servers.first().and_then(|s| s.port).unwrap_or(3000);
            let addr = format!("127.0.0.1:{port}");
            let auth = auth_from_env();
            HttpServer::new(dispatcher, auth, CorsConfig::default()).serve(&addr).await
        }
    };

    if let Err(err) = serve_result {
        tracing::error!(%err, "mcp transport exited with an error");
    }

    kernel.shutdown().await.context("failed to shut down kernel cleanly")?;
    Ok(())
}

/// `CLAUDE_FLOW_MCP_TOKENS` is a comma-separated allow-list; absent or empty
/// runs the HTTP/WS transport in development (authorize-everything) mode.
fn auth_from_env() -> AuthConfig {
    let tokens: Vec<String> = std::env::var("CLAUDE_FLOW_MCP_TOKENS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        AuthConfig::development()
    } else {
        AuthConfig::new(tokens)
    }
}
