//! External interfaces: JSON-RPC 2.0 over stdio, HTTP, or WebSocket, per
//! §6's external-interfaces contract.

mod auth;
mod cors;
mod dispatcher;
mod error;
mod http;
mod stdio;
mod types;

pub use auth::AuthConfig;
pub use cors::CorsConfig;
pub use dispatcher::Dispatcher;
pub use error::to_json_rpc_error;
pub use http::HttpServer;
pub use stdio::StdioServer;
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
