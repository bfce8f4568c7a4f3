//! HTTP/WebSocket MCP transport, grounded in the teacher's
//! `infrastructure/mcp/http_server.rs` and extended per this system's own
//! spec with `/health`, `/info`, and a `/ws` upgrade route, bearer auth,
//! and a deny-by-default CORS layer.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use super::auth::{parse_bearer, AuthConfig};
use super::cors::CorsConfig;
use super::dispatcher::Dispatcher;
use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    auth: Arc<AuthConfig>,
}

pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
    auth: Arc<AuthConfig>,
    cors: CorsConfig,
}

impl HttpServer {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, auth: AuthConfig, cors: CorsConfig) -> Self {
        Self { dispatcher, auth: Arc::new(auth), cors }
    }

    #[must_use]
    pub fn router(&self) -> Router {
        let state = AppState { dispatcher: self.dispatcher.clone(), auth: self.auth.clone() };
        Router::new()
            .route("/", post(handle_rpc))
            .route("/health", get(handle_health))
            .route("/info", get(handle_info))
            .route("/ws", get(handle_ws_upgrade))
            .layer(self.cors.to_layer())
            .with_state(state)
    }

    pub async fn serve(&self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "mcp http server listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let token = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()).and_then(parse_bearer);
    if state.auth.authorize(token) {
        Ok(())
    } else {
        let body = JsonRpcResponse::failure(None, JsonRpcError::new(JsonRpcError::UNAUTHORIZED, "unauthorized"));
        Err((StatusCode::UNAUTHORIZED, Json(body)).into_response())
    }
}

async fn handle_rpc(State(state): State<AppState>, headers: HeaderMap, Json(request): Json<JsonRpcRequest>) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    match state.dispatcher.handle(request).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_info() -> Json<serde_json::Value> {
    Json(json!({ "name": "claude-flow", "version": env!("CARGO_PKG_VERSION") }))
}

async fn handle_ws_upgrade(State(state): State<AppState>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: AppState) {
    while let Some(Ok(message)) = socket.recv().await {
        let WsMessage::Text(text) = message else { continue };
        let reply = match serde_json::from_str::<JsonRpcRequest>(&text) {
            Ok(request) => state.dispatcher.handle(request).await,
            Err(e) => Some(JsonRpcResponse::failure(
                None,
                JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("parse error: {e}")),
            )),
        };
        if let Some(reply) = reply {
            let Ok(payload) = serde_json::to_string(&reply) else { continue };
            if socket.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
    }
}
