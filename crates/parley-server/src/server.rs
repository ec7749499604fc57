//! Axum HTTP + WebSocket server for the chat relay.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use parley_core::{ChatAddr, ServerEvent};
use parley_store::{Database, MessageRepo};

use crate::client::ClientRegistry;
use crate::handlers;

/// Marker that grants a connection the privileged roster view when it
/// appears anywhere in the upgrade request target. Client-controlled — this
/// is not an authorization check.
const ADMIN_MARKER: &str = "admin";

/// Server configuration.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ClientRegistry>,
    pub repo: Arc<MessageRepo>,
}

/// Build the Axum router with all routes.
///
/// The WebSocket upgrade accepts any request target (the original relay did
/// not route by path; clients connect with targets like `/chat` or
/// `/admin`), so the upgrade handler is mounted on `/` and a catch-all.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(ws_handler))
        .route("/{*target}", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle holding the bound port.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ClientRegistry::new(config.max_send_queue));
    let repo = Arc::new(MessageRepo::new(db));

    let state = AppState {
        registry: Arc::clone(&registry),
        repo,
    };

    let router = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(port = local_addr.port(), "chat relay listening");

    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        registry,
        _server: server,
    })
}

/// Handle returned by [`start`] — keeps the accept loop alive.
pub struct ServerHandle {
    pub port: u16,
    registry: Arc<ClientRegistry>,
    _server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Number of currently registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    uri: Uri,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let addr = ChatAddr::from_peer(&peer);
    let is_admin = uri.to_string().contains(ADMIN_MARKER);
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr, is_admin))
}

/// Run one connection from registration to teardown.
async fn handle_socket(socket: WebSocket, state: AppState, addr: ChatAddr, is_admin: bool) {
    let (client, mut rx) = state.registry.register(addr.clone(), is_admin);
    info!(conn_id = %client.conn_id, addr = %addr, is_admin, "client connected");

    // Welcome, then history, then (for a privileged connection) the roster.
    // The outbound queue preserves this order.
    client.send(&ServerEvent::Welcome {
        ip: addr.to_string(),
    });

    match state.repo.history(&addr) {
        Ok(messages) => {
            client.send(&ServerEvent::History { messages });
        }
        // The connection proceeds without a history event.
        Err(err) => error!(addr = %addr, error = %err, "failed to fetch history"),
    }

    if is_admin {
        state.registry.send_to_admins(&ServerEvent::ActiveChats {
            active_chats: state.registry.roster(),
        });
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: drain the outbound queue into the socket.
    let writer = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: each inbound frame is one serialized processing step, so
    // a single connection's frames keep arrival order.
    while let Some(Ok(frame)) = ws_rx.next().await {
        match frame {
            WsMessage::Text(text) => {
                handlers::process_frame(&state.registry, &state.repo, &addr, text.as_str());
            }
            WsMessage::Close(_) => break,
            // Binary and ping/pong frames are not chat payloads.
            _ => {}
        }
    }

    // Deregister the address unconditionally, even if the slot has been
    // taken over by a newer connection from the same address.
    state.registry.deregister(&addr);
    info!(conn_id = %client.conn_id, addr = %addr, "client disconnected");

    writer.abort();
}

/// Liveness snapshot returned by `GET /health`.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
}

/// GET /health — operator-facing liveness check.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.registry.count(),
    })
}
