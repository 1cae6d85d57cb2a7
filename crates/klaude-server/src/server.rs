use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use klaude_session::SessionLog;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::connection::{self, ConnectionRegistry};
use crate::error::ServerError;
use crate::wire::{self, WireEvent};

/// Shared application state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub log: Arc<SessionLog>,
    pub connections: Arc<ConnectionRegistry>,
    pub config: Arc<ServerConfig>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig, log: Arc<SessionLog>) -> Self {
        Self {
            log,
            connections: Arc::new(ConnectionRegistry::new()),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build the axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();
    let router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/session", get(session_handler))
        .route("/api/events", post(post_event_handler));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. The returned handle owns the server task.
pub async fn start(config: ServerConfig, log: Arc<SessionLog>) -> Result<ServerHandle, ServerError> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    let state = AppState::new(config, log);
    let shutdown = state.shutdown.clone();
    let router = build_router(state);

    info!(addr = %local_addr, "observer server started");

    let graceful = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(graceful.cancelled_owned())
            .await
        {
            warn!(error = %e, "observer server stopped with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        addr: local_addr,
        shutdown,
        server,
    })
}

/// Handle returned by [`start`].
pub struct ServerHandle {
    pub port: u16,
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Close every websocket and wait for the server task to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.server.await {
            warn!(error = %e, "observer server task failed");
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let heartbeat = state.config.heartbeat_interval();
    ws.on_upgrade(move |socket| {
        connection::handle_socket(socket, state.log, state.connections, heartbeat, state.shutdown)
    })
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "session_id": state.log.session_id(),
        "events": state.log.len(),
        "observers": state.log.observer_count(),
        "connections": state.connections.count(),
    }))
}

/// The same payload a websocket receives as `init`, for polling clients.
async fn session_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.log.snapshot();
    Json(wire::init_message(state.log.session_id(), &snapshot))
}

/// Append one event on behalf of an out-of-process producer.
async fn post_event_handler(State(state): State<AppState>, body: String) -> Response {
    let event = match wire::decode(&body) {
        Ok(event) => event,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": e.to_string(), "kind": e.kind()})),
            )
                .into_response()
        }
    };
    match state.log.append(event) {
        Ok(event) => Json(WireEvent::from(event.as_ref())).into_response(),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": e.to_string(), "kind": e.kind()})),
        )
            .into_response(),
    }
}
