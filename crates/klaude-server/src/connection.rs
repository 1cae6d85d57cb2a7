//! One websocket observer: replay on connect, then the live feed.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use klaude_core::ObserverId;
use klaude_session::{ObserverDeliveryFailure, SessionLog};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::wire;

pub const OVERFLOW_CLOSE_REASON: &str = "observer queue overflow; reconnect for replay";
pub const SHUTDOWN_CLOSE_REASON: &str = "server shutting down";

#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    pub connected_at: DateTime<Utc>,
    pub replayed: usize,
}

/// Websocket connections currently attached to the log.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ObserverId, ConnectionInfo>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ObserverId, replayed: usize) {
        self.connections.insert(
            id,
            ConnectionInfo {
                connected_at: Utc::now(),
                replayed,
            },
        );
    }

    pub fn unregister(&self, id: &ObserverId) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn get(&self, id: &ObserverId) -> Option<ConnectionInfo> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

/// Why the pump loop stopped.
enum Exit {
    ClientGone,
    Overflow,
    Shutdown,
}

/// Attach to the log, send `init`, then forward live events until either side goes away.
pub async fn handle_socket(
    socket: WebSocket,
    log: Arc<SessionLog>,
    registry: Arc<ConnectionRegistry>,
    heartbeat: Duration,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (replay, mut channel) = log.attach();
    let observer_id = channel.id().clone();
    registry.register(observer_id.clone(), replay.len());
    info!(observer_id = %observer_id, replayed = replay.len(), "websocket observer connected");

    let init = wire::init_message(log.session_id(), &replay);
    drop(replay);

    let exit = if ws_tx.send(WsMessage::Text(init.to_string().into())).await.is_err() {
        Exit::ClientGone
    } else {
        let mut ping = tokio::time::interval(heartbeat);
        ping.tick().await;

        loop {
            tokio::select! {
                event = channel.recv() => {
                    let Some(event) = event else {
                        break match channel.failure() {
                            Some(ObserverDeliveryFailure::Overflow) => Exit::Overflow,
                            _ => Exit::ClientGone,
                        };
                    };
                    let text = match wire::encode(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(event_id = %event.id, error = %e, "failed to encode event");
                            continue;
                        }
                    };
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break Exit::ClientGone;
                    }
                }
                incoming = ws_rx.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break Exit::ClientGone,
                        Some(Ok(WsMessage::Pong(_))) => trace!(observer_id = %observer_id, "pong"),
                        Some(Ok(WsMessage::Text(text))) => {
                            debug!(observer_id = %observer_id, len = text.len(), "ignoring inbound text");
                        }
                        Some(Ok(_)) => {}
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break Exit::ClientGone;
                    }
                }
                () = shutdown.cancelled() => break Exit::Shutdown,
            }
        }
    };

    let close = match exit {
        Exit::Overflow => Some((close_code::AGAIN, OVERFLOW_CLOSE_REASON)),
        Exit::Shutdown => Some((close_code::AWAY, SHUTDOWN_CLOSE_REASON)),
        Exit::ClientGone => None,
    };
    if let Some((code, reason)) = close {
        info!(observer_id = %observer_id, reason, "closing websocket");
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = ws_tx.send(WsMessage::Close(Some(frame))).await;
    }

    log.detach(&observer_id);
    registry.unregister(&observer_id);
    info!(observer_id = %observer_id, "websocket observer disconnected");
}
