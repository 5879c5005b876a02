//! Stub feed: a WebSocket server that plays the interceptor's side of the protocol.
//!
//! Holds pending messages by number, greets each client with `{kind:1}`, replays every pending
//! message on `{kind:2, request:"db"}`, pushes newly published messages live to every client,
//! and applies `{kind:3}` decisions by removing the message and broadcasting the verdict.
//! Used by `gatekeep stub-feed` and by the integration tests.

use crate::feed::protocol::{
    self, ControlFrame, InboundMessage, KIND_REQUEST, KIND_RESPONSE, SUBSCRIBE_REQUEST,
};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};

/// Verdict received from a client for a pending message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub message_id: u64,
    pub approved: bool,
}

#[derive(Clone)]
pub struct StubFeed {
    pending: Arc<RwLock<BTreeMap<u64, InboundMessage>>>,
    counter: Arc<AtomicU64>,
    /// Live pushes of newly published messages (encoded frames).
    live_tx: broadcast::Sender<String>,
    verdict_tx: broadcast::Sender<Verdict>,
}

impl Default for StubFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl StubFeed {
    pub fn new() -> Self {
        let (live_tx, _) = broadcast::channel(256);
        let (verdict_tx, _) = broadcast::channel(256);
        Self {
            pending: Arc::new(RwLock::new(BTreeMap::new())),
            counter: Arc::new(AtomicU64::new(0)),
            live_tx,
            verdict_tx,
        }
    }

    /// Intercept a message: number it, keep it pending, and push it to connected clients.
    /// Returns the assigned message number (starting at 1).
    pub async fn publish(
        &self,
        source: impl Into<String>,
        destination: impl Into<String>,
        payload: impl Into<String>,
    ) -> u64 {
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let msg = InboundMessage {
            id,
            source: source.into(),
            destination: destination.into(),
            payload: payload.into(),
        };
        let frame = protocol::encode_inbound(&msg);
        self.pending.write().await.insert(id, msg);
        match frame {
            // No receivers just means no client is connected yet; the db replay covers them.
            Ok(frame) => {
                let _ = self.live_tx.send(frame);
            }
            Err(e) => log::warn!("stub feed: message {} not pushed: {}", id, e),
        }
        log::debug!("stub feed published message {}", id);
        id
    }

    /// Subscribe to verdicts applied from now on.
    pub fn verdicts(&self) -> broadcast::Receiver<Verdict> {
        self.verdict_tx.subscribe()
    }

    pub async fn pending_ids(&self) -> Vec<u64> {
        self.pending.read().await.keys().copied().collect()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(health_http))
            .route("/ws", get(ws_handler))
            .with_state(self.clone())
    }

    /// Serve on `listener` until the task is dropped or the listener fails.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr().context("reading stub feed address")?;
        log::info!("stub feed listening on {}", addr);
        axum::serve(listener, self.router())
            .await
            .context("stub feed server exited")
    }

    /// Apply one decision. Unknown or already-decided numbers are ignored.
    async fn decide(&self, frame: &ControlFrame) {
        let Some(id) = frame
            .msg_number
            .as_deref()
            .and_then(|n| n.trim().parse::<u64>().ok())
        else {
            log::debug!("stub feed: decision without a valid msgNumber: {:?}", frame);
            return;
        };
        if self.pending.write().await.remove(&id).is_none() {
            log::debug!("stub feed: no pending message {} (unknown or already decided)", id);
            return;
        }
        let approved = frame.data.as_deref() == Some("1");
        log::info!(
            "stub feed: message {} {}",
            id,
            if approved { "accepted" } else { "rejected" }
        );
        let _ = self.verdict_tx.send(Verdict {
            message_id: id,
            approved,
        });
    }
}

/// GET / returns a health JSON (for probes).
async fn health_http(State(feed): State<StubFeed>) -> Json<serde_json::Value> {
    let pending = feed.pending.read().await.len();
    Json(json!({
        "runtime": "running",
        "pending": pending,
    }))
}

async fn ws_handler(State(feed): State<StubFeed>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, feed))
}

async fn handle_socket(mut socket: WebSocket, feed: StubFeed) {
    let session_id = uuid::Uuid::new_v4().to_string();
    log::debug!("stub feed session {} opened", session_id);
    let mut live_rx = feed.live_tx.subscribe();

    let hello = match protocol::encode_hello() {
        Ok(hello) => hello,
        Err(e) => {
            log::warn!("stub feed session {}: {}", session_id, e);
            return;
        }
    };
    if socket.send(Message::Text(hello)).await.is_err() {
        return;
    }

    'session: loop {
        tokio::select! {
            live = live_rx.recv() => {
                match live {
                    Ok(frame) => {
                        if socket.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("stub feed session {} lagged {} messages", session_id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(frame) = serde_json::from_str::<ControlFrame>(&text) else {
                    log::debug!("stub feed session {}: ignoring frame {}", session_id, text);
                    continue;
                };
                match frame.kind {
                    KIND_REQUEST if frame.request.as_deref() == Some(SUBSCRIBE_REQUEST) => {
                        let replay: Vec<String> = feed
                            .pending
                            .read()
                            .await
                            .values()
                            .filter_map(|msg| match protocol::encode_inbound(msg) {
                                Ok(frame) => Some(frame),
                                Err(e) => {
                                    log::warn!("stub feed: message {} not replayed: {}", msg.id, e);
                                    None
                                }
                            })
                            .collect();
                        log::debug!("stub feed session {}: replaying {} messages", session_id, replay.len());
                        for frame in replay {
                            if socket.send(Message::Text(frame)).await.is_err() {
                                break 'session;
                            }
                        }
                    }
                    KIND_RESPONSE => feed.decide(&frame).await,
                    _ => log::debug!("stub feed session {}: ignoring {:?}", session_id, frame),
                }
            }
        }
    }
    log::debug!("stub feed session {} closed", session_id);
}
