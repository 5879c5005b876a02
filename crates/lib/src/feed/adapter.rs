//! Connection adapter: one WebSocket connection to the feed, turned into an ordered stream of
//! `FeedEvent`s plus a fire-and-forget `FeedSender`.
//!
//! The adapter subscribes on open and never reconnects; `FeedEvent::Close` is always the last
//! event it emits.

use crate::feed::protocol;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Close code reported when the connection ended without a close handshake.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported when the peer's close frame carried no status.
pub const NO_STATUS: u16 = 1005;
const NORMAL_CLOSURE: u16 = 1000;

/// Lifecycle and data events of one feed connection, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Connected and subscription request sent.
    Open,
    /// One raw text frame from the feed.
    Message(String),
    Close(CloseInfo),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseInfo {
    pub fn abnormal() -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
            was_clean: false,
        }
    }

    fn from_frame(frame: Option<CloseFrame<'_>>) -> Self {
        match frame {
            Some(f) => Self {
                code: u16::from(f.code),
                reason: f.reason.into_owned(),
                was_clean: true,
            },
            None => Self {
                code: NO_STATUS,
                reason: String::new(),
                was_clean: true,
            },
        }
    }
}

/// Outbound half. Cloneable; sends never wait and are not acknowledged.
#[derive(Debug, Clone)]
pub struct FeedSender {
    tx: mpsc::UnboundedSender<String>,
}

impl FeedSender {
    /// Sender and the receiving end the adapter drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a text frame. Fails only when the connection task is gone.
    pub fn send(&self, payload: String) -> Result<(), crate::error::ReviewError> {
        self.tx
            .send(payload)
            .map_err(|_| crate::error::ReviewError::TransportClosed)
    }
}

/// A running connection: events to consume, sender for decisions, and the pump task.
pub struct FeedHandle {
    pub events: mpsc::UnboundedReceiver<FeedEvent>,
    pub sender: FeedSender,
    pub task: JoinHandle<()>,
}

#[derive(Debug, Clone)]
pub struct FeedAdapter {
    url: String,
}

impl FeedAdapter {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn the connection on the current tokio runtime.
    pub fn spawn(self) -> FeedHandle {
        let (sender, outbound) = FeedSender::channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            self.run(outbound, events_tx).await;
        });
        FeedHandle {
            events,
            sender,
            task,
        }
    }

    /// Connect, subscribe, and pump frames both ways until the connection closes. Returns after
    /// emitting `FeedEvent::Close`, or early if nobody listens to events anymore.
    pub async fn run(
        self,
        mut outbound: mpsc::UnboundedReceiver<String>,
        events: mpsc::UnboundedSender<FeedEvent>,
    ) {
        let ws = match tokio_tungstenite::connect_async(&self.url).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                log::warn!("feed connect to {} failed: {}", self.url, e);
                let _ = events.send(FeedEvent::Error(e.to_string()));
                let _ = events.send(FeedEvent::Close(CloseInfo::abnormal()));
                return;
            }
        };
        let (mut sink, mut stream) = ws.split();

        let subscribed = match protocol::encode_subscribe() {
            Ok(frame) => sink.send(Message::Text(frame)).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = subscribed {
            log::warn!("feed subscribe failed: {}", e);
            let _ = events.send(FeedEvent::Error(e));
            let _ = events.send(FeedEvent::Close(CloseInfo::abnormal()));
            return;
        }
        log::info!("feed connected to {}", self.url);
        if events.send(FeedEvent::Open).is_err() {
            return;
        }

        loop {
            tokio::select! {
                out = outbound.recv() => {
                    let Some(payload) = out else {
                        log::debug!("feed sender dropped, closing connection");
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client done".into(),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        let _ = events.send(FeedEvent::Close(CloseInfo {
                            code: NORMAL_CLOSURE,
                            reason: "client done".to_string(),
                            was_clean: true,
                        }));
                        return;
                    };
                    log::debug!("feed send: {}", payload);
                    if let Err(e) = sink.send(Message::Text(payload)).await {
                        // The read side reports how the connection ended.
                        log::warn!("feed send failed: {}", e);
                        if events.send(FeedEvent::Error(e.to_string())).is_err() {
                            return;
                        }
                    }
                }
                msg = stream.next() => {
                    let event = match msg {
                        Some(Ok(Message::Text(text))) => FeedEvent::Message(text),
                        Some(Ok(Message::Binary(bytes))) => {
                            FeedEvent::Message(String::from_utf8_lossy(&bytes).into_owned())
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let info = CloseInfo::from_frame(frame);
                            log::info!("feed closed by peer: {} {}", info.code, info.reason);
                            let _ = events.send(FeedEvent::Close(info));
                            return;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            log::warn!("feed connection error: {}", e);
                            let _ = events.send(FeedEvent::Error(e.to_string()));
                            let _ = events.send(FeedEvent::Close(CloseInfo::abnormal()));
                            return;
                        }
                        None => {
                            log::info!("feed stream ended without close handshake");
                            let _ = events.send(FeedEvent::Close(CloseInfo::abnormal()));
                            return;
                        }
                    };
                    if events.send(event).is_err() {
                        log::debug!("feed event receiver dropped, stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frame_maps_code_and_reason() {
        let info = CloseInfo::from_frame(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "bye".into(),
        }));
        assert_eq!(
            info,
            CloseInfo {
                code: 1001,
                reason: "bye".to_string(),
                was_clean: true,
            }
        );
    }

    #[test]
    fn close_without_status_is_clean_1005() {
        let info = CloseInfo::from_frame(None);
        assert_eq!(info.code, NO_STATUS);
        assert!(info.was_clean);
    }

    #[test]
    fn sender_fails_once_receiver_is_gone() {
        let (sender, rx) = FeedSender::channel();
        assert!(sender.send("x".into()).is_ok());
        drop(rx);
        assert_eq!(
            sender.send("y".into()),
            Err(crate::error::ReviewError::TransportClosed)
        );
    }

    #[tokio::test]
    async fn unreachable_feed_reports_error_then_abnormal_close() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let mut handle = FeedAdapter::new(format!("ws://127.0.0.1:{}/ws", port)).spawn();
        assert!(matches!(handle.events.recv().await, Some(FeedEvent::Error(_))));
        assert_eq!(
            handle.events.recv().await,
            Some(FeedEvent::Close(CloseInfo::abnormal()))
        );
    }
}
