//! Integration tests: a review session driven by a real WebSocket connection, against the stub
//! feed and against bare tungstenite servers for close handling.

use futures_util::{SinkExt, StreamExt};
use lib::feed::{protocol, FeedAdapter, FeedEvent, FeedHandle, StubFeed, Verdict};
use lib::review::{Cell, ReviewSession, RowAction, RowHandle, RowView, SessionState, TableView, STATUS_COLUMN};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

async fn start_stub() -> (StubFeed, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    let feed = StubFeed::new();
    let server = feed.clone();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    (feed, format!("127.0.0.1:{}", port))
}

async fn next_event(handle: &mut FeedHandle) -> FeedEvent {
    tokio::time::timeout(Duration::from_secs(5), handle.events.recv())
        .await
        .expect("event within 5s")
        .expect("event stream open")
}

/// Feed events into the session until `done` holds or the connection closes.
async fn pump_until(
    handle: &mut FeedHandle,
    session: &mut ReviewSession<TableView>,
    done: impl Fn(&ReviewSession<TableView>) -> bool,
) {
    while !done(session) {
        let ev = next_event(handle).await;
        let closed = matches!(ev, FeedEvent::Close(_));
        session.handle_event(ev);
        if closed {
            break;
        }
    }
}

/// Pump until the stub's hello arrives; the stub is subscribed to live pushes from then on.
async fn pump_until_hello(handle: &mut FeedHandle, session: &mut ReviewSession<TableView>) {
    loop {
        let ev = next_event(handle).await;
        let hello = protocol::encode_hello().expect("encode hello");
        let is_hello = matches!(&ev, FeedEvent::Message(t) if t == &hello);
        session.handle_event(ev);
        if is_hello {
            return;
        }
    }
}

#[tokio::test]
async fn stub_health_reports_pending_count() {
    let (feed, addr) = start_stub().await;
    feed.publish("8001", "8002", "ping").await;

    let url = format!("http://{}/", addr);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("pending").and_then(|v| v.as_u64()), Some(1));
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("GET {} did not return health JSON within 5s; last error: {:?}", url, last_err);
}

#[tokio::test]
async fn subscribe_replays_pending_and_decision_reaches_feed() {
    let (feed, addr) = start_stub().await;
    let id = feed.publish("A", "B", "x").await;
    let mut verdicts = feed.verdicts();

    let mut handle = FeedAdapter::new(format!("ws://{}/ws", addr)).spawn();
    let mut session = ReviewSession::new(TableView::new(), handle.sender.clone());
    pump_until(&mut handle, &mut session, |s| s.view().row_count() == 1).await;

    assert_eq!(session.state(), SessionState::Open);
    let row = session.view().row(RowHandle::new(0)).map(|r| r.to_vec());
    assert_eq!(
        row,
        Some(vec![
            Cell::Number(id),
            Cell::Text("A".into()),
            Cell::Text("B".into()),
            Cell::Text("x".into()),
            Cell::Controls,
        ])
    );

    let decision = session
        .handle_action(RowAction {
            handle: RowHandle::new(0),
            approved: true,
        })
        .expect("decision sent");
    assert_eq!(decision.message_id, id);

    let verdict = tokio::time::timeout(Duration::from_secs(5), verdicts.recv())
        .await
        .expect("verdict within 5s")
        .expect("verdict");
    assert_eq!(
        verdict,
        Verdict {
            message_id: id,
            approved: true
        }
    );
    assert!(feed.pending_ids().await.is_empty());
    assert_eq!(
        session.view().row(RowHandle::new(0)).map(|r| r[STATUS_COLUMN].clone()),
        Some(Cell::Verdict(true))
    );
}

#[tokio::test]
async fn live_push_then_replay_is_deduplicated() {
    let (feed, addr) = start_stub().await;
    let mut handle = FeedAdapter::new(format!("ws://{}/ws", addr)).spawn();
    let mut session = ReviewSession::new(TableView::new(), handle.sender.clone());
    pump_until_hello(&mut handle, &mut session).await;

    feed.publish("A", "B", "one").await;
    feed.publish("A", "C", "two").await;
    pump_until(&mut handle, &mut session, |s| s.view().row_count() == 2).await;

    // A second subscription makes the feed replay both pending messages again.
    handle
        .sender
        .send(protocol::encode_subscribe().expect("encode subscribe"))
        .expect("send subscribe");
    let third = feed.publish("A", "D", "three").await;
    pump_until(&mut handle, &mut session, |s| s.registry().has_seen(third)).await;

    assert_eq!(session.view().row_count(), 3);
    assert_eq!(session.registry().bound_count(), 3);
}

#[tokio::test]
async fn reject_removes_message_from_feed() {
    let (feed, addr) = start_stub().await;
    let first = feed.publish("A", "B", "keep").await;
    let second = feed.publish("A", "B", "drop").await;
    let mut verdicts = feed.verdicts();

    let mut handle = FeedAdapter::new(format!("ws://{}/ws", addr)).spawn();
    let mut session = ReviewSession::new(TableView::new(), handle.sender.clone());
    pump_until(&mut handle, &mut session, |s| s.view().row_count() == 2).await;

    let target = session
        .view()
        .rows()
        .find(|(_, cells)| cells.first() == Some(&Cell::Number(second)))
        .map(|(h, _)| h)
        .expect("row for second message");
    session
        .handle_action(RowAction {
            handle: target,
            approved: false,
        })
        .expect("decision sent");

    let verdict = tokio::time::timeout(Duration::from_secs(5), verdicts.recv())
        .await
        .expect("verdict within 5s")
        .expect("verdict");
    assert_eq!(
        verdict,
        Verdict {
            message_id: second,
            approved: false
        }
    );
    assert_eq!(feed.pending_ids().await, vec![first]);
}

#[tokio::test]
async fn dropped_connection_is_unclean_1006() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        let first = ws.next().await.expect("frame").expect("ok frame");
        let subscribe = protocol::encode_subscribe().expect("encode subscribe");
        assert_eq!(first, Message::Text(subscribe));
        // Drop the TCP stream without a close handshake.
        drop(ws);
    });

    let mut handle = FeedAdapter::new(format!("ws://127.0.0.1:{}/ws", port)).spawn();
    let mut session = ReviewSession::new(TableView::new(), handle.sender.clone());
    // Stop at the first Closed state, as the terminal console does.
    while session.state() != SessionState::Closed {
        let ev = next_event(&mut handle).await;
        session.handle_event(ev);
    }

    assert!(session.status().starts_with("Connection lost."), "status: {}", session.status());
    assert!(session.status().contains("1006"));
    assert!(session
        .handle_action(RowAction {
            handle: RowHandle::new(0),
            approved: true
        })
        .is_err());
}

#[tokio::test]
async fn peer_close_frame_is_clean() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        let _ = ws.next().await;
        let _ = ws
            .send(Message::Text(
                r#"{"msgNumber":"12","src":"A","dst":"B","payload":"late"}"#.to_string(),
            ))
            .await;
        let _ = ws
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "interceptor stopped".into(),
            })))
            .await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut handle = FeedAdapter::new(format!("ws://127.0.0.1:{}/ws", port)).spawn();
    let mut session = ReviewSession::new(TableView::new(), handle.sender.clone());
    pump_until(&mut handle, &mut session, |s| s.state() == SessionState::Closed).await;

    assert_eq!(session.view().row_count(), 1);
    assert!(session.registry().has_seen(12));
    assert_eq!(
        session.status(),
        "Connection closed cleanly. Code: 1000 reason: interceptor stopped"
    );
}
