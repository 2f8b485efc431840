//! End-to-end tests against a real listener and WebSocket clients.

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::models::{Post, ThreadId};
use crate::test_helpers::test_app_state;
use crate::{AppState, build_router};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn boot_server() -> (SocketAddr, AppState) {
    let state = test_app_state();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

/// Connect to a thread and return the socket plus its announced token.
async fn join(addr: SocketAddr, thread: i64) -> (WsStream, String) {
    let url = format!("ws://{addr}/api/boards/b/threads/{thread}");
    let (mut ws, _) = connect_async(url).await.unwrap();
    let announce = next_json(&mut ws).await;
    let token = announce["guid"].as_str().unwrap().to_string();
    (ws, token)
}

async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn assert_quiet(ws: &mut WsStream) {
    if let Ok(Some(Ok(msg))) = timeout(QUIET, ws.next()).await {
        panic!("expected no frame, got {msg:?}");
    }
}

async fn submit(ws: &mut WsStream, token: Option<&str>, content: &str) {
    let frame = json!({ "guid": token, "post": { "content": content } }).to_string();
    ws.send(Message::Text(frame.into())).await.unwrap();
}

async fn wait_for_connections(state: &AppState, thread: i64, expected: usize) {
    timeout(TIMEOUT, async {
        while state.live.registry.snapshot(ThreadId(thread)).len() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry did not settle");
}

#[tokio::test]
async fn first_frame_is_a_verifiable_token() {
    let (addr, state) = boot_server().await;
    let (_ws, token) = join(addr, 7).await;

    let connection_id = state.live.tokens.verify(&token).unwrap();
    let registered = state.live.registry.snapshot(ThreadId(7));
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].id().as_str(), connection_id);
}

#[tokio::test]
async fn submission_is_broadcast_to_every_connection_in_the_thread() {
    let (addr, _state) = boot_server().await;
    let (mut a, token_a) = join(addr, 7).await;
    let (mut b, _) = join(addr, 7).await;
    let (mut other, _) = join(addr, 8).await;

    submit(&mut a, Some(&token_a), "hi").await;

    let to_a: Post = serde_json::from_value(next_json(&mut a).await).unwrap();
    let to_b: Post = serde_json::from_value(next_json(&mut b).await).unwrap();
    assert_eq!(to_a, to_b);
    assert_eq!(to_a.content.as_deref(), Some("hi"));
    assert_eq!(to_a.thread_id, ThreadId(7));

    assert_quiet(&mut a).await;
    assert_quiet(&mut other).await;
}

#[tokio::test]
async fn empty_post_error_reaches_only_the_submitter() {
    let (addr, _state) = boot_server().await;
    let (mut a, token_a) = join(addr, 7).await;
    let (mut b, _) = join(addr, 7).await;

    submit(&mut a, Some(&token_a), "").await;

    assert_eq!(next_json(&mut a).await, json!({ "message": "Post was empty" }));
    assert_quiet(&mut b).await;

    // The connection stays usable after a rejected submission.
    submit(&mut a, Some(&token_a), "second try").await;
    assert_eq!(next_json(&mut a).await["content"], "second try");
    assert_eq!(next_json(&mut b).await["content"], "second try");
}

#[tokio::test]
async fn malformed_and_binary_frames_are_skipped() {
    let (addr, state) = boot_server().await;
    let (mut a, token_a) = join(addr, 7).await;

    a.send(Message::Text("{not json".into())).await.unwrap();
    a.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
    submit(&mut a, Some(&token_a), "still here").await;

    assert_eq!(next_json(&mut a).await["content"], "still here");
    assert_eq!(state.metrics.snapshot().frames.rejected, 2);
}

#[tokio::test]
async fn disconnected_peer_no_longer_receives() {
    let (addr, state) = boot_server().await;
    let (mut a, _) = join(addr, 7).await;
    let (mut b, token_b) = join(addr, 7).await;

    a.close(None).await.unwrap();
    wait_for_connections(&state, 7, 1).await;

    submit(&mut b, Some(&token_b), "after a left").await;
    assert_eq!(next_json(&mut b).await["content"], "after a left");

    drop(b);
    wait_for_connections(&state, 7, 0).await;
    assert!(!state.live.registry.contains_thread(ThreadId(7)));
}

#[tokio::test]
async fn shutdown_closes_sessions_normally() {
    let (addr, state) = boot_server().await;
    let (mut a, _) = join(addr, 7).await;

    state.shutdown.cancel();

    let msg = timeout(TIMEOUT, a.next()).await.unwrap().unwrap().unwrap();
    match msg {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Normal);
            assert_eq!(frame.reason.as_str(), "Closing");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
    wait_for_connections(&state, 7, 0).await;
}

#[tokio::test]
async fn malformed_target_is_not_upgraded() {
    let (addr, state) = boot_server().await;
    let url = format!("ws://{addr}/api/boards/b/threads/nope");
    assert!(connect_async(url).await.is_err());
    assert_eq!(state.live.registry.thread_count(), 0);
    assert_eq!(state.metrics.snapshot().connections.total, 0);
}
