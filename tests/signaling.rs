//! End-to-end signaling tests against a live server

use anzen_signaling::auth::{AuthGate, BcryptHasher};
use anzen_signaling::config::Config;
use anzen_signaling::state::AppState;
use anzen_signaling::store::{LmdbRoomStore, RoomStore};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const PASSWORD: &str = "correct horse";

async fn setup_test_server(config: Config) -> String {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LmdbRoomStore::open(dir.path()).unwrap());
    let auth = AuthGate::prepare(Arc::new(BcryptHasher::new(4).unwrap()))
        .await
        .unwrap();
    store
        .create("alpha", &auth.hash(PASSWORD).await.unwrap())
        .await
        .unwrap();

    let state = Arc::new(AppState::new(config, store, auth));
    let app = anzen_signaling::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Store directory lives as long as the server
        let _dir = dir;
        axum::serve(listener, app).await.unwrap();
    });

    addr.to_string()
}

async fn default_server() -> String {
    setup_test_server(Config::default()).await
}

async fn connect(addr: &str, room: &str) -> Ws {
    let url = format!("ws://{}/ws/{}", addr, room);
    let (ws, _) = connect_async(&url).await.expect("Failed to connect");
    ws
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

async fn next_frame(ws: &mut Ws) -> Message {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timeout waiting for frame")
            .expect("Stream ended")
            .expect("Read failed");
        match frame {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

async fn recv_json(ws: &mut Ws) -> Value {
    match next_frame(ws).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected text frame, got {:?}", other),
    }
}

/// Expects `error` followed by a close frame; returns (message, close code).
async fn recv_rejection(ws: &mut Ws) -> (String, u16) {
    let error = recv_json(ws).await;
    assert_eq!(error["type"], "error");
    let message = error["message"].as_str().unwrap().to_string();

    match next_frame(ws).await {
        Message::Close(Some(frame)) => (message, u16::from(frame.code)),
        other => panic!("expected close frame, got {:?}", other),
    }
}

async fn expect_silence(ws: &mut Ws) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "unexpected frame: {:?}", result);
}

async fn join_as(addr: &str, room: &str, peer_id: &str, username: &str, password: &str) -> Ws {
    let mut ws = connect(addr, room).await;
    send_json(
        &mut ws,
        json!({
            "type": "join",
            "password": password,
            "peerId": peer_id,
            "username": username,
            "avatarSeed": format!("seed-{}", peer_id),
        }),
    )
    .await;
    ws
}

async fn join(addr: &str, peer_id: &str, username: &str) -> (Ws, Value) {
    let mut ws = join_as(addr, "alpha", peer_id, username, PASSWORD).await;
    let joined = recv_json(&mut ws).await;
    assert_eq!(joined["type"], "joined", "join failed: {}", joined);
    (ws, joined)
}

#[tokio::test]
async fn test_end_to_end_room_scenario() {
    let addr = default_server().await;

    let (mut a, joined) = join(&addr, "A", "Alice").await;
    assert_eq!(joined, json!({"type": "joined", "peers": []}));

    let (mut b, joined) = join(&addr, "B", "Bob").await;
    assert_eq!(
        joined,
        json!({
            "type": "joined",
            "peers": [{"peerId": "A", "username": "Alice", "avatarSeed": "seed-A"}],
        })
    );
    assert_eq!(
        recv_json(&mut a).await,
        json!({"type": "peer-joined", "peerId": "B", "username": "Bob", "avatarSeed": "seed-B"})
    );

    send_json(&mut b, json!({"type": "offer", "to": "A", "sdp": "s"})).await;
    let offer = recv_json(&mut a).await;
    assert_eq!(offer["type"], "offer");
    assert_eq!(offer["from"], "B");
    assert_eq!(offer["sdp"], "s");

    b.close(None).await.unwrap();
    assert_eq!(
        recv_json(&mut a).await,
        json!({"type": "peer-left", "peerId": "B"})
    );

    let (_c, joined) = join(&addr, "C", "Carol").await;
    let peers = joined["peers"].as_array().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0]["peerId"], "A");

    let announced = recv_json(&mut a).await;
    assert_eq!(announced["type"], "peer-joined");
    assert_eq!(announced["peerId"], "C");
}

#[tokio::test]
async fn test_relay_fidelity_and_silent_miss() {
    let addr = default_server().await;
    let (mut a, _) = join(&addr, "A", "Alice").await;
    let (mut b, _) = join(&addr, "B", "Bob").await;
    recv_json(&mut a).await; // peer-joined B

    send_json(
        &mut b,
        json!({
            "type": "answer",
            "to": "A",
            "from": "spoofed",
            "sdp": "xyz",
            "extra": {"opaque": [1, 2, 3]},
        }),
    )
    .await;
    assert_eq!(
        recv_json(&mut a).await,
        json!({
            "type": "answer",
            "to": "A",
            "from": "B",
            "username": "Bob",
            "avatarSeed": "seed-B",
            "sdp": "xyz",
            "extra": {"opaque": [1, 2, 3]},
        })
    );

    send_json(&mut b, json!({"type": "ice-candidate", "to": "nobody", "candidate": "c"})).await;
    expect_silence(&mut a).await;
    expect_silence(&mut b).await;
}

#[tokio::test]
async fn test_active_session_ignores_garbage() {
    let addr = default_server().await;
    let (mut a, _) = join(&addr, "A", "Alice").await;
    let (mut b, _) = join(&addr, "B", "Bob").await;
    recv_json(&mut a).await;

    b.send(Message::Text("not json".to_string())).await.unwrap();
    send_json(&mut b, json!({"type": "chat", "to": "A", "text": "hi"})).await;
    send_json(&mut b, json!({"type": "offer", "sdp": "no target"})).await;
    expect_silence(&mut a).await;

    send_json(&mut b, json!({"type": "offer", "to": "A", "sdp": "still alive"})).await;
    assert_eq!(recv_json(&mut a).await["sdp"], "still alive");
}

#[tokio::test]
async fn test_enumeration_resistance() {
    let addr = default_server().await;

    let mut ghost = join_as(&addr, "ghost", "A", "Alice", PASSWORD).await;
    let missing_room = recv_rejection(&mut ghost).await;

    let mut wrong = join_as(&addr, "alpha", "A", "Alice", "battery staple").await;
    let wrong_password = recv_rejection(&mut wrong).await;

    assert_eq!(missing_room, wrong_password);
    assert_eq!(missing_room.1, 1008);
}

#[tokio::test]
async fn test_first_frame_rejections() {
    let addr = default_server().await;

    let mut ws = connect(&addr, "alpha").await;
    ws.send(Message::Text("{broken".to_string())).await.unwrap();
    assert_eq!(
        recv_rejection(&mut ws).await,
        ("Invalid message format".to_string(), 1003)
    );

    let mut ws = connect(&addr, "alpha").await;
    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    assert_eq!(
        recv_rejection(&mut ws).await,
        ("Invalid message format".to_string(), 1003)
    );

    let mut ws = connect(&addr, "alpha").await;
    send_json(&mut ws, json!({"type": "offer", "to": "A"})).await;
    assert_eq!(
        recv_rejection(&mut ws).await,
        ("First message must be type=join".to_string(), 1008)
    );

    let mut ws = connect(&addr, "alpha").await;
    send_json(&mut ws, json!({"type": "join", "password": PASSWORD})).await;
    assert_eq!(
        recv_rejection(&mut ws).await,
        ("peerId required".to_string(), 1008)
    );
}

#[tokio::test]
async fn test_duplicate_peer_id_rejected() {
    let addr = default_server().await;
    let (mut a, _) = join(&addr, "A", "Alice").await;

    let mut dup = join_as(&addr, "alpha", "A", "Impostor", PASSWORD).await;
    assert_eq!(
        recv_rejection(&mut dup).await,
        ("peerId already in use".to_string(), 1008)
    );
    expect_silence(&mut a).await;

    // The original holder is untouched and still reachable.
    let (mut b, joined) = join(&addr, "B", "Bob").await;
    assert_eq!(joined["peers"].as_array().unwrap().len(), 1);
    assert_eq!(joined["peers"][0]["username"], "Alice");
    recv_json(&mut a).await; // peer-joined B
    send_json(&mut b, json!({"type": "offer", "to": "A", "sdp": "s"})).await;
    assert_eq!(recv_json(&mut a).await["from"], "B");
}

#[tokio::test]
async fn test_disconnect_before_join_is_not_announced() {
    let addr = default_server().await;
    let (mut a, _) = join(&addr, "A", "Alice").await;

    let mut silent = connect(&addr, "alpha").await;
    silent.close(None).await.unwrap();

    let mut rejected = connect(&addr, "alpha").await;
    send_json(&mut rejected, json!({"type": "join", "password": PASSWORD})).await;
    recv_rejection(&mut rejected).await;

    let mut wrong = join_as(&addr, "alpha", "X", "Xavier", "battery staple").await;
    recv_rejection(&mut wrong).await;
    drop(wrong);

    expect_silence(&mut a).await;

    let (_b, joined) = join(&addr, "B", "Bob").await;
    let peers = joined["peers"].as_array().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0]["peerId"], "A");
}

#[tokio::test]
async fn test_relay_keeps_numbers_exact() {
    let addr = default_server().await;
    let (mut a, _) = join(&addr, "A", "Alice").await;
    let (mut b, _) = join(&addr, "B", "Bob").await;
    recv_json(&mut a).await; // peer-joined B

    b.send(Message::Text(
        r#"{"type":"offer","to":"A","sessionId":12345678901234567890123,"sdp":"s"}"#.to_string(),
    ))
    .await
    .unwrap();

    match next_frame(&mut a).await {
        Message::Text(text) => assert!(
            text.contains(r#""sessionId":12345678901234567890123"#),
            "number altered in transit: {}",
            text
        ),
        other => panic!("expected text frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_clean_reentry_after_disconnect() {
    let addr = default_server().await;
    let (mut a, _) = join(&addr, "A", "Alice").await;
    let (mut x, _) = join(&addr, "X", "Xavier").await;
    recv_json(&mut a).await; // peer-joined X

    x.close(None).await.unwrap();
    assert_eq!(recv_json(&mut a).await["type"], "peer-left");

    let (_x, joined) = join(&addr, "X", "Xavier").await;
    assert_eq!(joined["peers"][0]["peerId"], "A");
    assert_eq!(recv_json(&mut a).await["peerId"], "X");
}

#[tokio::test]
async fn test_full_room_rejected_after_auth() {
    let mut config = Config::default();
    config.room.max_peers = 2;
    let addr = setup_test_server(config).await;

    let (mut a, _) = join(&addr, "A", "Alice").await;
    let (_b, _) = join(&addr, "B", "Bob").await;
    recv_json(&mut a).await;

    let mut late = join_as(&addr, "alpha", "C", "Carol", PASSWORD).await;
    assert_eq!(
        recv_rejection(&mut late).await,
        ("Room is full. Try again later.".to_string(), 1008)
    );

    // Without the password the caller only learns the generic failure.
    let mut outsider = join_as(&addr, "alpha", "D", "Dave", "battery staple").await;
    let (message, _) = recv_rejection(&mut outsider).await;
    assert_eq!(message, "Invalid room or password");
}
