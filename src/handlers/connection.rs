//! Per-connection session state machine
//!
//! `Connecting → AwaitingJoin → Authenticating → Active → Closed`. Every
//! state can fall through to `Closed`; a transport disconnect is the only
//! cancellation signal and surfaces as the end of the read stream.

use crate::handlers::signaling::route_message;
use crate::protocol::{JoinRequest, PeerInfo, ServerMessage, SignalBody};
use crate::registry::{Peer, Registration};
use crate::state::AppState;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::Instrument;
use uuid::Uuid;

/// Why a session was closed before becoming active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// First frame is not a JSON object, or join fields have the wrong shape
    MalformedFrame,
    /// First frame is not a join
    NotJoin,
    MissingPeerId,
    /// Room absent or wrong password; deliberately indistinguishable
    AuthFailed,
    RoomFull,
    DuplicatePeerId,
}

impl Rejection {
    pub fn message(self) -> &'static str {
        match self {
            Rejection::MalformedFrame => "Invalid message format",
            Rejection::NotJoin => "First message must be type=join",
            Rejection::MissingPeerId => "peerId required",
            Rejection::AuthFailed => "Invalid room or password",
            Rejection::RoomFull => "Room is full. Try again later.",
            Rejection::DuplicatePeerId => "peerId already in use",
        }
    }

    pub fn close_code(self) -> u16 {
        match self {
            Rejection::MalformedFrame => close_code::UNSUPPORTED,
            _ => close_code::POLICY,
        }
    }
}

/// An authenticated, registered peer and its outbound queue
struct ActivePeer {
    info: PeerInfo,
    /// Strong end of the queue; the registry only holds a weak handle.
    outbound: UnboundedSender<ServerMessage>,
    outbound_rx: UnboundedReceiver<ServerMessage>,
}

enum SessionState {
    Connecting(WebSocket),
    AwaitingJoin(WebSocket),
    Authenticating(WebSocket, JoinRequest),
    Active(WebSocket, ActivePeer),
    Closed,
}

/// Runs one connection to completion.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room: String) {
    let conn_id = Uuid::new_v4();
    let span = tracing::info_span!("session", conn_id = %conn_id, room = %room);

    PeerSession { state, room }
        .run(socket)
        .instrument(span)
        .await;
}

/// Session driver for one room connection
struct PeerSession {
    state: Arc<AppState>,
    room: String,
}

impl PeerSession {
    async fn run(self, socket: WebSocket) {
        let mut current = SessionState::Connecting(socket);
        loop {
            current = match current {
                SessionState::Connecting(socket) => {
                    tracing::debug!("Connection accepted");
                    SessionState::AwaitingJoin(socket)
                }
                SessionState::AwaitingJoin(socket) => self.await_join(socket).await,
                SessionState::Authenticating(socket, join) => {
                    self.authenticate(socket, join).await
                }
                SessionState::Active(socket, peer) => self.relay(socket, peer).await,
                SessionState::Closed => break,
            };
        }
        tracing::debug!("Session closed");
    }

    /// Reads and validates the first frame.
    async fn await_join(&self, mut socket: WebSocket) -> SessionState {
        let text = loop {
            match socket.recv().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(Message::Binary(_))) => {
                    return reject(socket, Rejection::MalformedFrame).await;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    tracing::debug!("Disconnected before join");
                    return SessionState::Closed;
                }
            }
        };

        match parse_join(&text) {
            Ok(join) => SessionState::Authenticating(socket, join),
            Err(rejection) => reject(socket, rejection).await,
        }
    }

    /// Verifies the room password and registers the peer.
    async fn authenticate(&self, socket: WebSocket, join: JoinRequest) -> SessionState {
        // Room lookup (a store fault counts as an absent room)
        let stored = match self.state.store.find(&self.room).await {
            Ok(room) => room,
            Err(e) => {
                tracing::error!(error = %e, "Room lookup failed");
                None
            }
        };

        // Password check; absent room pays the same bcrypt cost
        let verified = self
            .state
            .auth
            .check(&join.password, stored.as_ref().map(|room| room.password_hash.as_str()))
            .await;
        if !verified {
            tracing::info!(peer_id = %join.peer_id, "Join rejected: invalid room or password");
            return reject(socket, Rejection::AuthFailed).await;
        }

        // Outbound queue, owned by this session
        let info = join.peer_info();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        // Register: capacity and peer ID checks happen under the room lock

        match self
            .state
            .registry
            .register(&self.room, Peer::new(info.clone(), &outbound))
        {
            Registration::Registered(existing) => {
                tracing::info!(
                    peer_id = %info.peer_id,
                    existing = existing.len(),
                    "Peer joined room"
                );
                SessionState::Active(
                    socket,
                    ActivePeer {
                        info,
                        outbound,
                        outbound_rx,
                    },
                )
            }
            Registration::Full => reject(socket, Rejection::RoomFull).await,
            Registration::Conflict => reject(socket, Rejection::DuplicatePeerId).await,
        }
    }

    /// Relays until the transport goes away, then cleans up exactly once.
    async fn relay(&self, socket: WebSocket, peer: ActivePeer) -> SessionState {
        let ActivePeer {
            info,
            outbound,
            mut outbound_rx,
        } = peer;
        let (mut ws_sender, mut ws_receiver) = socket.split();

        // Writer task: drains the queue in order; ends when the socket does
        let send_task = tokio::spawn(
            async move {
                while let Some(msg) = outbound_rx.recv().await {
                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if ws_sender.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to encode outbound message"),
                    }
                }
            }
            .in_current_span(),
        );

        // Read loop: frames stay raw JSON objects so payloads relay unchanged
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<SignalBody>(&text) {
                    Ok(body) => {
                        route_message(&self.state.registry, &self.room, &info, body);
                    }
                    Err(_) => tracing::trace!(peer_id = %info.peer_id, "Ignored unroutable message"),
                },
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::debug!(peer_id = %info.peer_id, error = %e, "Read failed");
                    break;
                }
                _ => {}
            }
        }

        // Cleanup: peer-left goes out once; the writer stops with the queue
        self.state.registry.unregister(&self.room, &info.peer_id);
        drop(outbound);
        send_task.abort();

        tracing::info!(peer_id = %info.peer_id, "Peer left room");
        SessionState::Closed
    }
}

/// Validates the first frame of a session.
pub fn parse_join(text: &str) -> Result<JoinRequest, Rejection> {
    let frame: SignalBody = serde_json::from_str(text).map_err(|_| Rejection::MalformedFrame)?;
    if frame.get("type").and_then(Value::as_str) != Some("join") {
        return Err(Rejection::NotJoin);
    }

    let join: JoinRequest = serde_json::from_value(Value::Object(frame))
        .map_err(|_| Rejection::MalformedFrame)?;
    if join.peer_id.is_empty() {
        return Err(Rejection::MissingPeerId);
    }
    Ok(join)
}

/// Sends `error`, then closes with the rejection's code.
async fn reject(mut socket: WebSocket, rejection: Rejection) -> SessionState {
    tracing::debug!(reason = ?rejection, "Rejecting session");

    if let Ok(json) = serde_json::to_string(&ServerMessage::error(rejection.message())) {
        let _ = socket.send(Message::Text(json)).await;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: rejection.close_code(),
            reason: Cow::Borrowed(""),
        })))
        .await;

    SessionState::Closed
}
