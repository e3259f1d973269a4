//! Client-server message protocol

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Display name used when a join omits `username`
pub const DEFAULT_USERNAME: &str = "Unknown";

/// A relayed signaling frame, `type` included, kept as parsed
pub type SignalBody = Map<String, Value>;

/// First message of every session (`type: "join"`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JoinRequest {
    pub password: String,
    pub peer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_seed: Option<String>,
}

impl JoinRequest {
    /// Public identity announced to the room, with display defaults applied.
    pub fn peer_info(&self) -> PeerInfo {
        PeerInfo {
            peer_id: self.peer_id.clone(),
            username: self
                .username
                .clone()
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            avatar_seed: self.avatar_seed.clone().unwrap_or_default(),
        }
    }
}

/// Server → client messages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    // Connection
    Error { message: String },

    // Room Events
    Joined { peers: Vec<PeerInfo> },
    PeerJoined(PeerInfo),
    #[serde(rename_all = "camelCase")]
    PeerLeft { peer_id: String },

    // WebRTC Signaling (frame already carries its own `type`)
    #[serde(untagged)]
    Relay(SignalBody),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Directed message kinds the relay forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    /// Classifies a frame's `type`; `None` for anything the relay ignores.
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "offer" => Some(SignalKind::Offer),
            "answer" => Some(SignalKind::Answer),
            "ice-candidate" => Some(SignalKind::IceCandidate),
            _ => None,
        }
    }
}

/// Peer identity as shown to other room members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub peer_id: String,
    pub username: String,
    pub avatar_seed: String,
}
