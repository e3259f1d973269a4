//! WebRTC signaling relay

use crate::protocol::{PeerInfo, ServerMessage, SignalBody, SignalKind};
use crate::registry::{Delivery, RoomRegistry};
use serde_json::Value;

/// Routes one message from an active peer.
///
/// Only offer/answer/ice-candidate frames with a non-empty `to` are
/// forwarded; `from`, `username` and `avatarSeed` are stamped from the
/// sender's session, every other field (numbers included) passes through
/// exactly as received. Returns `None` for ignored messages. The sender is
/// never told whether the target was present.
pub fn route_message(
    registry: &RoomRegistry,
    room: &str,
    sender: &PeerInfo,
    mut body: SignalBody,
) -> Option<Delivery> {
    // Kind
    let kind = body
        .get("type")
        .and_then(Value::as_str)
        .and_then(SignalKind::from_type)?;

    // Target
    let target = body
        .get("to")
        .and_then(Value::as_str)
        .filter(|to| !to.is_empty())?
        .to_string();

    // Sender identity always comes from the session
    body.insert("from".to_string(), Value::String(sender.peer_id.clone()));
    body.insert("username".to_string(), Value::String(sender.username.clone()));
    body.insert(
        "avatarSeed".to_string(),
        Value::String(sender.avatar_seed.clone()),
    );

    let delivery = registry.send_to(room, &target, ServerMessage::Relay(body));

    tracing::debug!(
        from = %sender.peer_id,
        to = %target,
        kind = ?kind,
        delivery = ?delivery,
        "Relayed signal"
    );

    Some(delivery)
}
