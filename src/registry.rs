//! In-memory room registry
//!
//! Maps room names to the peers currently connected to them. Every mutation
//! of a room happens under that room's exclusive map guard, and the presence
//! messages that describe the mutation are queued inside the same guard, so
//! all members observe joins and leaves in one consistent order.

use crate::protocol::{PeerInfo, ServerMessage};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc::{UnboundedSender, WeakUnboundedSender};

/// Default cap on simultaneously registered peers per room
pub const MAX_ROOM_PEERS: usize = 200;

/// A registered peer
///
/// Holds only a weak handle to the session's outbound queue; the session owns
/// the queue and its lifetime.
pub struct Peer {
    pub info: PeerInfo,
    outbound: WeakUnboundedSender<ServerMessage>,
}

impl Peer {
    pub fn new(info: PeerInfo, outbound: &UnboundedSender<ServerMessage>) -> Self {
        Self {
            info,
            outbound: outbound.downgrade(),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.info.peer_id
    }

    /// Queues a message for the peer's writer. `false` if the session is gone.
    fn deliver(&self, message: ServerMessage) -> bool {
        match self.outbound.upgrade() {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }
}

/// Peers of one room, in join order
#[derive(Default)]
struct RoomEntry {
    peers: Vec<Peer>,
}

impl RoomEntry {
    fn find(&self, peer_id: &str) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.peer_id() == peer_id)
    }

    fn remove(&mut self, peer_id: &str) -> Option<Peer> {
        let index = self.peers.iter().position(|peer| peer.peer_id() == peer_id)?;
        Some(self.peers.remove(index))
    }

    fn snapshot(&self) -> Vec<PeerInfo> {
        self.peers.iter().map(|peer| peer.info.clone()).collect()
    }

    fn broadcast_except(&self, room: &str, except_peer_id: &str, message: &ServerMessage) {
        for peer in self.peers.iter().filter(|peer| peer.peer_id() != except_peer_id) {
            if !peer.deliver(message.clone()) {
                tracing::debug!(room = %room, peer_id = %peer.peer_id(), "Broadcast dropped, peer gone");
            }
        }
    }
}

/// Result of [`RoomRegistry::register`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Registered; carries the peers that were already in the room
    Registered(Vec<PeerInfo>),
    /// Room is at capacity
    Full,
    /// Another peer with the same ID is registered
    Conflict,
}

/// Result of [`RoomRegistry::send_to`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    NotFound,
}

/// Process-wide room → peers map
pub struct RoomRegistry {
    rooms: DashMap<String, RoomEntry>,
    capacity: usize,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ROOM_PEERS)
    }

    /// Registry with a lower per-room cap; values above [`MAX_ROOM_PEERS`]
    /// are clamped.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.min(MAX_ROOM_PEERS),
        }
    }

    /// Registers a peer in a room.
    ///
    /// Under the room's exclusive guard: rejects if full or if the peer ID is
    /// taken, otherwise queues `joined` (the existing peers) to the new peer,
    /// queues `peer-joined` to everyone else, and inserts the peer.
    pub fn register(&self, room: &str, peer: Peer) -> Registration {
        // Entry guard = exclusive access to this room until return
        match self.rooms.entry(room.to_string()) {
            Entry::Vacant(vacant) => {
                if self.capacity == 0 {
                    return Registration::Full;
                }
                // First peer: empty snapshot, nobody to notify
                peer.deliver(ServerMessage::Joined { peers: Vec::new() });
                tracing::info!(room = %room, peer_id = %peer.peer_id(), "Room created");
                vacant.insert(RoomEntry { peers: vec![peer] });
                Registration::Registered(Vec::new())
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();

                // Capacity first, then peer ID uniqueness
                if entry.peers.len() >= self.capacity {
                    tracing::warn!(room = %room, peers = entry.peers.len(), "Room full, rejected join");
                    return Registration::Full;
                }
                if entry.find(peer.peer_id()).is_some() {
                    tracing::warn!(room = %room, peer_id = %peer.peer_id(), "Duplicate peer ID, rejected join");
                    return Registration::Conflict;
                }

                // Snapshot of the others, queued to the joiner
                let existing = entry.snapshot();
                peer.deliver(ServerMessage::Joined {
                    peers: existing.clone(),
                });
                // Announce to the others before releasing the guard
                entry.broadcast_except(
                    room,
                    peer.peer_id(),
                    &ServerMessage::PeerJoined(peer.info.clone()),
                );
                entry.peers.push(peer);

                tracing::info!(room = %room, peers = entry.peers.len(), "Peer registered");
                Registration::Registered(existing)
            }
        }
    }

    /// Removes a peer from a room.
    ///
    /// Deletes the room when it becomes empty, otherwise queues `peer-left`
    /// to the remaining peers under the same guard. Returns `false` if the
    /// peer was not registered.
    pub fn unregister(&self, room: &str, peer_id: &str) -> bool {
        let Entry::Occupied(mut occupied) = self.rooms.entry(room.to_string()) else {
            return false;
        };

        if occupied.get_mut().remove(peer_id).is_none() {
            return false;
        }

        // Empty rooms do not exist
        if occupied.get().peers.is_empty() {
            occupied.remove();
            tracing::info!(room = %room, "Room deleted");
        } else {
            occupied.get().broadcast_except(
                room,
                peer_id,
                &ServerMessage::PeerLeft {
                    peer_id: peer_id.to_string(),
                },
            );
            tracing::info!(
                room = %room,
                remaining = occupied.get().peers.len(),
                "Peer unregistered"
            );
        }
        true
    }

    /// Best-effort delivery to one peer. A closed session counts as `NotFound`.
    pub fn send_to(&self, room: &str, peer_id: &str, message: ServerMessage) -> Delivery {
        let Some(entry) = self.rooms.get(room) else {
            return Delivery::NotFound;
        };
        let Some(peer) = entry.find(peer_id) else {
            return Delivery::NotFound;
        };

        if peer.deliver(message) {
            Delivery::Delivered
        } else {
            tracing::debug!(room = %room, peer_id = %peer_id, "Send dropped, peer gone");
            Delivery::NotFound
        }
    }

    /// Delivers to every peer of the room except one.
    pub fn broadcast_except(&self, room: &str, except_peer_id: &str, message: ServerMessage) {
        if let Some(entry) = self.rooms.get(room) {
            entry.broadcast_except(room, except_peer_id, &message);
        }
    }

    /// Snapshot of a room's peers in join order.
    pub fn peers(&self, room: &str) -> Vec<PeerInfo> {
        self.rooms
            .get(room)
            .map(|entry| entry.snapshot())
            .unwrap_or_default()
    }

    pub fn peer_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|entry| entry.peers.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
