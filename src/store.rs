//! Persistent room store
//!
//! Rooms (name + password hash) outlive the process; signaling traffic never
//! touches the store.

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, EnvOpenOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Store error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("room store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("room store lmdb: {0}")]
    Lmdb(#[from] heed::Error),
    #[error("room store format: {0}")]
    Format(#[from] serde_json::Error),
    #[error("room {0} already exists with a different password")]
    Conflict(String),
}

/// Stored room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub room_name: String,
    pub password_hash: String,
    pub created_at: u64,
}

/// Lookup/create access to stored rooms
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn find(&self, name: &str) -> Result<Option<Room>, StoreError>;

    /// Idempotent create: an existing room with the same hash is returned
    /// as-is, one with a different hash is a [`StoreError::Conflict`].
    async fn create(&self, name: &str, password_hash: &str) -> Result<Room, StoreError>;
}

/// Room store on LMDB
///
/// One named database, `rooms`: room name → JSON-encoded [`Room`].
pub struct LmdbRoomStore {
    env: heed::Env,
    rooms: Database<Str, Bytes>,
}

impl LmdbRoomStore {
    /// Opens (or creates) the store under directory `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(64 * 1024 * 1024) // 64MB
                .max_dbs(1)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let rooms = env.create_database(&mut wtxn, Some("rooms"))?;
        wtxn.commit()?;

        tracing::info!(path = %path.display(), "Room store opened");
        Ok(Self { env, rooms })
    }

    fn get(&self, name: &str) -> Result<Option<Room>, StoreError> {
        let rtxn = self.env.read_txn()?;
        match self.rooms.get(&rtxn, name)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    fn insert_if_absent(&self, name: &str, password_hash: &str) -> Result<Room, StoreError> {
        // Single write txn: LMDB serializes writers, so check-then-put is atomic
        let mut wtxn = self.env.write_txn()?;

        if let Some(bytes) = self.rooms.get(&wtxn, name)? {
            let existing: Room = serde_json::from_slice(bytes)?;
            if existing.password_hash == password_hash {
                return Ok(existing);
            }
            return Err(StoreError::Conflict(name.to_string()));
        }

        let room = Room {
            room_name: name.to_string(),
            password_hash: password_hash.to_string(),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };
        let room_json = serde_json::to_vec(&room)?;
        self.rooms.put(&mut wtxn, name, &room_json)?;
        wtxn.commit()?;

        tracing::info!(room = %name, "Room created in store");
        Ok(room)
    }
}

#[async_trait]
impl RoomStore for LmdbRoomStore {
    async fn find(&self, name: &str) -> Result<Option<Room>, StoreError> {
        self.get(name)
    }

    async fn create(&self, name: &str, password_hash: &str) -> Result<Room, StoreError> {
        self.insert_if_absent(name, password_hash)
    }
}
