//! Application state

use crate::auth::AuthGate;
use crate::config::Config;
use crate::registry::RoomRegistry;
use crate::store::RoomStore;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    /// Connected peers per room (volatile)
    pub registry: RoomRegistry,
    /// Room names and password hashes (persistent)
    pub store: Arc<dyn RoomStore>,
    pub auth: AuthGate,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RoomStore>, auth: AuthGate) -> Self {
        Self {
            registry: RoomRegistry::with_capacity(config.room.max_peers),
            store,
            auth,
            config: Arc::new(config),
        }
    }
}
