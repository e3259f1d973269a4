//! Environment-based configuration

use crate::registry::MAX_ROOM_PEERS;
use std::env;
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    /// `["*"]` allows any origin
    pub cors_origins: Vec<String>,
    pub room: RoomConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub log_level: String,
}

/// Room settings
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub max_peers: usize,
}

/// Password hashing settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub bcrypt_cost: u32,
}

/// Room store settings
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// LMDB environment directory
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["*".to_string()],
            room: RoomConfig {
                max_peers: MAX_ROOM_PEERS,
            },
            auth: AuthConfig {
                bcrypt_cost: bcrypt::DEFAULT_COST,
            },
            store: StoreConfig {
                path: PathBuf::from("anzen-data"),
            },
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the environment (and `.env`)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            port: parse_var("PORT", defaults.port),
            host: env::var("HOST").unwrap_or(defaults.host),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            room: RoomConfig {
                // Lower limits are allowed, never above the hard cap
                max_peers: parse_var("MAX_ROOM_PEERS", defaults.room.max_peers)
                    .min(MAX_ROOM_PEERS),
            },
            auth: AuthConfig {
                bcrypt_cost: parse_var("BCRYPT_COST", defaults.auth.bcrypt_cost),
            },
            store: StoreConfig {
                path: env::var("ROOMS_DB")
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or(defaults.store.path),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
