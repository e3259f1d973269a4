//! Anzen signaling server binary

use anyhow::Context;
use anzen_signaling::auth::{AuthGate, BcryptHasher};
use anzen_signaling::config::Config;
use anzen_signaling::state::AppState;
use anzen_signaling::store::LmdbRoomStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // Logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Room store
    let store = LmdbRoomStore::open(&config.store.path).with_context(|| {
        format!("failed to open room store {}", config.store.path.display())
    })?;

    // Password hashing (cost checked before any room is served)
    let hasher = BcryptHasher::new(config.auth.bcrypt_cost)
        .with_context(|| format!("invalid BCRYPT_COST {}", config.auth.bcrypt_cost))?;
    let auth = AuthGate::prepare(Arc::new(hasher))
        .await
        .context("failed to prepare password verification")?;

    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config, Arc::new(store), auth));
    let app = anzen_signaling::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Anzen signaling server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws/{{room_name}}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Anzen signaling server shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
