//! Anzen signaling server
//!
//! Relays WebRTC offers, answers and ICE candidates between members of
//! password-gated rooms and announces who joins and leaves. Payloads are
//! forwarded verbatim and never inspected or stored.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod store;

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::HeaderValue,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the HTTP + WebSocket router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allow_origin(&state.config.cors_origins))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/rooms", post(handlers::create_room))
        .route("/rooms/:room_name", get(handlers::check_room))
        .route("/ws/:room_name", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn allow_origin(origins: &[String]) -> AllowOrigin {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return AllowOrigin::any();
    }
    let list: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(list)
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>Anzen Signaling Server</h1><p>WebSocket endpoint: /ws/{room_name}</p>")
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "anzen-signaling",
        "rooms": state.registry.room_count(),
        "timestamp": std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handlers::handle_socket(socket, state, room_name))
}
