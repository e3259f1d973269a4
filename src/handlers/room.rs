//! Room creation and lookup API

use crate::auth::HashError;
use crate::state::AppState;
use crate::store::StoreError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `POST /rooms` body
#[derive(Debug, Deserialize)]
pub struct CreateRoom {
    pub room_name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedRoom {
    pub room_name: String,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct RoomStatus {
    pub room_name: String,
    pub exists: bool,
}

/// Room API error
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error("Room already exists with a different password.")]
    PasswordMismatch,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::PasswordMismatch => StatusCode::CONFLICT,
            ApiError::Store(_) | ApiError::Hash(_) => {
                tracing::error!(error = %self, "Room API failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let detail = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

/// Room names: 3–128 chars of `[a-z0-9-]`
pub fn validate_room_name(name: &str) -> Result<(), ApiError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !(3..=128).contains(&name.chars().count()) || !valid_chars {
        return Err(ApiError::Invalid(
            "room_name must be 3-128 characters of a-z, 0-9 or '-'",
        ));
    }
    Ok(())
}

/// Passwords: 8–128 chars
pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if !(8..=128).contains(&password.chars().count()) {
        return Err(ApiError::Invalid("password must be 8-128 characters"));
    }
    Ok(())
}

/// Creates a room. Repeating the call with the same password is a no-op.
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRoom>,
) -> Result<(StatusCode, Json<CreatedRoom>), ApiError> {
    validate_room_name(&body.room_name)?;
    validate_password(&body.password)?;

    if let Some(existing) = state.store.find(&body.room_name).await? {
        return confirm_existing(&state, &body, &existing.password_hash).await;
    }

    let password_hash = state.auth.hash(&body.password).await?;
    match state.store.create(&body.room_name, &password_hash).await {
        Ok(room) => {
            tracing::info!(room = %room.room_name, "Room created");
            Ok((
                StatusCode::CREATED,
                Json(CreatedRoom {
                    room_name: room.room_name,
                    created: true,
                }),
            ))
        }
        // Lost a creation race; the winner's hash decides.
        Err(StoreError::Conflict(_)) => match state.store.find(&body.room_name).await? {
            Some(existing) => confirm_existing(&state, &body, &existing.password_hash).await,
            None => Err(ApiError::PasswordMismatch),
        },
        Err(e) => Err(e.into()),
    }
}

async fn confirm_existing(
    state: &AppState,
    body: &CreateRoom,
    password_hash: &str,
) -> Result<(StatusCode, Json<CreatedRoom>), ApiError> {
    if !state.auth.verify(&body.password, password_hash).await {
        return Err(ApiError::PasswordMismatch);
    }
    Ok((
        StatusCode::OK,
        Json(CreatedRoom {
            room_name: body.room_name.clone(),
            created: false,
        }),
    ))
}

/// Reports whether a room exists.
pub async fn check_room(
    State(state): State<Arc<AppState>>,
    Path(room_name): Path<String>,
) -> Result<Json<RoomStatus>, ApiError> {
    let exists = state.store.find(&room_name).await?.is_some();
    Ok(Json(RoomStatus { room_name, exists }))
}
