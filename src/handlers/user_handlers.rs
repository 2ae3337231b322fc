//! HTTP handlers for user accounts.
//!
//! Identity arrives pre-authenticated: the email in the path is the
//! identity provider's email claim, trusted as-is.

use crate::{AppState, errors::AppError, models::user::User};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

/// Body for `PUT /api/users/{email}`.
#[derive(Debug, Deserialize)]
pub struct UpsertUserReq {
    /// New display name; omitted on first sign-in (a random one is assigned).
    pub nickname: Option<String>,
}

/// GET `/api/users` — all users, nickname ascending.
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let users = state.store.list_users().await?;
    Ok(Json(users))
}

/// GET `/api/users/{email}`
pub async fn get_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match state.store.get_user(&email).await? {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::not_found(format!("user `{email}` not found"))),
    }
}

/// PUT `/api/users/{email}` — create on first sign-in, or update the
/// nickname. Upsert semantics: no tag check.
pub async fn upsert_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(req): Json<UpsertUserReq>,
) -> Result<impl IntoResponse, AppError> {
    let existing = state.store.get_user(&email).await?;
    let created = existing.is_none();

    let mut user = existing.unwrap_or_else(|| User::new(&email));
    if let Some(nickname) = req.nickname {
        user.nickname = nickname;
    }
    let user = state.store.upsert_user(user).await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(user)))
}
