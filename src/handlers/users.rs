//! User CRUD: create, list, get, update, delete by numeric id.

use crate::error::AppError;
use crate::response::{created, success};
use crate::state::AppState;
use crate::users::UserInput;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::BadRequest("invalid user id".into()))
}

fn parse_input(body: &[u8]) -> Result<UserInput, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "rejecting user payload");
        AppError::Validation("user payload must be a JSON object with string name and email".into())
    })
}

/// POST /api/v1/users
pub async fn create(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, AppError> {
    let user = state.users.create(parse_input(&body)?).await?;
    Ok(created("user created", user))
}

/// GET /api/v1/users
pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let users = state.users.list().await?;
    Ok(success("ok", users))
}

/// GET /api/v1/users/:id
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, AppError> {
    let user = state.users.get(parse_id(&id)?).await?;
    Ok(success("ok", user))
}

/// PUT /api/v1/users/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let user = state.users.update(id, parse_input(&body)?).await?;
    Ok(success("user updated", user))
}

/// DELETE /api/v1/users/:id
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, AppError> {
    state.users.delete(parse_id(&id)?).await?;
    Ok(success("user deleted", serde_json::Value::Null))
}
