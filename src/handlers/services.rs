//! Registry administration: list active services, soft-delete one.

use crate::error::AppError;
use crate::response::success;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

/// GET /api/v1/services
pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let services = state.registry.list().await?;
    Ok(success("ok", services))
}

/// DELETE /api/v1/services/:id. The row stays for history but no longer routes.
pub async fn retire(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::BadRequest("invalid uuid".into()))?;
    state.registry.retire(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
