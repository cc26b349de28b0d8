//! Audit trail listing for security review.

use crate::error::AppError;
use crate::response::success;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub limit: Option<u32>,
}

/// GET /api/v1/audits?limit=N, newest first.
pub async fn recent(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let records = state.audit.recent(limit).await?;
    Ok(success("ok", records))
}
