//! Registry and audit administration routes.

use crate::handlers::{audits, services};
use crate::state::AppState;
use axum::{
    routing::{delete, get},
    Router,
};

pub fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/services", get(services::list))
        .route("/services/:id", delete(services::retire))
        .route("/audits", get(audits::recent))
        .with_state(state)
}
