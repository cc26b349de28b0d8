//! Registration and execution routes. The execution route captures everything under
//! `/dynamic/`; the handler resolves the service by method and captured path.

use crate::handlers::dynamic::{execute, register};
use crate::state::AppState;
use axum::{
    routing::{any, post},
    Router,
};

pub fn dynamic_routes(state: AppState) -> Router {
    Router::new()
        .route("/dynamic/register", post(register))
        .route("/dynamic/*path", any(execute))
        .with_state(state)
}
