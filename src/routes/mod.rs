//! Router assembly.

mod admin;
mod common;
mod dynamic;
mod users;

pub use admin::admin_routes;
pub use common::common_routes;
pub use dynamic::dynamic_routes;
pub use users::user_routes;

use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// The full application: common routes at the root, API under `/api/v1`.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_LENGTH]);

    let api = Router::new()
        .merge(dynamic_routes(state.clone()))
        .merge(admin_routes(state.clone()))
        .merge(user_routes(state.clone()));

    Router::new()
        .merge(common_routes(state))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
}
