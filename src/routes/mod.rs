pub mod health;
pub mod sessions;

use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;

use crate::middleware::{rate_limit, request_id};
use crate::response::AppError;
use crate::state::AppState;

/// Posted messages are small; 64 KiB leaves room for long dice payloads.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Session API under `/api/sessions`, the bare-GET `/createSession` kept for older clients,
/// and health probes. Rate limiting sits outside the nesting so it sees full paths.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/sessions", sessions::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .nest("/api", api)
        .route("/createSession", get(sessions::create))
        .nest("/health", health::router())
        .fallback(|| async { AppError::not_found("Not found") })
        .layer(from_fn_with_state(state.clone(), rate_limit::limit_requests))
        .layer(from_fn(request_id::request_id_middleware))
        .with_state(state)
}
