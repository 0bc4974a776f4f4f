mod attempts;
mod health;
mod plan;
mod progress;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::response::json_error;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/plan", plan::router())
        .nest("/api/progress", progress::router())
        .nest("/api/attempts", attempts::router())
        .nest("/health", health::router())
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "no such endpoint").into_response()
}
