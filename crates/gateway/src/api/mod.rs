pub mod health;
pub mod openai_compat;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/v1/models", get(health::list_models))
        .route("/v1/chat/completions", post(openai_compat::chat_completions))
        .fallback(not_found)
}

/// The router with request tracing and the concurrency limit applied.
pub fn app(state: AppState) -> Router {
    let max_concurrent = state.config.server.max_concurrent_requests.max(1);
    tracing::info!(max_concurrent, "concurrency limit set");

    router()
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    openai_compat::openai_error_response(StatusCode::NOT_FOUND, "invalid_request_error", "not found")
}
