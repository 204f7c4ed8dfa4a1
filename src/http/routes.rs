use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Capture control
        .route("/capture/start", post(handlers::start_capture))
        .route("/capture/stop/:session_id", post(handlers::stop_capture))
        // Session queries
        .route(
            "/capture/:session_id/status",
            get(handlers::get_capture_status),
        )
        .route(
            "/capture/:session_id/transcript",
            get(handlers::get_capture_transcript),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
