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
        .route("/api/status", get(handlers::get_status))
        // Manual recording
        .route("/api/rec/start", post(handlers::start_recording))
        .route("/api/rec/stop", post(handlers::stop_recording))
        // Settings
        .route("/api/auto", post(handlers::set_auto))
        .route("/api/codec", post(handlers::set_codec))
        .route("/api/filter", post(handlers::set_filter))
        // Recordings on disk
        .route("/api/files", get(handlers::list_files))
        .route(
            "/api/files/:name",
            get(handlers::download_file).delete(handlers::delete_file),
        )
        // Live audio and record commands
        .route("/ws", get(handlers::live_stream))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
