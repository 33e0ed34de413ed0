use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/v0/chat", post(handlers::chat))
        .route("/v0/sandboxes/{session_id}", delete(handlers::delete_sandbox))
        .route("/v0/logs/{session_id}", get(handlers::logs_ws))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
