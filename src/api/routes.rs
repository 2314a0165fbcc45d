//! HTTP API route definitions.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{health, ledger, ready, status, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Bot state
        .route("/api/v1/status", get(status))
        .route("/api/v1/ledger", get(ledger))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
