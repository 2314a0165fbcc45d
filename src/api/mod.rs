//! HTTP API for health, readiness, status and ledger inspection.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
