//! # Web API Route Definitions

use axum::routing::{get, post};
use axum::Router;

use crate::web::handlers;
use crate::web::state::AppState;

/// Database routing status and operator actions, mounted under `/api/database`
pub fn database_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::database::database_health))
        .route("/status", get(handlers::database::database_status))
        .route(
            "/failover/primary",
            post(handlers::database::force_failover_to_primary),
        )
        .route(
            "/switch/replica",
            post(handlers::database::switch_to_replica),
        )
}
