//! # Web API Module
//!
//! Axum status surface for database routing: current route, health flags and
//! the two operator actions.
//!
//! - [`routes`] - route definitions
//! - [`handlers`] - request handlers
//! - [`state`] - shared application state
//! - [`errors`] - API errors and their HTTP mapping

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

pub use errors::{ApiError, ApiResult};
pub use state::{AppState, RoutingControl};

/// Build the application router
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .nest("/api/database", routes::database_routes())
        .with_state(app_state)
}

/// Serve the status surface until shutdown
pub async fn serve(
    bind_address: &str,
    app_state: AppState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_address).await?;
    info!(address = %bind_address, "🌐 Status surface listening");

    axum::serve(listener, create_app(app_state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
}
