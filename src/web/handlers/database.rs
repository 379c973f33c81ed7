//! # Database Routing Handlers
//!
//! - `GET /api/database/health` - current route and health flags
//! - `GET /api/database/status` - adds failover settings and routing strategy
//! - `POST /api/database/failover/primary` - force PRIMARY as the default route
//! - `POST /api/database/switch/replica` - make REPLICA the default (409 while unhealthy)

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::database::{DatabaseHealthStatus, DetailedStatus};
use crate::web::errors::ApiResult;
use crate::web::state::AppState;

/// Result of an operator action
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteActionResponse {
    pub message: String,
    #[serde(flatten)]
    pub status: DatabaseHealthStatus,
}

pub async fn database_health(State(state): State<AppState>) -> Json<DatabaseHealthStatus> {
    Json(state.routing.status())
}

pub async fn database_status(State(state): State<AppState>) -> Json<DetailedStatus> {
    Json(state.routing.detailed_status())
}

pub async fn force_failover_to_primary(
    State(state): State<AppState>,
) -> Json<RouteActionResponse> {
    info!("Manual failover to primary requested");
    let status = state.routing.force_failover_to_primary();
    Json(RouteActionResponse {
        message: "Failover to primary executed".to_string(),
        status,
    })
}

pub async fn switch_to_replica(
    State(state): State<AppState>,
) -> ApiResult<Json<RouteActionResponse>> {
    info!("Manual switch to replica requested");
    let status = state.routing.switch_to_replica()?;
    Ok(Json(RouteActionResponse {
        message: "Switch to replica executed".to_string(),
        status,
    }))
}
