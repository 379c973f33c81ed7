//! # Web API Application State

use std::sync::Arc;

use crate::database::{
    DataSource, DatabaseHealthMonitor, DatabaseHealthStatus, DatabaseResult, DetailedStatus,
};

/// Routing status and operator actions exposed over HTTP
pub trait RoutingControl: Send + Sync + 'static {
    fn status(&self) -> DatabaseHealthStatus;

    fn detailed_status(&self) -> DetailedStatus;

    fn force_failover_to_primary(&self) -> DatabaseHealthStatus;

    fn switch_to_replica(&self) -> DatabaseResult<DatabaseHealthStatus>;
}

impl<S: DataSource> RoutingControl for DatabaseHealthMonitor<S> {
    fn status(&self) -> DatabaseHealthStatus {
        DatabaseHealthMonitor::status(self)
    }

    fn detailed_status(&self) -> DetailedStatus {
        DatabaseHealthMonitor::detailed_status(self)
    }

    fn force_failover_to_primary(&self) -> DatabaseHealthStatus {
        DatabaseHealthMonitor::force_failover_to_primary(self)
    }

    fn switch_to_replica(&self) -> DatabaseResult<DatabaseHealthStatus> {
        DatabaseHealthMonitor::switch_to_replica(self)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub routing: Arc<dyn RoutingControl>,
}

impl AppState {
    pub fn new(routing: Arc<dyn RoutingControl>) -> Self {
        Self { routing }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("current_route", &self.routing.status().current_route)
            .finish()
    }
}
