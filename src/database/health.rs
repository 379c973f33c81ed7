//! # Database Health Monitor
//!
//! Periodically probes both data sources, keeps the health flags current and
//! steers the process-wide default route:
//!
//! - replica healthy while the default is PRIMARY: back to REPLICA
//! - replica going down while the default is REPLICA: over to PRIMARY
//!   (when auto-failover is enabled)
//!
//! Only flag transitions are logged. Per-operation route contexts are never
//! touched here.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::data_source::DataSource;
use super::errors::{DatabaseError, DatabaseResult};
use super::routing::{Route, RoutingState};
use crate::logging::log_route_change;

/// Snapshot served by the status surface
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealthStatus {
    pub current_route: Route,
    pub primary_healthy: bool,
    pub replica_healthy: bool,
    pub timestamp: DateTime<Utc>,
}

/// Status snapshot plus routing strategy
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStatus {
    #[serde(flatten)]
    pub status: DatabaseHealthStatus,
    pub failover_enabled: bool,
    pub auto_recovery: bool,
    pub check_interval_seconds: u64,
    pub strategy: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct DatabaseHealthMonitor<S: DataSource> {
    primary: S,
    replica: S,
    state: Arc<RoutingState>,
    auto_failover: bool,
    check_interval: Duration,
}

impl<S: DataSource> DatabaseHealthMonitor<S> {
    pub fn new(
        primary: S,
        replica: S,
        state: Arc<RoutingState>,
        auto_failover: bool,
        check_interval: Duration,
    ) -> Self {
        Self {
            primary,
            replica,
            state,
            auto_failover,
            check_interval,
        }
    }

    pub fn state(&self) -> &Arc<RoutingState> {
        &self.state
    }

    /// One monitoring pass: primary, then replica, then default-route adjustment
    pub async fn tick(&self) {
        let primary_result = self.primary.health_check().await;
        let was_healthy = self.state.set_primary_healthy(primary_result.is_ok());
        match (&primary_result, was_healthy) {
            (Err(e), true) => error!(
                source = %self.primary.name(),
                error = %e,
                "🔴 Primary data source became unavailable"
            ),
            (Ok(()), false) => info!(
                source = %self.primary.name(),
                "🟢 Primary data source recovered"
            ),
            _ => {}
        }

        let replica_result = self.replica.health_check().await;
        let replica_healthy = replica_result.is_ok();
        let was_healthy = self.state.set_replica_healthy(replica_healthy);
        match (&replica_result, was_healthy) {
            (Err(e), true) => {
                warn!(
                    source = %self.replica.name(),
                    error = %e,
                    "🔴 Replica data source became unavailable"
                );
                if self.auto_failover && self.state.default_route() == Route::Replica {
                    self.state.set_default_route(Route::Primary);
                    log_route_change("REPLICA", "PRIMARY", "replica became unavailable");
                }
            }
            (Ok(()), false) => info!(
                source = %self.replica.name(),
                "🟢 Replica data source recovered"
            ),
            _ => {}
        }

        if replica_healthy && self.state.default_route() == Route::Primary {
            self.state.set_default_route(Route::Replica);
            log_route_change("PRIMARY", "REPLICA", "replica healthy");
        }
    }

    /// Tick on the configured interval until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_seconds = self.check_interval.as_secs(),
            "🩺 Database health monitor started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown_rx.recv() => break,
            }
        }

        info!("🛑 Database health monitor stopped");
    }

    pub fn status(&self) -> DatabaseHealthStatus {
        DatabaseHealthStatus {
            current_route: self.state.default_route(),
            primary_healthy: self.state.primary_healthy(),
            replica_healthy: self.state.replica_healthy(),
            timestamp: Utc::now(),
        }
    }

    pub fn detailed_status(&self) -> DetailedStatus {
        let strategy = BTreeMap::from([
            ("preferred".to_string(), Route::Replica.to_string()),
            ("fallback".to_string(), Route::Primary.to_string()),
            ("writes".to_string(), Route::Primary.to_string()),
            ("autoFailover".to_string(), self.auto_failover.to_string()),
            ("autoRecovery".to_string(), "true".to_string()),
        ]);
        DetailedStatus {
            status: self.status(),
            failover_enabled: true,
            auto_recovery: true,
            check_interval_seconds: self.check_interval.as_secs(),
            strategy,
        }
    }

    /// Operator action: make PRIMARY the default
    ///
    /// The next tick moves the default back to REPLICA while the replica is healthy.
    pub fn force_failover_to_primary(&self) -> DatabaseHealthStatus {
        let previous = self.state.set_default_route(Route::Primary);
        log_route_change(previous.as_str(), "PRIMARY", "operator forced failover");
        self.status()
    }

    /// Operator action: make REPLICA the default; refused while the replica is unhealthy
    pub fn switch_to_replica(&self) -> DatabaseResult<DatabaseHealthStatus> {
        if !self.state.replica_healthy() {
            warn!("Refusing switch to replica: replica is unhealthy");
            return Err(DatabaseError::ReplicaUnhealthy);
        }
        let previous = self.state.set_default_route(Route::Replica);
        log_route_change(previous.as_str(), "REPLICA", "operator switch");
        Ok(self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone)]
    struct Switchable {
        name: &'static str,
        up: Arc<AtomicBool>,
    }

    #[async_trait]
    impl DataSource for Switchable {
        fn name(&self) -> &str {
            self.name
        }

        async fn probe(&self) -> DatabaseResult<()> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(DatabaseError::probe_failed(self.name, "down"))
            }
        }
    }

    fn monitor(auto_failover: bool) -> (DatabaseHealthMonitor<Switchable>, Arc<AtomicBool>) {
        let replica_up = Arc::new(AtomicBool::new(true));
        let monitor = DatabaseHealthMonitor::new(
            Switchable {
                name: "primary",
                up: Arc::new(AtomicBool::new(true)),
            },
            Switchable {
                name: "replica",
                up: replica_up.clone(),
            },
            Arc::new(RoutingState::new()),
            auto_failover,
            Duration::from_secs(30),
        );
        (monitor, replica_up)
    }

    #[tokio::test]
    async fn test_healthy_replica_restores_replica_default() {
        let (monitor, _) = monitor(true);
        monitor.state().set_default_route(Route::Primary);

        monitor.tick().await;
        assert_eq!(monitor.state().default_route(), Route::Replica);
    }

    #[tokio::test]
    async fn test_replica_outage_fails_over_and_recovers() {
        let (monitor, replica_up) = monitor(true);

        replica_up.store(false, Ordering::SeqCst);
        monitor.tick().await;
        assert!(!monitor.state().replica_healthy());
        assert_eq!(monitor.state().default_route(), Route::Primary);

        replica_up.store(true, Ordering::SeqCst);
        monitor.tick().await;
        assert!(monitor.state().replica_healthy());
        assert_eq!(monitor.state().default_route(), Route::Replica);
    }

    #[tokio::test]
    async fn test_auto_failover_disabled_keeps_default() {
        let (monitor, replica_up) = monitor(false);
        replica_up.store(false, Ordering::SeqCst);
        monitor.tick().await;
        assert_eq!(monitor.state().default_route(), Route::Replica);
    }

    #[tokio::test]
    async fn test_switch_to_replica_refused_when_unhealthy() {
        let (monitor, replica_up) = monitor(true);
        replica_up.store(false, Ordering::SeqCst);
        monitor.tick().await;

        assert_eq!(monitor.switch_to_replica(), Err(DatabaseError::ReplicaUnhealthy));
        assert_eq!(monitor.state().default_route(), Route::Primary);
    }

    #[tokio::test]
    async fn test_force_failover_then_switch_back() {
        let (monitor, _) = monitor(true);

        let status = monitor.force_failover_to_primary();
        assert_eq!(status.current_route, Route::Primary);

        let status = monitor.switch_to_replica().unwrap();
        assert_eq!(status.current_route, Route::Replica);
    }

    #[test]
    fn test_detailed_status_serializes_camel_case() {
        let (monitor, _) = monitor(true);
        let json = serde_json::to_value(monitor.detailed_status()).unwrap();
        assert_eq!(json["currentRoute"], "REPLICA");
        assert_eq!(json["replicaHealthy"], true);
        assert_eq!(json["failoverEnabled"], true);
        assert_eq!(json["strategy"]["fallback"], "PRIMARY");
    }
}
