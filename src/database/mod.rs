//! # Database Routing
//!
//! Primary/replica routing for tracking-event storage.
//!
//! - [`data_source`] - lazily connected pools and liveness probes
//! - [`routing`] - Route State and the data-source router
//! - [`failover`] - single-retry failover around store operations
//! - [`health`] - periodic health monitor and operator actions

pub mod data_source;
pub mod errors;
pub mod failover;
pub mod health;
pub mod routing;

pub use data_source::{DataSource, PooledDataSource};
pub use errors::{DatabaseError, DatabaseResult};
pub use failover::FailoverInterceptor;
pub use health::{DatabaseHealthMonitor, DatabaseHealthStatus, DetailedStatus};
pub use routing::{Resolved, Route, RouteContext, RoutingDataSource, RoutingState};
