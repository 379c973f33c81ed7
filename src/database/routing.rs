//! # Data-Source Router
//!
//! Chooses PRIMARY or REPLICA for each store operation. Route State has two
//! layers:
//!
//! - a per-operation [`RouteContext`] passed explicitly into every store call
//! - a process-wide default held in [`RoutingState`], starting as REPLICA and
//!   mutated only by the health monitor and operator actions
//!
//! Health flags live next to the default so the router, the monitor and the
//! status surface read one lock-free snapshot source.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::data_source::DataSource;

/// Which physical database an operation runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Route {
    Primary = 0,
    Replica = 1,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Primary => "PRIMARY",
            Route::Replica => "REPLICA",
        }
    }
}

impl From<u8> for Route {
    fn from(value: u8) -> Self {
        match value {
            1 => Route::Replica,
            _ => Route::Primary,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-operation Route State
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteContext {
    route: Option<Route>,
}

impl RouteContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context already fixed to one route (writes pin PRIMARY)
    pub fn pinned(route: Route) -> Self {
        Self { route: Some(route) }
    }

    pub fn set_route(&mut self, route: Route) {
        self.route = Some(route);
    }

    pub fn route(&self) -> Option<Route> {
        self.route
    }

    pub fn clear_route(&mut self) {
        self.route = None;
    }
}

/// Process-wide default route plus health flags
#[derive(Debug)]
pub struct RoutingState {
    default_route: AtomicU8,
    primary_healthy: AtomicBool,
    replica_healthy: AtomicBool,
}

impl Default for RoutingState {
    fn default() -> Self {
        Self {
            default_route: AtomicU8::new(Route::Replica as u8),
            primary_healthy: AtomicBool::new(true),
            replica_healthy: AtomicBool::new(true),
        }
    }
}

impl RoutingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_route(&self) -> Route {
        Route::from(self.default_route.load(Ordering::Acquire))
    }

    /// Replace the default; returns the previous one
    pub fn set_default_route(&self, route: Route) -> Route {
        Route::from(self.default_route.swap(route as u8, Ordering::AcqRel))
    }

    pub fn primary_healthy(&self) -> bool {
        self.primary_healthy.load(Ordering::Acquire)
    }

    pub fn replica_healthy(&self) -> bool {
        self.replica_healthy.load(Ordering::Acquire)
    }

    /// Returns the previous flag
    pub fn set_primary_healthy(&self, healthy: bool) -> bool {
        self.primary_healthy.swap(healthy, Ordering::AcqRel)
    }

    /// Returns the previous flag
    pub fn set_replica_healthy(&self, healthy: bool) -> bool {
        self.replica_healthy.swap(healthy, Ordering::AcqRel)
    }
}

/// Data source chosen for one operation
#[derive(Debug, Clone)]
pub struct Resolved<S> {
    pub route: Route,
    pub source: S,
}

/// Routes operations between a primary and a replica data source
#[derive(Debug)]
pub struct RoutingDataSource<S: DataSource> {
    primary: S,
    replica: S,
    state: Arc<RoutingState>,
}

impl<S: DataSource> RoutingDataSource<S> {
    pub fn new(primary: S, replica: S, state: Arc<RoutingState>) -> Self {
        Self {
            primary,
            replica,
            state,
        }
    }

    pub fn state(&self) -> &Arc<RoutingState> {
        &self.state
    }

    pub fn primary(&self) -> &S {
        &self.primary
    }

    pub fn replica(&self) -> &S {
        &self.replica
    }

    /// Route the operation would take right now without probing
    pub fn effective_route(&self, ctx: &RouteContext) -> Route {
        ctx.route().unwrap_or_else(|| self.state.default_route())
    }

    /// Pick the data source for this operation
    ///
    /// An unset context adopts the process default for the rest of the
    /// operation. REPLICA is probed first; a failed probe switches the context
    /// to PRIMARY. PRIMARY is returned unprobed, so its failures surface to
    /// the caller.
    pub async fn resolve(&self, ctx: &mut RouteContext) -> Resolved<S> {
        let route = match ctx.route() {
            Some(route) => route,
            None => {
                let route = self.state.default_route();
                ctx.set_route(route);
                route
            }
        };

        match route {
            Route::Primary => Resolved {
                route: Route::Primary,
                source: self.primary.clone(),
            },
            Route::Replica => match self.replica.probe().await {
                Ok(()) => {
                    debug!(source = %self.replica.name(), "Routing operation to replica");
                    Resolved {
                        route: Route::Replica,
                        source: self.replica.clone(),
                    }
                }
                Err(e) => {
                    warn!(
                        source = %self.replica.name(),
                        error = %e,
                        "Replica probe failed, routing operation to primary"
                    );
                    ctx.set_route(Route::Primary);
                    Resolved {
                        route: Route::Primary,
                        source: self.primary.clone(),
                    }
                }
            },
        }
    }
}
