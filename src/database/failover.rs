//! # Failover Interceptor
//!
//! Wraps a store operation: a data-access failure on REPLICA switches the
//! operation's context to PRIMARY and re-invokes it exactly once. Failures on
//! PRIMARY, non-data-access failures and a failed retry all propagate.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use super::data_source::DataSource;
use super::errors::{DatabaseError, DatabaseResult};
use super::routing::{Route, RouteContext, RoutingDataSource};

#[derive(Debug)]
pub struct FailoverInterceptor<S: DataSource> {
    router: Arc<RoutingDataSource<S>>,
}

impl<S: DataSource> Clone for FailoverInterceptor<S> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
        }
    }
}

impl<S: DataSource> FailoverInterceptor<S> {
    pub fn new(router: Arc<RoutingDataSource<S>>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<RoutingDataSource<S>> {
        &self.router
    }

    /// Run `operation` against the resolved data source, with at most one PRIMARY retry
    pub async fn execute<T, F, Fut>(&self, ctx: &mut RouteContext, operation: F) -> DatabaseResult<T>
    where
        F: Fn(Route, S) -> Fut,
        Fut: Future<Output = DatabaseResult<T>>,
    {
        let resolved = self.router.resolve(ctx).await;
        let replica_error = match operation(resolved.route, resolved.source).await {
            Ok(value) => return Ok(value),
            Err(e) if resolved.route == Route::Replica && e.is_data_access() => e,
            Err(e) => return Err(e),
        };

        warn!(
            error = %replica_error,
            "🔀 Replica operation failed, retrying once on primary"
        );
        ctx.set_route(Route::Primary);
        let primary = self.router.resolve(ctx).await;

        match operation(primary.route, primary.source).await {
            Ok(value) => {
                info!("Operation succeeded on primary after replica failure");
                Ok(value)
            }
            Err(primary_error) => {
                warn!(
                    replica_error = %replica_error,
                    primary_error = %primary_error,
                    "❌ Operation failed on both data sources"
                );
                Err(DatabaseError::double_failure(replica_error, primary_error))
            }
        }
    }
}
