//! # Data Sources
//!
//! A data source is one physical database (primary or replica) behind a
//! bounded connection pool. Pools are connected lazily so an unreachable
//! replica does not prevent startup; liveness is established by probes.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use super::errors::{DatabaseError, DatabaseResult};
use crate::config::{redact_url, DataSourceConfig};

/// A routable database
#[async_trait]
pub trait DataSource: Clone + Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Cheap liveness check: obtain and release one connection under a short timeout
    async fn probe(&self) -> DatabaseResult<()>;

    /// Validity check used by the health monitor
    async fn health_check(&self) -> DatabaseResult<()> {
        self.probe().await
    }
}

/// Postgres data source backed by a lazily connected `sqlx` pool
#[derive(Debug, Clone)]
pub struct PooledDataSource {
    name: String,
    pool: PgPool,
    probe_timeout: Duration,
}

impl PooledDataSource {
    /// Build the pool without connecting
    pub fn connect_lazy(
        name: impl Into<String>,
        config: &DataSourceConfig,
        probe_timeout: Duration,
    ) -> DatabaseResult<Self> {
        let name = name.into();
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .max_lifetime(Some(config.max_lifetime()))
            .connect_lazy(&config.url)
            .map_err(|e| DatabaseError::pool_configuration(&name, e.to_string()))?;

        info!(
            source = %name,
            url = %redact_url(&config.url),
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "🗄️ Data source pool configured"
        );

        Ok(Self {
            name,
            pool,
            probe_timeout,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.probe_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl DataSource for PooledDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> DatabaseResult<()> {
        match tokio::time::timeout(self.probe_timeout, self.pool.acquire()).await {
            Ok(Ok(_connection)) => Ok(()),
            Ok(Err(e)) => Err(DatabaseError::probe_failed(&self.name, e.to_string())),
            Err(_) => Err(DatabaseError::probe_timeout(&self.name, self.timeout_ms())),
        }
    }

    async fn health_check(&self) -> DatabaseResult<()> {
        let query = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool);
        match tokio::time::timeout(self.probe_timeout, query).await {
            Ok(Ok(1)) => Ok(()),
            Ok(Ok(other)) => Err(DatabaseError::probe_failed(
                &self.name,
                format!("unexpected health query result {other}"),
            )),
            Ok(Err(e)) => Err(DatabaseError::probe_failed(&self.name, e.to_string())),
            Err(_) => Err(DatabaseError::probe_timeout(&self.name, self.timeout_ms())),
        }
    }
}
