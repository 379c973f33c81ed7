//! # PostgreSQL Tracking Event Store
//!
//! Writes are pinned to PRIMARY. Reads start from the router's default
//! (REPLICA unless the health monitor moved it) and fail over through the
//! [`FailoverInterceptor`].

use async_trait::async_trait;
use tracing::debug;

use super::tracking_event_service::{TrackingEvent, TrackingEventStore};
use crate::database::{
    DataSource, DatabaseResult, FailoverInterceptor, PooledDataSource, Route, RouteContext,
};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS tracking_events (
        id UUID PRIMARY KEY,
        package_id VARCHAR(50) NOT NULL,
        location VARCHAR(200) NOT NULL,
        description VARCHAR(500) NOT NULL,
        event_time TIMESTAMPTZ NOT NULL
    )
"#;

const CREATE_INDEX_SQL: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_tracking_events_package_time
        ON tracking_events (package_id, event_time)
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO tracking_events (id, package_id, location, description, event_time)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (id) DO NOTHING
"#;

const SELECT_BY_PACKAGE_SQL: &str = r#"
    SELECT id, package_id, location, description, event_time
    FROM tracking_events
    WHERE package_id = $1
    ORDER BY event_time ASC
"#;

#[derive(Debug, Clone)]
pub struct PgTrackingEventStore {
    interceptor: FailoverInterceptor<PooledDataSource>,
}

impl PgTrackingEventStore {
    pub fn new(interceptor: FailoverInterceptor<PooledDataSource>) -> Self {
        Self { interceptor }
    }

    /// Create the table on PRIMARY when missing
    pub async fn ensure_schema(&self) -> DatabaseResult<()> {
        let mut ctx = RouteContext::pinned(Route::Primary);
        self.interceptor
            .execute(&mut ctx, |_, source| create_schema(source))
            .await
    }
}

async fn create_schema(source: PooledDataSource) -> DatabaseResult<()> {
    sqlx::query(CREATE_TABLE_SQL).execute(source.pool()).await?;
    sqlx::query(CREATE_INDEX_SQL).execute(source.pool()).await?;
    Ok(())
}

async fn insert_event(source: PooledDataSource, event: TrackingEvent) -> DatabaseResult<bool> {
    let result = sqlx::query(INSERT_SQL)
        .bind(event.id)
        .bind(&event.package_id)
        .bind(&event.location)
        .bind(&event.description)
        .bind(event.event_time)
        .execute(source.pool())
        .await?;
    Ok(result.rows_affected() == 1)
}

async fn select_by_package(
    route: Route,
    source: PooledDataSource,
    package_id: String,
) -> DatabaseResult<Vec<TrackingEvent>> {
    debug!(
        route = %route,
        source = %source.name(),
        package_id = %package_id,
        "Loading tracking events"
    );
    let events = sqlx::query_as::<_, TrackingEvent>(SELECT_BY_PACKAGE_SQL)
        .bind(&package_id)
        .fetch_all(source.pool())
        .await?;
    Ok(events)
}

#[async_trait]
impl TrackingEventStore for PgTrackingEventStore {
    async fn save(&self, event: &TrackingEvent) -> DatabaseResult<bool> {
        let mut ctx = RouteContext::pinned(Route::Primary);
        self.interceptor
            .execute(&mut ctx, |_, source| insert_event(source, event.clone()))
            .await
    }

    async fn find_by_package(&self, package_id: &str) -> DatabaseResult<Vec<TrackingEvent>> {
        let mut ctx = RouteContext::new();
        self.interceptor
            .execute(&mut ctx, |route, source| {
                select_by_package(route, source, package_id.to_string())
            })
            .await
    }
}
