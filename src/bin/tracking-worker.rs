//! Tracking Worker Binary
//!
//! Runs the tracking-event pipeline (primary and dead-letter consumers), the
//! database health monitor and the routing status surface until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use tracking_core::config::{BrokerKind, ConfigManager};
use tracking_core::database::{
    DatabaseHealthMonitor, FailoverInterceptor, PooledDataSource, RoutingDataSource, RoutingState,
};
use tracking_core::logging::init_structured_logging;
use tracking_core::messaging::{
    BrokerProvider, BrokerTopology, DeadLetterConsumer, DlqRetryPolicy, InMemoryBroker,
    LoggingTerminalSink, QueueListener, RabbitMqBroker, TrackingEventConsumer,
};
use tracking_core::services::{PgTrackingEventStore, TrackingEventService};
use tracking_core::web::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("loading configuration")?;
    let config = manager.config();
    info!(environment = %manager.environment(), "🚀 Starting tracking worker");

    let topology = BrokerTopology::from_config(&config.topology, config.dlq.retry_delay());
    let broker = Arc::new(match config.broker.provider {
        BrokerKind::RabbitMq => BrokerProvider::from(
            RabbitMqBroker::connect(&config.broker)
                .await
                .context("connecting to RabbitMQ")?,
        ),
        BrokerKind::InMemory => BrokerProvider::from(InMemoryBroker::new()),
    });
    broker
        .declare_topology(&topology)
        .await
        .context("declaring broker topology")?;

    let probe_timeout = config.database.probe_timeout();
    let primary = PooledDataSource::connect_lazy("primary", &config.database.primary, probe_timeout)?;
    let replica = PooledDataSource::connect_lazy("replica", &config.database.replica, probe_timeout)?;
    let state = Arc::new(RoutingState::new());
    let router = Arc::new(RoutingDataSource::new(
        primary.clone(),
        replica.clone(),
        state.clone(),
    ));

    let store = PgTrackingEventStore::new(FailoverInterceptor::new(router));
    if let Err(e) = store.ensure_schema().await {
        error!(error = %e, "Could not ensure tracking_events schema; continuing");
    }
    let service = Arc::new(TrackingEventService::new(Arc::new(store)));

    let monitor = Arc::new(DatabaseHealthMonitor::new(
        primary,
        replica,
        state,
        config.health.auto_failover,
        config.health.check_interval(),
    ));

    let policy = Arc::new(DlqRetryPolicy::new(
        broker.clone(),
        &topology,
        config.dlq.max_retry_attempts,
        Arc::new(LoggingTerminalSink),
    ));
    let consumer = Arc::new(TrackingEventConsumer::new(
        broker.clone(),
        service.clone(),
        &topology,
        config.consumer.main_deadline(),
        config.consumer.consumer_instance(),
    ));
    let dlq_consumer = Arc::new(DeadLetterConsumer::new(
        broker.clone(),
        service,
        policy,
        &topology,
        config.consumer.dlq_deadline(),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = Vec::new();

    let main_listener = QueueListener::new(
        broker.clone(),
        consumer,
        config.consumer.batch_size,
        config.consumer.poll_interval(),
        config.consumer.max_in_flight,
    );
    tasks.push(tokio::spawn(main_listener.run(shutdown_tx.subscribe())));

    let dlq_listener = QueueListener::new(
        broker.clone(),
        dlq_consumer,
        config.consumer.batch_size,
        config.consumer.poll_interval(),
        config.consumer.max_in_flight,
    );
    tasks.push(tokio::spawn(dlq_listener.run(shutdown_tx.subscribe())));

    tasks.push(tokio::spawn(monitor.clone().run(shutdown_tx.subscribe())));

    if config.web.enabled {
        let bind_address = config.web.bind_address.clone();
        let app_state = AppState::new(monitor);
        let shutdown_rx = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = web::serve(&bind_address, app_state, shutdown_rx).await {
                error!(address = %bind_address, error = %e, "Status surface failed");
            }
        }));
    }

    info!(
        provider = broker.provider_name(),
        queues = ?topology.queue_names(),
        "✅ Tracking worker running"
    );

    signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Worker task ended abnormally");
        }
    }

    info!("🛑 Tracking worker stopped");
    Ok(())
}
