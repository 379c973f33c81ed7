//! # Queue Listener
//!
//! Poll loop that pulls deliveries from one queue and spawns a short-lived
//! task per delivery. At most `max_in_flight` delivery tasks run at once:
//! each holds a semaphore permit until it settles, and the listener only
//! receives as many messages as there are free permits. Stops on a broadcast
//! shutdown signal; in-flight delivery tasks are left to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info, warn};

use super::broker::{BrokerProvider, Delivery};

/// Per-delivery work driven by a [`QueueListener`]
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    /// Queue this handler consumes
    fn queue(&self) -> &str;

    /// Settle one delivery (ack or reject); errors are the handler's to log
    async fn handle(&self, delivery: Delivery);
}

pub struct QueueListener<H: DeliveryHandler> {
    broker: Arc<BrokerProvider>,
    handler: Arc<H>,
    batch_size: usize,
    poll_interval: Duration,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
}

impl<H: DeliveryHandler> QueueListener<H> {
    pub fn new(
        broker: Arc<BrokerProvider>,
        handler: Arc<H>,
        batch_size: usize,
        poll_interval: Duration,
        max_in_flight: usize,
    ) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            broker,
            handler,
            batch_size: batch_size.max(1),
            poll_interval,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    /// Delivery tasks currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    /// Pull up to the free permit count and spawn a task per delivery;
    /// returns how many were dispatched
    pub async fn poll_once(&self) -> usize {
        let queue = self.handler.queue();
        let capacity = self.permits.available_permits().min(self.batch_size);
        if capacity == 0 {
            debug!(queue = %queue, in_flight = self.in_flight(), "At in-flight limit, skipping receive");
            return 0;
        }

        match self.broker.receive(queue, capacity).await {
            Ok(deliveries) => {
                let count = deliveries.len();
                for delivery in deliveries {
                    let handler = self.handler.clone();
                    // only this loop acquires and the semaphore is never closed
                    let permit = self.permits.clone().acquire_owned().await.ok();
                    tokio::spawn(async move {
                        handler.handle(delivery).await;
                        drop(permit);
                    });
                }
                if count > 0 {
                    debug!(queue = %queue, count = count, "Dispatched deliveries");
                }
                count
            }
            Err(e) => {
                warn!(queue = %queue, error = %e, "Receive failed, backing off");
                0
            }
        }
    }

    /// Run until shutdown is signalled
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let queue = self.handler.queue().to_string();
        info!(queue = %queue, provider = self.broker.provider_name(), "👂 Queue listener started");

        loop {
            let dispatched = tokio::select! {
                dispatched = self.poll_once() => dispatched,
                _ = shutdown_rx.recv() => break,
            };

            if dispatched < self.batch_size {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = shutdown_rx.recv() => break,
                }
            }
        }

        info!(queue = %queue, "🛑 Queue listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::broker::{InMemoryBroker, MessageBroker, OutboundMessage};
    use crate::messaging::topology::BrokerTopology;
    use crate::constants::topology::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Collecting {
        seen: Arc<Mutex<Vec<Vec<u8>>>>,
        broker: Arc<BrokerProvider>,
    }

    #[async_trait]
    impl DeliveryHandler for Collecting {
        fn queue(&self) -> &str {
            TRACKING_EVENTS_QUEUE
        }

        async fn handle(&self, delivery: Delivery) {
            self.seen.lock().push(delivery.payload.clone());
            let _ = self.broker.ack(&delivery).await;
        }
    }

    #[tokio::test]
    async fn test_listener_dispatches_and_stops_on_shutdown() {
        let broker = InMemoryBroker::new();
        broker
            .declare_topology(&BrokerTopology::default())
            .await
            .unwrap();
        for body in ["a", "b", "c"] {
            broker
                .publish(
                    TRACKING_EVENTS_EXCHANGE,
                    ROUTING_KEY_EVENTS,
                    OutboundMessage {
                        payload: body.as_bytes().to_vec(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let provider = Arc::new(BrokerProvider::from(broker.clone()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(Collecting {
            seen: seen.clone(),
            broker: provider.clone(),
        });
        let listener = QueueListener::new(provider, handler, 10, Duration::from_millis(10), 4);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let running = tokio::spawn(listener.run(shutdown_rx));

        for _ in 0..100 {
            if seen.lock().len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(seen.lock().len(), 3);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("listener should stop")
            .unwrap();
        assert_eq!(broker.unacked_count(TRACKING_EVENTS_QUEUE), 0);
    }

    struct Slow {
        current: AtomicUsize,
        peak: AtomicUsize,
        handled: AtomicUsize,
        broker: Arc<BrokerProvider>,
    }

    #[async_trait]
    impl DeliveryHandler for Slow {
        fn queue(&self) -> &str {
            TRACKING_EVENTS_QUEUE
        }

        async fn handle(&self, delivery: Delivery) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            let _ = self.broker.ack(&delivery).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.handled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_deliveries_bounded_by_permits() {
        let broker = InMemoryBroker::new();
        broker
            .declare_topology(&BrokerTopology::default())
            .await
            .unwrap();
        for i in 0..50 {
            broker
                .publish(
                    TRACKING_EVENTS_EXCHANGE,
                    ROUTING_KEY_EVENTS,
                    OutboundMessage {
                        payload: format!("m{i}").into_bytes(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let provider = Arc::new(BrokerProvider::from(broker.clone()));
        let handler = Arc::new(Slow {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            handled: AtomicUsize::new(0),
            broker: provider.clone(),
        });
        let listener =
            QueueListener::new(provider, handler.clone(), 10, Duration::from_millis(10), 4);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let running = tokio::spawn(listener.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handler.current.load(Ordering::SeqCst), 4);
        assert_eq!(broker.unacked_count(TRACKING_EVENTS_QUEUE), 4);
        assert_eq!(broker.queue_depth(TRACKING_EVENTS_QUEUE), 46);

        // work keeps draining as permits free up, never above the limit
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(handler.handled.load(Ordering::SeqCst) >= 8);
        assert_eq!(handler.peak.load(Ordering::SeqCst), 4);

        shutdown_tx.send(()).unwrap();
        running.await.unwrap();
    }
}
