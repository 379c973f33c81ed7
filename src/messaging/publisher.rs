//! Publisher: validated Event Records onto the tracking exchange.

use std::sync::Arc;

use tracing::{debug, error};

use super::broker::{BrokerProvider, OutboundMessage};
use super::message::TrackingEventRequest;
use super::topology::BrokerTopology;
use crate::error::{Result, TrackingError};

/// Fire-and-forget ingress: success means the broker accepted the record
#[derive(Debug, Clone)]
pub struct TrackingEventPublisher {
    broker: Arc<BrokerProvider>,
    exchange: String,
    routing_key: String,
}

impl TrackingEventPublisher {
    pub fn new(broker: Arc<BrokerProvider>, topology: &BrokerTopology) -> Self {
        Self {
            broker,
            exchange: topology.exchange.clone(),
            routing_key: topology.events_routing_key().to_string(),
        }
    }

    /// Validate, serialize and publish; no local retry
    pub async fn publish(&self, event: &TrackingEventRequest) -> Result<()> {
        event.validate()?;

        let message = OutboundMessage::json(event)?;
        self.broker
            .publish(&self.exchange, &self.routing_key, message)
            .await
            .map_err(|e| {
                error!(
                    package_id = %event.package_id,
                    exchange = %self.exchange,
                    routing_key = %self.routing_key,
                    error = %e,
                    "❌ Failed to publish tracking event"
                );
                TrackingError::from(e)
            })?;

        debug!(
            package_id = %event.package_id,
            routing_key = %self.routing_key,
            "📤 Tracking event published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::topology::*;
    use crate::messaging::broker::{InMemoryBroker, MessageBroker};
    use crate::messaging::MessagingError;
    use chrono::Utc;

    async fn publisher() -> (TrackingEventPublisher, InMemoryBroker) {
        let broker = InMemoryBroker::new();
        let topology = BrokerTopology::default();
        broker.declare_topology(&topology).await.unwrap();
        (
            TrackingEventPublisher::new(Arc::new(BrokerProvider::from(broker.clone())), &topology),
            broker,
        )
    }

    #[tokio::test]
    async fn test_publish_lands_on_main_queue() {
        let (publisher, broker) = publisher().await;
        let event = TrackingEventRequest::new("pacote-12345", "DC-SP", "arrived", Utc::now());

        publisher.publish(&event).await.unwrap();

        let queued = broker.ready_messages(TRACKING_EVENTS_QUEUE);
        assert_eq!(queued.len(), 1);
        let decoded: TrackingEventRequest = serde_json::from_slice(&queued[0].payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    async fn test_invalid_event_is_not_published() {
        let (publisher, broker) = publisher().await;
        let event = TrackingEventRequest::new("bad id!", "DC-SP", "arrived", Utc::now());

        let err = publisher.publish(&event).await.unwrap_err();
        assert!(matches!(err, TrackingError::Validation(_)));
        assert_eq!(broker.queue_depth(TRACKING_EVENTS_QUEUE), 0);
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_terminal_for_caller() {
        let (publisher, broker) = publisher().await;
        broker.set_unreachable(true);
        let event = TrackingEventRequest::new("pacote-1", "DC-SP", "arrived", Utc::now());

        let err = publisher.publish(&event).await.unwrap_err();
        assert!(matches!(
            err,
            TrackingError::Messaging(MessagingError::BrokerUnreachable { .. })
        ));
    }
}
