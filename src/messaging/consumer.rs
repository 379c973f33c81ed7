//! # Primary Consumer
//!
//! Consumes Event Records from the main queue. Each delivery moves
//! `RECEIVED -> PROCESSING -> {ACKED, REJECTED}`; a failed or late record is
//! wrapped in a Retry Envelope, published to the DLQ routing key, and the
//! original delivery is rejected without requeue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::broker::{BrokerProvider, Delivery, OutboundMessage};
use super::errors::MessagingResult;
use super::listener::DeliveryHandler;
use super::message::{RetryEnvelope, TrackingEventRequest, WorkerIdentity};
use super::processor::{invoke_with_deadline, EventProcessor};
use super::topology::BrokerTopology;
use crate::logging::{log_error, log_pipeline_operation};

/// Terminal state of one main-queue delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Acked,
    /// Envelope published to the DLQ, delivery rejected without requeue
    DeadLettered,
    /// Envelope could not be published; delivery rejected without requeue.
    /// The record reaches the DLQ bare and is dropped there, so the event is lost.
    DeadLetterPublishFailed,
    /// Payload was not an Event Record; rejected without requeue
    Undecodable,
}

#[derive(Clone)]
pub struct TrackingEventConsumer {
    broker: Arc<BrokerProvider>,
    processor: Arc<dyn EventProcessor>,
    queue: String,
    exchange: String,
    dlq_routing_key: String,
    deadline: Duration,
    consumer_instance: String,
}

impl std::fmt::Debug for TrackingEventConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingEventConsumer")
            .field("queue", &self.queue)
            .field("deadline", &self.deadline)
            .field("consumer_instance", &self.consumer_instance)
            .finish()
    }
}

impl TrackingEventConsumer {
    pub fn new(
        broker: Arc<BrokerProvider>,
        processor: Arc<dyn EventProcessor>,
        topology: &BrokerTopology,
        deadline: Duration,
        consumer_instance: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            processor,
            queue: topology.main_queue.name.clone(),
            exchange: topology.exchange.clone(),
            dlq_routing_key: topology.dlq_routing_key().to_string(),
            deadline,
            consumer_instance: consumer_instance.into(),
        }
    }

    /// Drive one delivery to ack or reject
    pub async fn handle_delivery(&self, delivery: Delivery) -> MessagingResult<ConsumeOutcome> {
        let event: TrackingEventRequest = match delivery.decode() {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    queue = %self.queue,
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Undecodable tracking event rejected"
                );
                self.broker.reject(&delivery, false).await?;
                return Ok(ConsumeOutcome::Undecodable);
            }
        };

        debug!(package_id = %event.package_id, "📥 Processing tracking event");

        match invoke_with_deadline(self.processor.clone(), event.clone(), self.deadline).await {
            Ok(()) => {
                self.broker.ack(&delivery).await?;
                log_pipeline_operation(
                    "consume",
                    &self.queue,
                    Some(&event.package_id),
                    None,
                    "acked",
                    None,
                );
                Ok(ConsumeOutcome::Acked)
            }
            Err(failure) => {
                warn!(
                    package_id = %event.package_id,
                    error_type = %failure.kind(),
                    error = %failure,
                    "⚠️ Tracking event processing failed, dispatching to DLQ"
                );

                let package_id = event.package_id.clone();
                let envelope = RetryEnvelope::from_failure(
                    event,
                    failure.kind(),
                    &failure,
                    WorkerIdentity::current(&self.consumer_instance),
                );
                let published = match self.send_to_dlq(&envelope).await {
                    Ok(()) => true,
                    Err(e) => {
                        log_error(
                            "tracking_event_consumer",
                            "dead_letter_publish",
                            &e.to_string(),
                            Some(&format!(
                                "package_id={package_id} routing_key={}: original rejected without requeue, \
                                 tracking event will be lost once it reaches the DLQ without an envelope",
                                self.dlq_routing_key
                            )),
                        );
                        false
                    }
                };

                self.broker.reject(&delivery, false).await?;
                log_pipeline_operation(
                    "consume",
                    &self.queue,
                    Some(&package_id),
                    None,
                    "rejected",
                    Some(&envelope.error_type),
                );

                Ok(if published {
                    ConsumeOutcome::DeadLettered
                } else {
                    ConsumeOutcome::DeadLetterPublishFailed
                })
            }
        }
    }

    async fn send_to_dlq(&self, envelope: &RetryEnvelope) -> MessagingResult<()> {
        let message = OutboundMessage::json(envelope)?;
        self.broker
            .publish(&self.exchange, &self.dlq_routing_key, message)
            .await
    }
}

#[async_trait]
impl DeliveryHandler for TrackingEventConsumer {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn handle(&self, delivery: Delivery) {
        let tag = delivery.delivery_tag;
        if let Err(e) = self.handle_delivery(delivery).await {
            error!(queue = %self.queue, delivery_tag = tag, error = %e, "Delivery settlement failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::topology::*;
    use crate::messaging::broker::{InMemoryBroker, MessageBroker};
    use crate::messaging::message::ErrorKind;
    use crate::messaging::processor::ProcessingError;
    use chrono::Utc;

    struct Outcome(Result<(), &'static str>);

    #[async_trait]
    impl EventProcessor for Outcome {
        async fn process(&self, _event: TrackingEventRequest) -> Result<(), ProcessingError> {
            self.0.map_err(ProcessingError::failed)
        }
    }

    struct Sleepy;

    #[async_trait]
    impl EventProcessor for Sleepy {
        async fn process(&self, _event: TrackingEventRequest) -> Result<(), ProcessingError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    async fn setup(processor: Arc<dyn EventProcessor>) -> (TrackingEventConsumer, InMemoryBroker) {
        let broker = InMemoryBroker::new();
        let topology = BrokerTopology::default();
        broker.declare_topology(&topology).await.unwrap();
        let event = TrackingEventRequest::new("pacote-12345", "DC-SP", "arrived", Utc::now());
        broker
            .publish(
                TRACKING_EVENTS_EXCHANGE,
                ROUTING_KEY_EVENTS,
                OutboundMessage::json(&event).unwrap(),
            )
            .await
            .unwrap();
        let consumer = TrackingEventConsumer::new(
            Arc::new(BrokerProvider::from(broker.clone())),
            processor,
            &topology,
            Duration::from_millis(1000),
            "event-consumer-test",
        );
        (consumer, broker)
    }

    async fn next(broker: &InMemoryBroker) -> Delivery {
        broker.receive(TRACKING_EVENTS_QUEUE, 1).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_success_acks() {
        let (consumer, broker) = setup(Arc::new(Outcome(Ok(())))).await;
        let outcome = consumer.handle_delivery(next(&broker).await).await.unwrap();

        assert_eq!(outcome, ConsumeOutcome::Acked);
        assert_eq!(broker.unacked_count(TRACKING_EVENTS_QUEUE), 0);
        assert_eq!(broker.queue_depth(TRACKING_EVENTS_DLQ), 0);
        assert_eq!(broker.queue_depth(TRACKING_EVENTS_RETRY_QUEUE), 0);
    }

    #[tokio::test]
    async fn test_failure_publishes_envelope_and_rejects() {
        let (consumer, broker) = setup(Arc::new(Outcome(Err("db down")))).await;
        let outcome = consumer.handle_delivery(next(&broker).await).await.unwrap();

        assert_eq!(outcome, ConsumeOutcome::DeadLettered);
        assert_eq!(broker.queue_depth(TRACKING_EVENTS_QUEUE), 0);
        // rejected original parks in the main retry queue
        assert_eq!(broker.queue_depth(TRACKING_EVENTS_RETRY_QUEUE), 1);

        let dlq = broker.ready_messages(TRACKING_EVENTS_DLQ);
        assert_eq!(dlq.len(), 1);
        assert!(dlq[0].death_history.is_empty());
        let envelope: RetryEnvelope = serde_json::from_slice(&dlq[0].payload).unwrap();
        assert_eq!(envelope.package_id(), Some("pacote-12345"));
        assert_eq!(envelope.error_kind(), Some(ErrorKind::ProcessingFailure));
        assert_eq!(envelope.error_message, "db down");
        assert_eq!(envelope.consumer_instance, "event-consumer-test");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_produces_timeout_envelope() {
        let (consumer, broker) = setup(Arc::new(Sleepy)).await;
        let outcome = consumer.handle_delivery(next(&broker).await).await.unwrap();

        assert_eq!(outcome, ConsumeOutcome::DeadLettered);
        let dlq = broker.ready_messages(TRACKING_EVENTS_DLQ);
        let envelope: RetryEnvelope = serde_json::from_slice(&dlq[0].payload).unwrap();
        assert_eq!(envelope.error_kind(), Some(ErrorKind::TimeoutFailure));
    }

    #[tokio::test]
    async fn test_undecodable_payload_rejected_without_requeue() {
        let broker = InMemoryBroker::new();
        let topology = BrokerTopology::default();
        broker.declare_topology(&topology).await.unwrap();
        broker
            .publish(
                TRACKING_EVENTS_EXCHANGE,
                ROUTING_KEY_EVENTS,
                OutboundMessage {
                    payload: b"not json".to_vec(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let consumer = TrackingEventConsumer::new(
            Arc::new(BrokerProvider::from(broker.clone())),
            Arc::new(Outcome(Ok(()))),
            &topology,
            Duration::from_millis(1000),
            "event-consumer-test",
        );

        let outcome = consumer.handle_delivery(next(&broker).await).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Undecodable);
        assert_eq!(broker.queue_depth(TRACKING_EVENTS_QUEUE), 0);
        assert_eq!(broker.queue_depth(TRACKING_EVENTS_RETRY_QUEUE), 1);
    }
}
