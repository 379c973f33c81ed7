//! # Dead-Letter Consumer
//!
//! Consumes Retry Envelopes from the DLQ:
//!
//! 1. structurally invalid envelopes (no inner record) are logged and dropped
//! 2. the retry count is the length of the delivery's failure history
//! 3. exhausted envelopes go to the Terminal Sink
//! 4. otherwise the record is reprocessed under the DLQ deadline
//! 5. a renewed failure is sent to the DLQ retry holding queue
//!
//! Every branch acks the DLQ delivery except the fallback: when the retry
//! publish itself fails, the delivery is rejected without requeue and the
//! DLQ's dead-letter arguments park it in the same holding queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::broker::{BrokerProvider, Delivery};
use super::errors::MessagingResult;
use super::listener::DeliveryHandler;
use super::message::RetryEnvelope;
use super::processor::{invoke_with_deadline, EventProcessor};
use super::retry_policy::DlqRetryPolicy;
use super::topology::BrokerTopology;
use crate::logging::log_pipeline_operation;

/// Terminal state of one DLQ delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlqOutcome {
    /// Reprocessing succeeded
    Recovered { retry_count: usize },
    /// Reprocessing failed again; envelope is in the DLQ retry holding queue
    RetryScheduled { retry_count: usize },
    /// Attempts exhausted; envelope recorded by the Terminal Sink
    PermanentlyFailed { retry_count: usize },
    /// Retry publish failed; delivery rejected so the broker dead-letters it
    RejectedForRetry { retry_count: usize },
    /// No inner Event Record; logged and acked
    Dropped,
}

#[derive(Clone)]
pub struct DeadLetterConsumer {
    broker: Arc<BrokerProvider>,
    processor: Arc<dyn EventProcessor>,
    policy: Arc<DlqRetryPolicy>,
    queue: String,
    deadline: Duration,
}

impl std::fmt::Debug for DeadLetterConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterConsumer")
            .field("queue", &self.queue)
            .field("deadline", &self.deadline)
            .field("policy", &self.policy)
            .finish()
    }
}

impl DeadLetterConsumer {
    pub fn new(
        broker: Arc<BrokerProvider>,
        processor: Arc<dyn EventProcessor>,
        policy: Arc<DlqRetryPolicy>,
        topology: &BrokerTopology,
        deadline: Duration,
    ) -> Self {
        Self {
            broker,
            processor,
            policy,
            queue: topology.dlq.name.clone(),
            deadline,
        }
    }

    pub async fn handle_delivery(&self, delivery: Delivery) -> MessagingResult<DlqOutcome> {
        let envelope = match delivery.decode::<RetryEnvelope>() {
            Ok(envelope) if envelope.is_well_formed() => envelope,
            Ok(_) => {
                error!(
                    queue = %self.queue,
                    delivery_tag = delivery.delivery_tag,
                    retry_count = delivery.retry_count(),
                    "🗑️ Retry envelope has no original message, dropping"
                );
                self.broker.ack(&delivery).await?;
                return Ok(DlqOutcome::Dropped);
            }
            Err(e) => {
                error!(
                    queue = %self.queue,
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "🗑️ Undecodable DLQ payload, dropping"
                );
                self.broker.ack(&delivery).await?;
                return Ok(DlqOutcome::Dropped);
            }
        };

        let retry_count = self.policy.retry_count(&delivery);
        let package_id = envelope.package_id().unwrap_or_default().to_string();

        if !self.policy.should_retry(&delivery) {
            self.policy
                .mark_permanently_failed(&envelope, &delivery)
                .await;
            self.broker.ack(&delivery).await?;
            log_pipeline_operation(
                "dlq",
                &self.queue,
                Some(&package_id),
                Some(retry_count),
                "permanently_failed",
                Some(&envelope.error_type),
            );
            return Ok(DlqOutcome::PermanentlyFailed { retry_count });
        }

        let Some(event) = envelope.original_message.clone() else {
            self.broker.ack(&delivery).await?;
            return Ok(DlqOutcome::Dropped);
        };

        info!(
            package_id = %package_id,
            retry_count = retry_count,
            max_attempts = self.policy.max_retry_attempts(),
            "🔄 Reprocessing dead-lettered tracking event"
        );

        match invoke_with_deadline(self.processor.clone(), event, self.deadline).await {
            Ok(()) => {
                self.broker.ack(&delivery).await?;
                log_pipeline_operation(
                    "dlq",
                    &self.queue,
                    Some(&package_id),
                    Some(retry_count),
                    "recovered",
                    None,
                );
                Ok(DlqOutcome::Recovered { retry_count })
            }
            Err(failure) => {
                warn!(
                    package_id = %package_id,
                    retry_count = retry_count,
                    error_type = %failure.kind(),
                    error = %failure,
                    "DLQ reprocessing failed"
                );

                match self.policy.send_to_retry(envelope, &delivery).await {
                    Ok(()) => {
                        self.broker.ack(&delivery).await?;
                        Ok(DlqOutcome::RetryScheduled { retry_count })
                    }
                    Err(_) => {
                        self.broker.reject(&delivery, false).await?;
                        warn!(
                            package_id = %package_id,
                            retry_count = retry_count,
                            "DLQ delivery rejected for broker-side dead-lettering"
                        );
                        Ok(DlqOutcome::RejectedForRetry { retry_count })
                    }
                }
            }
        }
    }
}

#[async_trait]
impl DeliveryHandler for DeadLetterConsumer {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn handle(&self, delivery: Delivery) {
        let tag = delivery.delivery_tag;
        if let Err(e) = self.handle_delivery(delivery).await {
            error!(queue = %self.queue, delivery_tag = tag, error = %e, "DLQ delivery settlement failed");
        }
    }
}
