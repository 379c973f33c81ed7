//! # DLQ Retry Policy
//!
//! Decides whether a dead-lettered envelope gets another attempt, dispatches
//! it to the DLQ retry holding queue, or hands it to the Terminal Sink. The
//! only retry counter is the broker's Delivery-Failure History carried on the
//! delivery; nothing is counted in process.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::broker::{BrokerProvider, Delivery, OutboundMessage};
use super::errors::MessagingResult;
use super::message::{DeathRecord, RetryEnvelope};
use super::sink::TerminalSink;
use super::topology::BrokerTopology;

/// Attempt counter plus the history behind it, for operators
#[derive(Debug, Clone, PartialEq)]
pub struct RetryInfo {
    pub attempts: usize,
    pub max_attempts: u32,
    pub history: Vec<DeathRecord>,
}

impl RetryInfo {
    pub fn from_delivery(delivery: &Delivery, max_attempts: u32) -> Self {
        Self {
            attempts: delivery.retry_count(),
            max_attempts,
            history: delivery.death_history.clone(),
        }
    }
}

impl fmt::Display for RetryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attempts: {}/{}", self.attempts, self.max_attempts)?;
        for record in &self.history {
            write!(
                f,
                "\n  Exchange: {}, Queue: {}, Reason: {}, Time: {}",
                record.exchange,
                record.queue,
                record.reason,
                record.time.to_rfc3339()
            )?;
        }
        Ok(())
    }
}

/// Bounded-retry policy for the dead-letter path
pub struct DlqRetryPolicy {
    broker: Arc<BrokerProvider>,
    exchange: String,
    retry_routing_key: String,
    max_retry_attempts: u32,
    sink: Arc<dyn TerminalSink>,
}

impl fmt::Debug for DlqRetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DlqRetryPolicy")
            .field("exchange", &self.exchange)
            .field("retry_routing_key", &self.retry_routing_key)
            .field("max_retry_attempts", &self.max_retry_attempts)
            .finish()
    }
}

impl DlqRetryPolicy {
    pub fn new(
        broker: Arc<BrokerProvider>,
        topology: &BrokerTopology,
        max_retry_attempts: u32,
        sink: Arc<dyn TerminalSink>,
    ) -> Self {
        Self {
            broker,
            exchange: topology.exchange.clone(),
            retry_routing_key: topology.dlq_retry_routing_key().to_string(),
            max_retry_attempts,
            sink,
        }
    }

    pub fn max_retry_attempts(&self) -> u32 {
        self.max_retry_attempts
    }

    /// Eligible iff the history is shorter than the attempt limit
    pub fn should_retry(&self, delivery: &Delivery) -> bool {
        should_retry(delivery.retry_count(), self.max_retry_attempts)
    }

    pub fn retry_count(&self, delivery: &Delivery) -> usize {
        delivery.retry_count()
    }

    pub fn retry_info(&self, delivery: &Delivery) -> RetryInfo {
        RetryInfo::from_delivery(delivery, self.max_retry_attempts)
    }

    /// Stamp a fresh failure time and republish to the DLQ retry holding queue
    ///
    /// The delivery's history travels with the message so the count keeps
    /// growing across cycles.
    pub async fn send_to_retry(
        &self,
        mut envelope: RetryEnvelope,
        delivery: &Delivery,
    ) -> MessagingResult<()> {
        let retry_count = self.retry_count(delivery);
        envelope.touch();

        let message = OutboundMessage::json(&envelope)?
            .with_death_history(delivery.death_history.clone());

        match self
            .broker
            .publish(&self.exchange, &self.retry_routing_key, message)
            .await
        {
            Ok(()) => {
                info!(
                    package_id = envelope.package_id().unwrap_or("<missing>"),
                    retry_count = retry_count,
                    max_attempts = self.max_retry_attempts,
                    routing_key = %self.retry_routing_key,
                    "🔁 Envelope scheduled for DLQ retry"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    package_id = envelope.package_id().unwrap_or("<missing>"),
                    retry_count = retry_count,
                    error = %e,
                    "Failed to dispatch envelope to DLQ retry queue"
                );
                Err(e)
            }
        }
    }

    /// Terminal: hand the envelope to the sink; never dispatched again
    pub async fn mark_permanently_failed(&self, envelope: &RetryEnvelope, delivery: &Delivery) {
        let info = self.retry_info(delivery);
        if let Err(e) = self.sink.record(envelope, &info).await {
            warn!(
                package_id = envelope.package_id().unwrap_or("<missing>"),
                retry_count = info.attempts,
                error = %e,
                "Terminal sink failed to record exhausted envelope"
            );
        }
    }
}

/// Retry eligibility: `retry_count < max_retry_attempts`
pub fn should_retry(retry_count: usize, max_retry_attempts: u32) -> bool {
    retry_count < max_retry_attempts as usize
}
