//! # Broker Topology
//!
//! Declarative description of the exchange, queues and dead-letter wiring the
//! pipeline relies on. The retry holding queues have no consumers: the broker
//! keeps each message for the queue TTL and then dead-letters it onward, which
//! is the entire backoff mechanism.

use std::time::Duration;

use crate::config::TopologyConfig;

/// A durable queue bound to the topology exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDeclaration {
    pub name: String,
    /// Routing key binding the queue to the exchange
    pub binding_key: String,
    pub dead_letter_exchange: Option<String>,
    pub dead_letter_routing_key: Option<String>,
    /// Per-queue message TTL (`x-message-ttl`)
    pub message_ttl: Option<Duration>,
}

impl QueueDeclaration {
    pub fn new(name: impl Into<String>, binding_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding_key: binding_key.into(),
            dead_letter_exchange: None,
            dead_letter_routing_key: None,
            message_ttl: None,
        }
    }

    pub fn dead_letter_to(mut self, exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self.dead_letter_routing_key = Some(routing_key.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.message_ttl = Some(ttl);
        self
    }
}

/// Complete tracking-event topology: one direct exchange and four queues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerTopology {
    pub exchange: String,
    pub main_queue: QueueDeclaration,
    pub retry_queue: QueueDeclaration,
    pub dlq: QueueDeclaration,
    pub dlq_retry_queue: QueueDeclaration,
}

impl BrokerTopology {
    /// Build the topology from configuration
    ///
    /// ```text
    /// main queue      --reject-->  retry queue (TTL main_retry)  --expire-->  DLQ
    /// DLQ             --reject-->  DLQ retry queue (TTL retry_delay) --expire--> DLQ
    /// ```
    pub fn from_config(config: &TopologyConfig, retry_delay: Duration) -> Self {
        let exchange = config.exchange.clone();

        let main_queue = QueueDeclaration::new(&config.main_queue, &config.events_routing_key)
            .dead_letter_to(&exchange, &config.retry_routing_key);

        let retry_queue = QueueDeclaration::new(&config.retry_queue, &config.retry_routing_key)
            .dead_letter_to(&exchange, &config.dlq_routing_key)
            .with_ttl(Duration::from_secs(config.main_retry_ttl_seconds));

        let dlq = QueueDeclaration::new(&config.dlq, &config.dlq_routing_key)
            .dead_letter_to(&exchange, &config.dlq_retry_routing_key);

        let dlq_retry_queue =
            QueueDeclaration::new(&config.dlq_retry_queue, &config.dlq_retry_routing_key)
                .dead_letter_to(&exchange, &config.dlq_routing_key)
                .with_ttl(retry_delay);

        Self {
            exchange,
            main_queue,
            retry_queue,
            dlq,
            dlq_retry_queue,
        }
    }

    /// All queues in declaration order (holding queues before the queues that feed them)
    pub fn queues(&self) -> [&QueueDeclaration; 4] {
        [
            &self.dlq_retry_queue,
            &self.dlq,
            &self.retry_queue,
            &self.main_queue,
        ]
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues().iter().map(|q| q.name.clone()).collect()
    }

    /// Routing key for fresh Event Records
    pub fn events_routing_key(&self) -> &str {
        &self.main_queue.binding_key
    }

    /// Routing key that lands directly on the DLQ
    pub fn dlq_routing_key(&self) -> &str {
        &self.dlq.binding_key
    }

    /// Routing key of the DLQ retry holding queue
    pub fn dlq_retry_routing_key(&self) -> &str {
        &self.dlq_retry_queue.binding_key
    }

    /// Backoff window applied by the DLQ retry holding queue
    pub fn retry_delay(&self) -> Duration {
        self.dlq_retry_queue.message_ttl.unwrap_or_default()
    }
}

impl Default for BrokerTopology {
    fn default() -> Self {
        let config = TopologyConfig::default();
        Self::from_config(
            &config,
            Duration::from_secs(crate::constants::defaults::RETRY_DELAY_SECONDS),
        )
    }
}
