//! # Broker Abstraction
//!
//! Provider-agnostic operations over an AMQP-style broker: topology
//! declaration, publish to an exchange, pull deliveries, ack and reject.
//! Deliveries carry the broker-maintained Delivery-Failure History; its
//! length is the authoritative retry counter.

pub mod in_memory;
pub mod rabbitmq;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::MessagingResult;
use super::message::DeathRecord;
use super::topology::BrokerTopology;

pub use in_memory::InMemoryBroker;
pub use rabbitmq::RabbitMqBroker;

/// A message pulled from a queue, pending ack or reject
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Queue the delivery was received from
    pub queue: String,
    /// Broker-assigned tag used to ack or reject
    pub delivery_tag: u64,
    pub message_id: Option<String>,
    pub payload: Vec<u8>,
    pub redelivered: bool,
    /// Dead-lettering events, oldest first
    pub death_history: Vec<DeathRecord>,
}

impl Delivery {
    /// Deserialize the JSON payload
    pub fn decode<T: DeserializeOwned>(&self) -> MessagingResult<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Number of times this message has been dead-lettered
    pub fn retry_count(&self) -> usize {
        self.death_history.len()
    }
}

/// A message to publish
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutboundMessage {
    pub payload: Vec<u8>,
    pub message_id: Option<String>,
    /// History to carry forward (republished retries keep their count)
    pub death_history: Vec<DeathRecord>,
}

impl OutboundMessage {
    /// Serialize a value as the JSON payload
    pub fn json<T: Serialize>(value: &T) -> MessagingResult<Self> {
        Ok(Self {
            payload: serde_json::to_vec(value)?,
            message_id: Some(uuid::Uuid::new_v4().to_string()),
            death_history: Vec::new(),
        })
    }

    pub fn with_death_history(mut self, history: Vec<DeathRecord>) -> Self {
        self.death_history = history;
        self
    }
}

/// Core broker trait implemented by each provider
#[async_trait]
pub trait MessageBroker: Send + Sync + 'static {
    /// Declare exchange, queues, bindings and dead-letter arguments (idempotent)
    async fn declare_topology(&self, topology: &BrokerTopology) -> MessagingResult<()>;

    /// Publish to an exchange; fails when the broker does not accept the message
    /// or no queue is bound to the routing key
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> MessagingResult<()>;

    /// Pull up to `max_messages` ready deliveries
    async fn receive(&self, queue: &str, max_messages: usize) -> MessagingResult<Vec<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> MessagingResult<()>;

    /// Reject a delivery; without requeue the broker dead-letters it per the queue's arguments
    async fn reject(&self, delivery: &Delivery, requeue: bool) -> MessagingResult<()>;

    async fn health_check(&self) -> MessagingResult<bool>;

    fn provider_name(&self) -> &'static str;
}

/// Provider enum for static dispatch
#[derive(Debug)]
pub enum BrokerProvider {
    /// RabbitMQ via lapin
    RabbitMq(RabbitMqBroker),
    /// In-process broker for tests and local runs
    InMemory(InMemoryBroker),
}

impl BrokerProvider {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::RabbitMq(b) => b.provider_name(),
            Self::InMemory(b) => b.provider_name(),
        }
    }

    pub async fn declare_topology(&self, topology: &BrokerTopology) -> MessagingResult<()> {
        match self {
            Self::RabbitMq(b) => b.declare_topology(topology).await,
            Self::InMemory(b) => b.declare_topology(topology).await,
        }
    }

    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> MessagingResult<()> {
        match self {
            Self::RabbitMq(b) => b.publish(exchange, routing_key, message).await,
            Self::InMemory(b) => b.publish(exchange, routing_key, message).await,
        }
    }

    pub async fn receive(&self, queue: &str, max_messages: usize) -> MessagingResult<Vec<Delivery>> {
        match self {
            Self::RabbitMq(b) => b.receive(queue, max_messages).await,
            Self::InMemory(b) => b.receive(queue, max_messages).await,
        }
    }

    pub async fn ack(&self, delivery: &Delivery) -> MessagingResult<()> {
        match self {
            Self::RabbitMq(b) => b.ack(delivery).await,
            Self::InMemory(b) => b.ack(delivery).await,
        }
    }

    pub async fn reject(&self, delivery: &Delivery, requeue: bool) -> MessagingResult<()> {
        match self {
            Self::RabbitMq(b) => b.reject(delivery, requeue).await,
            Self::InMemory(b) => b.reject(delivery, requeue).await,
        }
    }

    pub async fn health_check(&self) -> MessagingResult<bool> {
        match self {
            Self::RabbitMq(b) => b.health_check().await,
            Self::InMemory(b) => b.health_check().await,
        }
    }
}

impl From<InMemoryBroker> for BrokerProvider {
    fn from(broker: InMemoryBroker) -> Self {
        Self::InMemory(broker)
    }
}

impl From<RabbitMqBroker> for BrokerProvider {
    fn from(broker: RabbitMqBroker) -> Self {
        Self::RabbitMq(broker)
    }
}
