//! # In-Memory Broker
//!
//! Thread-safe in-process broker with the subset of AMQP semantics the
//! pipeline depends on.
//!
//! ## Features
//!
//! - **Direct exchanges**: exact routing-key bindings, unroutable publishes fail
//! - **Dead-lettering**: rejected (no requeue) and expired messages move to the
//!   queue's dead-letter exchange with a new history entry appended
//! - **Message TTL**: expiry is evaluated lazily on every broker interaction,
//!   measured with `tokio::time::Instant` so paused-clock tests can advance it
//! - **Unreachable switch**: simulates a broker outage for publisher tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{Delivery, MessageBroker, OutboundMessage};
use crate::constants::headers::{REASON_EXPIRED, REASON_REJECTED};
use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::message::DeathRecord;
use crate::messaging::topology::{BrokerTopology, QueueDeclaration};

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: Option<String>,
    payload: Vec<u8>,
    /// Exchange the message was last published or dead-lettered through
    exchange: String,
    routing_key: String,
    death_history: Vec<DeathRecord>,
    enqueued_at: Instant,
    redelivered: bool,
}

#[derive(Debug)]
struct QueueState {
    declaration: QueueDeclaration,
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, StoredMessage>,
}

#[derive(Debug, Default)]
struct BrokerState {
    exchanges: HashSet<String>,
    /// (exchange, routing key) -> bound queues
    bindings: HashMap<(String, String), Vec<String>>,
    queues: HashMap<String, QueueState>,
    next_delivery_tag: u64,
    unreachable: bool,
}

/// Ready message as seen by tests
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub message_id: Option<String>,
    pub payload: Vec<u8>,
    pub death_history: Vec<DeathRecord>,
}

impl BrokerState {
    fn ensure_reachable(&self) -> MessagingResult<()> {
        if self.unreachable {
            Err(MessagingError::broker_unreachable("in-memory broker is offline"))
        } else {
            Ok(())
        }
    }

    fn route(&mut self, exchange: &str, routing_key: &str, message: StoredMessage) -> usize {
        let targets = self
            .bindings
            .get(&(exchange.to_string(), routing_key.to_string()))
            .cloned()
            .unwrap_or_default();
        for queue_name in &targets {
            if let Some(queue) = self.queues.get_mut(queue_name) {
                let mut copy = message.clone();
                copy.enqueued_at = Instant::now();
                queue.ready.push_back(copy);
            }
        }
        targets.len()
    }

    /// Dead-letter a message out of `queue_name`; dropped when the queue has no DLX
    fn dead_letter(&mut self, queue_name: &str, mut message: StoredMessage, reason: &str) {
        let Some(declaration) = self.queues.get(queue_name).map(|q| q.declaration.clone()) else {
            return;
        };
        let Some(dlx) = declaration.dead_letter_exchange else {
            return;
        };
        let routing_key = declaration
            .dead_letter_routing_key
            .unwrap_or_else(|| message.routing_key.clone());

        message.death_history.push(DeathRecord::new(
            message.exchange.clone(),
            queue_name,
            reason,
            Utc::now(),
        ));
        message.exchange = dlx.clone();
        message.routing_key = routing_key.clone();
        message.redelivered = false;

        if self.route(&dlx, &routing_key, message) == 0 {
            tracing::warn!(
                queue = %queue_name,
                dead_letter_exchange = %dlx,
                routing_key = %routing_key,
                "Dead-lettered message dropped: no queue bound"
            );
        }
    }

    /// Expire messages at the head of TTL queues until nothing is due
    fn expire_due(&mut self) {
        loop {
            let now = Instant::now();
            let mut expired = Vec::new();
            for (name, queue) in &mut self.queues {
                let Some(ttl) = queue.declaration.message_ttl else {
                    continue;
                };
                while queue
                    .ready
                    .front()
                    .is_some_and(|m| now.duration_since(m.enqueued_at) >= ttl)
                {
                    if let Some(message) = queue.ready.pop_front() {
                        expired.push((name.clone(), message));
                    }
                }
            }
            if expired.is_empty() {
                return;
            }
            for (queue_name, message) in expired {
                self.dead_letter(&queue_name, message, REASON_EXPIRED);
            }
        }
    }
}

/// In-memory broker; clones share the same state
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a broker outage (publish/receive/ack fail with `BrokerUnreachable`)
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Expire every ready message in a TTL queue now, regardless of age
    ///
    /// Returns the number of messages dead-lettered.
    pub fn force_expire(&self, queue: &str) -> usize {
        let mut state = self.state.lock();
        let drained: Vec<StoredMessage> = match state.queues.get_mut(queue) {
            Some(q) => q.ready.drain(..).collect(),
            None => return 0,
        };
        let count = drained.len();
        for message in drained {
            state.dead_letter(queue, message, REASON_EXPIRED);
        }
        count
    }

    /// Ready (not yet received) messages in a queue
    pub fn queue_depth(&self, queue: &str) -> usize {
        let mut state = self.state.lock();
        state.expire_due();
        state.queues.get(queue).map_or(0, |q| q.ready.len())
    }

    /// Received but neither acked nor rejected
    pub fn unacked_count(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.unacked.len())
    }

    /// Snapshot of the ready messages in a queue, head first
    pub fn ready_messages(&self, queue: &str) -> Vec<QueuedMessage> {
        let mut state = self.state.lock();
        state.expire_due();
        state
            .queues
            .get(queue)
            .map(|q| {
                q.ready
                    .iter()
                    .map(|m| QueuedMessage {
                        message_id: m.message_id.clone(),
                        payload: m.payload.clone(),
                        death_history: m.death_history.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_topology(&self, topology: &BrokerTopology) -> MessagingResult<()> {
        let mut state = self.state.lock();
        state.ensure_reachable()?;

        state.exchanges.insert(topology.exchange.clone());
        for declaration in topology.queues() {
            let key = (topology.exchange.clone(), declaration.binding_key.clone());
            let bound = state.bindings.entry(key).or_default();
            if !bound.contains(&declaration.name) {
                bound.push(declaration.name.clone());
            }
            state
                .queues
                .entry(declaration.name.clone())
                .or_insert_with(|| QueueState {
                    declaration: declaration.clone(),
                    ready: VecDeque::new(),
                    unacked: HashMap::new(),
                });
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> MessagingResult<()> {
        let mut state = self.state.lock();
        state.ensure_reachable()?;
        state.expire_due();

        if !state.exchanges.contains(exchange) {
            return Err(MessagingError::publish(
                exchange,
                routing_key,
                "exchange not declared",
            ));
        }

        let stored = StoredMessage {
            message_id: message.message_id,
            payload: message.payload,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            death_history: message.death_history,
            enqueued_at: Instant::now(),
            redelivered: false,
        };
        if state.route(exchange, routing_key, stored) == 0 {
            return Err(MessagingError::unroutable(exchange, routing_key));
        }
        Ok(())
    }

    async fn receive(&self, queue: &str, max_messages: usize) -> MessagingResult<Vec<Delivery>> {
        let mut state = self.state.lock();
        state.ensure_reachable()?;
        state.expire_due();

        let mut taken = Vec::new();
        {
            let queue_state = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| MessagingError::queue_not_found(queue))?;
            while taken.len() < max_messages {
                match queue_state.ready.pop_front() {
                    Some(message) => taken.push(message),
                    None => break,
                }
            }
        }

        let mut deliveries = Vec::with_capacity(taken.len());
        for message in taken {
            state.next_delivery_tag += 1;
            let delivery_tag = state.next_delivery_tag;
            deliveries.push(Delivery {
                queue: queue.to_string(),
                delivery_tag,
                message_id: message.message_id.clone(),
                payload: message.payload.clone(),
                redelivered: message.redelivered,
                death_history: message.death_history.clone(),
            });
            if let Some(queue_state) = state.queues.get_mut(queue) {
                queue_state.unacked.insert(delivery_tag, message);
            }
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> MessagingResult<()> {
        let mut state = self.state.lock();
        state.ensure_reachable()?;
        let queue_state = state
            .queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| MessagingError::queue_not_found(&delivery.queue))?;
        queue_state
            .unacked
            .remove(&delivery.delivery_tag)
            .map(|_| ())
            .ok_or_else(|| MessagingError::delivery_not_found(&delivery.queue, delivery.delivery_tag))
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> MessagingResult<()> {
        let mut state = self.state.lock();
        state.ensure_reachable()?;
        let message = state
            .queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| MessagingError::queue_not_found(&delivery.queue))?
            .unacked
            .remove(&delivery.delivery_tag)
            .ok_or_else(|| {
                MessagingError::delivery_not_found(&delivery.queue, delivery.delivery_tag)
            })?;

        if requeue {
            if let Some(queue_state) = state.queues.get_mut(&delivery.queue) {
                let mut message = message;
                message.redelivered = true;
                queue_state.ready.push_front(message);
            }
        } else {
            state.dead_letter(&delivery.queue, message, REASON_REJECTED);
        }
        Ok(())
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        let state = self.state.lock();
        state.ensure_reachable().map_err(|_| {
            MessagingError::health_check("in-memory broker is offline")
        })?;
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
