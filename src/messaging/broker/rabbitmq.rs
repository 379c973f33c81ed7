//! # RabbitMQ Broker
//!
//! `MessageBroker` implementation over AMQP 0.9.1 using the `lapin` crate.
//!
//! Publishes are persistent JSON, `mandatory`, and wait for a publisher
//! confirm, so an unroutable or nacked publish surfaces as an error to the
//! caller. The `x-death` header RabbitMQ maintains on dead-lettered messages
//! is parsed into the Delivery-Failure History; RabbitMQ aggregates repeated
//! deaths for the same queue and reason into one entry with a `count`, which
//! is expanded here so the history length is the number of dead-letter events.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicPublishOptions, BasicQosOptions, BasicRejectOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldArray, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info};

use super::{Delivery, MessageBroker, OutboundMessage};
use crate::config::{redact_url, BrokerConfig};
use crate::constants::headers::{
    X_DEAD_LETTER_EXCHANGE, X_DEAD_LETTER_ROUTING_KEY, X_DEATH, X_MESSAGE_TTL,
};
use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::message::DeathRecord;
use crate::messaging::topology::{BrokerTopology, QueueDeclaration};

/// RabbitMQ-backed broker
#[derive(Debug)]
pub struct RabbitMqBroker {
    connection: Connection,
    channel: Channel,
    url_redacted: String,
}

impl RabbitMqBroker {
    /// Connect, open a confirm-mode channel and apply the prefetch limit
    pub async fn connect(config: &BrokerConfig) -> MessagingResult<Self> {
        let url_redacted = redact_url(&config.url);

        let connection = Connection::connect(
            &config.url,
            ConnectionProperties::default().with_connection_name("tracking-worker".into()),
        )
        .await
        .map_err(|e| {
            MessagingError::broker_unreachable(format!(
                "RabbitMQ connection to {url_redacted} failed: {e}"
            ))
        })?;

        let channel = connection.create_channel().await.map_err(|e| {
            MessagingError::connection(format!("RabbitMQ channel creation failed: {e}"))
        })?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| {
                MessagingError::configuration("rabbitmq", format!("Failed to set QoS: {e}"))
            })?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| {
                MessagingError::configuration(
                    "rabbitmq",
                    format!("Failed to enable publisher confirms: {e}"),
                )
            })?;

        info!(url = %url_redacted, "🐇 Connected to RabbitMQ");

        Ok(Self {
            connection,
            channel,
            url_redacted,
        })
    }

    pub fn connection_url_redacted(&self) -> &str {
        &self.url_redacted
    }

    async fn declare_queue(&self, exchange: &str, queue: &QueueDeclaration) -> MessagingResult<()> {
        self.channel
            .queue_declare(
                &queue.name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                queue_arguments(queue),
            )
            .await
            .map_err(|e| MessagingError::topology(&queue.name, format!("queue declare failed: {e}")))?;

        self.channel
            .queue_bind(
                &queue.name,
                exchange,
                &queue.binding_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::topology(&queue.name, format!("queue bind failed: {e}")))?;

        debug!(queue = %queue.name, binding_key = %queue.binding_key, "Queue declared");
        Ok(())
    }
}

/// Dead-letter and TTL arguments for a queue declaration
fn queue_arguments(queue: &QueueDeclaration) -> FieldTable {
    let mut args = FieldTable::default();
    if let Some(exchange) = &queue.dead_letter_exchange {
        args.insert(
            X_DEAD_LETTER_EXCHANGE.into(),
            AMQPValue::LongString(exchange.as_str().into()),
        );
    }
    if let Some(routing_key) = &queue.dead_letter_routing_key {
        args.insert(
            X_DEAD_LETTER_ROUTING_KEY.into(),
            AMQPValue::LongString(routing_key.as_str().into()),
        );
    }
    if let Some(ttl) = queue.message_ttl {
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        args.insert(X_MESSAGE_TTL.into(), AMQPValue::LongLongInt(millis));
    }
    args
}

fn amqp_string(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::LongString(s) => Some(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
        _ => None,
    }
}

fn amqp_u64(value: &AMQPValue) -> Option<u64> {
    match value {
        AMQPValue::ShortShortUInt(v) => Some(u64::from(*v)),
        AMQPValue::ShortUInt(v) => Some(u64::from(*v)),
        AMQPValue::LongUInt(v) => Some(u64::from(*v)),
        AMQPValue::ShortShortInt(v) => u64::try_from(*v).ok(),
        AMQPValue::ShortInt(v) => u64::try_from(*v).ok(),
        AMQPValue::LongInt(v) => u64::try_from(*v).ok(),
        AMQPValue::LongLongInt(v) => u64::try_from(*v).ok(),
        AMQPValue::Timestamp(v) => Some(*v),
        _ => None,
    }
}

/// Parse `x-death` into a chronological (oldest first) history
///
/// RabbitMQ lists the most recent death first and folds repeats for the same
/// queue and reason into one entry with a `count`.
pub fn parse_death_history(headers: Option<&FieldTable>) -> Vec<DeathRecord> {
    let Some(AMQPValue::FieldArray(entries)) = headers.and_then(|h| h.inner().get(X_DEATH)) else {
        return Vec::new();
    };

    let mut history = Vec::new();
    for entry in entries.as_slice().iter().rev() {
        let AMQPValue::FieldTable(table) = entry else {
            continue;
        };
        let fields = table.inner();
        let text = |key: &str| fields.get(key).and_then(amqp_string).unwrap_or_default();
        let count = fields.get("count").and_then(amqp_u64).unwrap_or(1).max(1);
        let time = fields
            .get("time")
            .and_then(amqp_u64)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        let record = DeathRecord::new(text("exchange"), text("queue"), text("reason"), time);
        for _ in 0..count {
            history.push(record.clone());
        }
    }
    history
}

/// Render a history as an `x-death` header, folding repeats the way RabbitMQ does
pub fn death_history_header(history: &[DeathRecord]) -> Option<AMQPValue> {
    if history.is_empty() {
        return None;
    }

    // (queue, reason) -> (exchange, count, latest time), in first-seen order
    let mut order: Vec<(String, String)> = Vec::new();
    let mut folded: BTreeMap<(String, String), (String, u64, DateTime<Utc>)> = BTreeMap::new();
    for record in history {
        let key = (record.queue.clone(), record.reason.clone());
        match folded.get_mut(&key) {
            Some(entry) => {
                entry.1 += 1;
                entry.2 = entry.2.max(record.time);
            }
            None => {
                order.push(key.clone());
                folded.insert(key, (record.exchange.clone(), 1, record.time));
            }
        }
    }

    let mut entries: Vec<(DateTime<Utc>, AMQPValue)> = order
        .into_iter()
        .filter_map(|key| {
            let (exchange, count, time) = folded.remove(&key)?;
            let mut table = FieldTable::default();
            table.insert("queue".into(), AMQPValue::LongString(key.0.as_str().into()));
            table.insert("reason".into(), AMQPValue::LongString(key.1.as_str().into()));
            table.insert("exchange".into(), AMQPValue::LongString(exchange.as_str().into()));
            table.insert(
                "count".into(),
                AMQPValue::LongLongInt(i64::try_from(count).unwrap_or(i64::MAX)),
            );
            table.insert(
                "time".into(),
                AMQPValue::Timestamp(u64::try_from(time.timestamp()).unwrap_or_default()),
            );
            Some((time, AMQPValue::FieldTable(table)))
        })
        .collect();

    // Most recent first
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    let array: Vec<AMQPValue> = entries.into_iter().map(|(_, value)| value).collect();
    Some(AMQPValue::FieldArray(FieldArray::from(array)))
}

#[async_trait]
impl MessageBroker for RabbitMqBroker {
    async fn declare_topology(&self, topology: &BrokerTopology) -> MessagingResult<()> {
        self.channel
            .exchange_declare(
                &topology.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MessagingError::topology(&topology.exchange, format!("exchange declare failed: {e}"))
            })?;

        for queue in topology.queues() {
            self.declare_queue(&topology.exchange, queue).await?;
        }

        info!(
            exchange = %topology.exchange,
            queues = ?topology.queue_names(),
            "📐 Broker topology declared"
        );
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> MessagingResult<()> {
        let mut properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_content_type("application/json".into());
        if let Some(id) = &message.message_id {
            properties = properties.with_message_id(id.as_str().into());
        }
        if let Some(header) = death_history_header(&message.death_history) {
            let mut headers = FieldTable::default();
            headers.insert(X_DEATH.into(), header);
            properties = properties.with_headers(headers);
        }

        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                &message.payload,
                properties,
            )
            .await
            .map_err(|e| match MessagingError::from(e) {
                err @ MessagingError::BrokerUnreachable { .. } => err,
                other => MessagingError::publish(exchange, routing_key, other.to_string()),
            })?;

        let confirmation = confirm.await.map_err(|e| {
            MessagingError::publish(exchange, routing_key, format!("confirmation failed: {e}"))
        })?;

        match confirmation {
            Confirmation::Ack(Some(_returned)) => {
                Err(MessagingError::unroutable(exchange, routing_key))
            }
            Confirmation::Ack(None) | Confirmation::NotRequested => Ok(()),
            Confirmation::Nack(_) => Err(MessagingError::publish(
                exchange,
                routing_key,
                "broker nacked the publish",
            )),
        }
    }

    async fn receive(&self, queue: &str, max_messages: usize) -> MessagingResult<Vec<Delivery>> {
        let mut deliveries = Vec::with_capacity(max_messages);

        for _ in 0..max_messages {
            match self
                .channel
                .basic_get(queue, BasicGetOptions { no_ack: false })
                .await
            {
                Ok(Some(message)) => {
                    let properties = &message.delivery.properties;
                    deliveries.push(Delivery {
                        queue: queue.to_string(),
                        delivery_tag: message.delivery.delivery_tag,
                        message_id: properties
                            .message_id()
                            .as_ref()
                            .map(|id| id.as_str().to_string()),
                        payload: message.delivery.data.clone(),
                        redelivered: message.delivery.redelivered,
                        death_history: parse_death_history(properties.headers().as_ref()),
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(match MessagingError::from(e) {
                        err @ MessagingError::BrokerUnreachable { .. } => err,
                        other => MessagingError::receive(queue, other.to_string()),
                    });
                }
            }
        }

        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> MessagingResult<()> {
        self.channel
            .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| {
                MessagingError::ack(&delivery.queue, delivery.delivery_tag, e.to_string())
            })
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> MessagingResult<()> {
        self.channel
            .basic_reject(delivery.delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|e| {
                MessagingError::reject(&delivery.queue, delivery.delivery_tag, e.to_string())
            })
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        if self.connection.status().connected() && self.channel.status().connected() {
            Ok(true)
        } else {
            Err(MessagingError::health_check(
                "RabbitMQ connection is not connected",
            ))
        }
    }

    fn provider_name(&self) -> &'static str {
        "rabbitmq"
    }
}
