//! # Messaging Module
//!
//! Broker-backed tracking-event pipeline: publisher, primary consumer,
//! dead-letter consumer and the retry policy that bounds the DLQ loop.
//! Backoff is broker-native (queue TTL plus dead-lettering); there is no
//! in-process scheduler.

pub mod broker;
pub mod consumer;
pub mod dlq_consumer;
pub mod errors;
pub mod listener;
pub mod message;
pub mod processor;
pub mod publisher;
pub mod retry_policy;
pub mod sink;
pub mod topology;

pub use broker::{BrokerProvider, Delivery, InMemoryBroker, MessageBroker, OutboundMessage, RabbitMqBroker};
pub use consumer::{ConsumeOutcome, TrackingEventConsumer};
pub use dlq_consumer::{DeadLetterConsumer, DlqOutcome};
pub use errors::{MessagingError, MessagingResult};
pub use listener::{DeliveryHandler, QueueListener};
pub use message::{
    DeathRecord, ErrorKind, FieldViolation, RetryEnvelope, TrackingEventRequest, ValidationErrors,
    WorkerIdentity,
};
pub use processor::{invoke_with_deadline, EventProcessor, ProcessingError};
pub use publisher::TrackingEventPublisher;
pub use retry_policy::{DlqRetryPolicy, RetryInfo};
pub use sink::{LoggingTerminalSink, TerminalSink};
pub use topology::{BrokerTopology, QueueDeclaration};
