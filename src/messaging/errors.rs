//! # Messaging Error Types
//!
//! Structured error handling for the broker pipeline using thiserror
//! instead of `Box<dyn Error>` patterns.

use thiserror::Error;

/// Messaging error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Broker unreachable: {message}")]
    BrokerUnreachable { message: String },

    #[error("Topology declaration failed: {resource}: {message}")]
    TopologyDeclaration { resource: String, message: String },

    #[error("Publish failed: {exchange}/{routing_key}: {message}")]
    Publish {
        exchange: String,
        routing_key: String,
        message: String,
    },

    #[error("Message unroutable: no queue bound to {exchange} with key {routing_key}")]
    Unroutable {
        exchange: String,
        routing_key: String,
    },

    #[error("Receive failed: {queue_name}: {message}")]
    Receive { queue_name: String, message: String },

    #[error("Ack failed: {queue_name}: delivery {delivery_tag}: {message}")]
    Ack {
        queue_name: String,
        delivery_tag: u64,
        message: String,
    },

    #[error("Reject failed: {queue_name}: delivery {delivery_tag}: {message}")]
    Reject {
        queue_name: String,
        delivery_tag: u64,
        message: String,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Delivery not found: {queue_name}: delivery {delivery_tag}")]
    DeliveryNotFound {
        queue_name: String,
        delivery_tag: u64,
    },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Health check failed: {message}")]
    HealthCheck { message: String },
}

impl MessagingError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a broker unreachable error
    pub fn broker_unreachable(message: impl Into<String>) -> Self {
        Self::BrokerUnreachable {
            message: message.into(),
        }
    }

    /// Create a topology declaration error
    pub fn topology(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TopologyDeclaration {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a publish error
    pub fn publish(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Publish {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            message: message.into(),
        }
    }

    /// Create an unroutable error
    pub fn unroutable(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self::Unroutable {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Create a receive error
    pub fn receive(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Receive {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    /// Create an ack error
    pub fn ack(queue_name: impl Into<String>, delivery_tag: u64, message: impl Into<String>) -> Self {
        Self::Ack {
            queue_name: queue_name.into(),
            delivery_tag,
            message: message.into(),
        }
    }

    /// Create a reject error
    pub fn reject(
        queue_name: impl Into<String>,
        delivery_tag: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::Reject {
            queue_name: queue_name.into(),
            delivery_tag,
            message: message.into(),
        }
    }

    /// Create a queue not found error
    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    /// Create a delivery not found error
    pub fn delivery_not_found(queue_name: impl Into<String>, delivery_tag: u64) -> Self {
        Self::DeliveryNotFound {
            queue_name: queue_name.into(),
            delivery_tag,
        }
    }

    /// Create a message serialization error
    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a health check error
    pub fn health_check(message: impl Into<String>) -> Self {
        Self::HealthCheck {
            message: message.into(),
        }
    }

    /// Whether the broker itself could not be reached (as opposed to a rejected operation)
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            MessagingError::BrokerUnreachable { .. } | MessagingError::Connection { .. }
        )
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Conversion from lapin errors; IO and connection-level failures mean the broker is gone
impl From<lapin::Error> for MessagingError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::IOError(_) | lapin::Error::InvalidConnectionState(_) => {
                MessagingError::broker_unreachable(err.to_string())
            }
            _ => MessagingError::connection(err.to_string()),
        }
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
