//! # System Constants
//!
//! Broker topology names, header keys and the literal defaults that define the
//! operational boundaries of the tracking reliability layer.

/// Broker addressing for the tracking-event pipeline
pub mod topology {
    /// Direct exchange every tracking queue is bound to
    pub const TRACKING_EVENTS_EXCHANGE: &str = "tracking.events.exchange";

    /// Main ingestion queue consumed by the primary consumer
    pub const TRACKING_EVENTS_QUEUE: &str = "tracking.events.queue";

    /// Holding queue for main-queue rejections (TTL, then onward to the DLQ)
    pub const TRACKING_EVENTS_RETRY_QUEUE: &str = "tracking.events.retry.queue";

    /// Dead-letter queue consumed by the dead-letter consumer
    pub const TRACKING_EVENTS_DLQ: &str = "tracking.events.dlq";

    /// Holding queue for DLQ retries (TTL, then back to the DLQ)
    pub const TRACKING_EVENTS_DLQ_RETRY_QUEUE: &str = "tracking.events.dlq.retry.queue";

    pub const ROUTING_KEY_EVENTS: &str = "tracking.events";
    pub const ROUTING_KEY_RETRY: &str = "tracking.events.retry";
    pub const ROUTING_KEY_DLQ: &str = "tracking.events.dlq";
    pub const ROUTING_KEY_DLQ_RETRY: &str = "tracking.events.dlq.retry";
}

/// AMQP header and argument names
pub mod headers {
    pub const X_DEATH: &str = "x-death";
    pub const X_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
    pub const X_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";
    pub const X_MESSAGE_TTL: &str = "x-message-ttl";

    /// Reason recorded when a consumer rejects without requeue
    pub const REASON_REJECTED: &str = "rejected";
    /// Reason recorded when a message outlives its queue TTL
    pub const REASON_EXPIRED: &str = "expired";
}

/// Literal defaults used when configuration does not override them
pub mod defaults {
    /// Maximum DLQ reprocessing attempts before a message is permanently failed
    pub const MAX_RETRY_ATTEMPTS: u32 = 3;

    /// Backoff window of the DLQ retry holding queue
    pub const RETRY_DELAY_SECONDS: u64 = 300;

    /// Backoff window of the main-queue retry holding queue
    pub const MAIN_RETRY_TTL_SECONDS: u64 = 30;

    /// Processing deadline on the hot path
    pub const MAIN_DEADLINE_MS: u64 = 1000;

    /// Processing deadline on the degraded DLQ path
    pub const DLQ_DEADLINE_MS: u64 = 2000;

    /// Health monitor tick
    pub const HEALTH_CHECK_INTERVAL_SECONDS: u64 = 30;

    /// Connect timeout for data-source liveness probes
    pub const PROBE_TIMEOUT_MS: u64 = 2000;

    pub const CONSUMER_POLL_INTERVAL_MS: u64 = 250;
    pub const CONSUMER_BATCH_SIZE: usize = 10;
    pub const CONSUMER_MAX_IN_FLIGHT: usize = 32;
    pub const PREFETCH_COUNT: u16 = 10;
}

/// Event Record validation bounds
pub mod validation {
    pub const LOCATION_MIN_CHARS: usize = 2;
    pub const LOCATION_MAX_CHARS: usize = 200;
    pub const DESCRIPTION_MIN_CHARS: usize = 3;
    pub const DESCRIPTION_MAX_CHARS: usize = 500;
    pub const PACKAGE_ID_MAX_CHARS: usize = 50;
}

/// Prefix for consumer instance identities written into retry envelopes
pub const CONSUMER_INSTANCE_PREFIX: &str = "event-consumer-";

/// Namespace for deterministic tracking-event ids (UUID v5)
pub const TRACKING_EVENT_ID_NAMESPACE: uuid::Uuid = uuid::Uuid::from_u128(0x6f1c_2a9e_4b0d_4c6a_9e57_0d3b_8a21_f4c7);
