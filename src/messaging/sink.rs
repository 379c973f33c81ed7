//! Terminal Sink: where DLQ-exhausted envelopes end up.

use async_trait::async_trait;
use tracing::error;

use super::errors::MessagingResult;
use super::message::RetryEnvelope;
use super::retry_policy::RetryInfo;

/// Records permanently failed envelopes; implementations may persist or alert
#[async_trait]
pub trait TerminalSink: Send + Sync + 'static {
    async fn record(&self, envelope: &RetryEnvelope, info: &RetryInfo) -> MessagingResult<()>;
}

/// Default sink: one structured error log per exhausted envelope
#[derive(Debug, Default, Clone)]
pub struct LoggingTerminalSink;

#[async_trait]
impl TerminalSink for LoggingTerminalSink {
    async fn record(&self, envelope: &RetryEnvelope, info: &RetryInfo) -> MessagingResult<()> {
        error!(
            package_id = envelope.package_id().unwrap_or("<missing>"),
            error_type = %envelope.error_type,
            error_message = %envelope.error_message,
            failed_at = ?envelope.failed_at,
            consumer_instance = %envelope.consumer_instance,
            retry_count = info.attempts,
            max_attempts = info.max_attempts,
            "🚨 Tracking event permanently failed after exhausting retries\n{info}"
        );
        Ok(())
    }
}
