//! # Processing Collaborator
//!
//! The seam both consumers call to turn an Event Record into a stored
//! tracking event, plus the deadline wrapper they share.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::message::{ErrorKind, TrackingEventRequest};

/// Failures raised while processing an Event Record
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    #[error("Processing exceeded deadline of {deadline_ms} ms")]
    DeadlineExceeded { deadline_ms: u64 },

    #[error("Processing task aborted: {message}")]
    Aborted { message: String },
}

impl ProcessingError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn deadline_exceeded(deadline: Duration) -> Self {
        Self::DeadlineExceeded {
            deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Category recorded in the Retry Envelope
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeadlineExceeded { .. } => ErrorKind::TimeoutFailure,
            Self::Failed { .. } | Self::Aborted { .. } => ErrorKind::ProcessingFailure,
        }
    }
}

impl From<crate::database::DatabaseError> for ProcessingError {
    fn from(err: crate::database::DatabaseError) -> Self {
        Self::with_source("tracking event store operation failed", err)
    }
}

/// Collaborator that persists an Event Record
///
/// Implementations must be idempotent: a timed-out invocation keeps running
/// and may complete after the same record has been dispatched for retry.
#[async_trait]
pub trait EventProcessor: Send + Sync + 'static {
    async fn process(&self, event: TrackingEventRequest) -> Result<(), ProcessingError>;
}

/// Run the processor on its own task and wait at most `deadline`
///
/// On timeout the task is detached, not cancelled.
pub async fn invoke_with_deadline(
    processor: Arc<dyn EventProcessor>,
    event: TrackingEventRequest,
    deadline: Duration,
) -> Result<(), ProcessingError> {
    let handle = tokio::spawn(async move { processor.process(event).await });

    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(ProcessingError::Aborted {
            message: join_error.to_string(),
        }),
        Err(_) => Err(ProcessingError::deadline_exceeded(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowProcessor {
        delay: Duration,
        completed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventProcessor for SlowProcessor {
        async fn process(&self, _event: TrackingEventRequest) -> Result<(), ProcessingError> {
            tokio::time::sleep(self.delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingProcessor;

    #[async_trait]
    impl EventProcessor for FailingProcessor {
        async fn process(&self, _event: TrackingEventRequest) -> Result<(), ProcessingError> {
            Err(ProcessingError::with_source(
                "store unavailable",
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            ))
        }
    }

    fn event() -> TrackingEventRequest {
        TrackingEventRequest::new("pacote-1", "DC-SP", "arrived", Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded_detaches_task() {
        let completed = Arc::new(AtomicUsize::new(0));
        let processor = Arc::new(SlowProcessor {
            delay: Duration::from_millis(1500),
            completed: completed.clone(),
        });

        let result = invoke_with_deadline(processor, event(), Duration::from_millis(1000)).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimeoutFailure);
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 1, "detached task still completes");
    }

    #[tokio::test]
    async fn test_failure_keeps_cause_chain() {
        let err = invoke_with_deadline(Arc::new(FailingProcessor), event(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProcessingFailure);
        assert_eq!(err.to_string(), "store unavailable");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("refused"));
    }

    #[tokio::test]
    async fn test_success_within_deadline() {
        let processor = Arc::new(SlowProcessor {
            delay: Duration::from_millis(1),
            completed: Arc::new(AtomicUsize::new(0)),
        });
        assert!(invoke_with_deadline(processor, event(), Duration::from_secs(1))
            .await
            .is_ok());
    }
}
