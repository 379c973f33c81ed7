//! # Message Structures for the Tracking Pipeline
//!
//! Wire formats carried by the broker: the tracking Event Record published at
//! ingress and the Retry Envelope that wraps it once processing has failed.
//! Field names follow the camelCase JSON shape the ingestion API accepts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::validation::{
    DESCRIPTION_MAX_CHARS, DESCRIPTION_MIN_CHARS, LOCATION_MAX_CHARS, LOCATION_MIN_CHARS,
    PACKAGE_ID_MAX_CHARS,
};

/// Tracking update for a single package (the Event Record)
///
/// Immutable once created: consumers receive it by value and never share it
/// between tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEventRequest {
    pub package_id: String,
    pub location: String,
    pub description: String,
    /// When the tracking event happened; `date` on the wire, `timestamp` accepted
    #[serde(rename = "date", alias = "timestamp", with = "iso_datetime")]
    pub event_time: DateTime<Utc>,
}

impl TrackingEventRequest {
    pub fn new(
        package_id: impl Into<String>,
        location: impl Into<String>,
        description: impl Into<String>,
        event_time: DateTime<Utc>,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            location: location.into(),
            description: description.into(),
            event_time,
        }
    }

    /// Validate ingress constraints, reporting every violated field
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        self.validate_at(Utc::now())
    }

    /// Validate against an explicit "now" (event time must not be after it)
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let package_id = self.package_id.trim();
        if package_id.is_empty() {
            errors.push("packageId", "package id is required");
        } else if !self
            .package_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            errors.push(
                "packageId",
                "package id must contain only letters, numbers and hyphens",
            );
        } else if self.package_id.chars().count() > PACKAGE_ID_MAX_CHARS {
            errors.push(
                "packageId",
                format!("package id must be at most {PACKAGE_ID_MAX_CHARS} characters"),
            );
        }

        check_length(
            &mut errors,
            "location",
            &self.location,
            LOCATION_MIN_CHARS,
            LOCATION_MAX_CHARS,
        );
        check_length(
            &mut errors,
            "description",
            &self.description,
            DESCRIPTION_MIN_CHARS,
            DESCRIPTION_MAX_CHARS,
        );

        if self.event_time > now {
            errors.push("date", "event time must be in the past or present");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn check_length(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) {
    if value.trim().is_empty() {
        errors.push(field, format!("{field} is required"));
        return;
    }
    let len = value.chars().count();
    if len < min || len > max {
        errors.push(
            field,
            format!("{field} must be between {min} and {max} characters"),
        );
    }
}

/// A single field violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

/// All violations found while validating an Event Record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect();
        write!(f, "{}", rendered.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Failure category recorded in a Retry Envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The processing collaborator returned an error
    ProcessingFailure,
    /// The processing deadline elapsed before completion
    TimeoutFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ProcessingFailure => "ProcessingFailure",
            ErrorKind::TimeoutFailure => "TimeoutFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the worker that produced a Retry Envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    /// Task or thread tag of the consumer worker
    pub consumer_thread: String,
    /// Process-level consumer instance (`event-consumer-<instance>`)
    pub consumer_instance: String,
}

impl WorkerIdentity {
    pub fn new(consumer_thread: impl Into<String>, consumer_instance: impl Into<String>) -> Self {
        Self {
            consumer_thread: consumer_thread.into(),
            consumer_instance: consumer_instance.into(),
        }
    }

    /// Identity of the code running right now on the given consumer instance
    pub fn current(consumer_instance: &str) -> Self {
        let thread = std::thread::current();
        let consumer_thread = match thread.name() {
            Some(name) => format!("{name}-{:?}", thread.id()),
            None => format!("{:?}", thread.id()),
        };
        Self::new(consumer_thread, consumer_instance)
    }
}

/// Failed Event Record plus diagnostics, routed through the dead-letter path
///
/// Every field defaults when missing so that anything landing on the DLQ
/// decodes; an envelope without `original_message` is structurally invalid and
/// is dropped by the dead-letter consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryEnvelope {
    pub original_message: Option<TrackingEventRequest>,
    pub error_message: String,
    /// Error category name (see [`ErrorKind`])
    pub error_type: String,
    pub stack_trace: String,
    pub failed_at: Option<DateTime<Utc>>,
    pub consumer_thread: String,
    pub consumer_instance: String,
}

impl RetryEnvelope {
    /// Build an envelope from a processing failure
    pub fn from_failure(
        original_message: TrackingEventRequest,
        kind: ErrorKind,
        error: &(dyn std::error::Error + 'static),
        worker: WorkerIdentity,
    ) -> Self {
        Self {
            original_message: Some(original_message),
            error_message: error.to_string(),
            error_type: kind.as_str().to_string(),
            stack_trace: render_trace(kind, error),
            failed_at: Some(Utc::now()),
            consumer_thread: worker.consumer_thread,
            consumer_instance: worker.consumer_instance,
        }
    }

    /// Whether the envelope still carries the Event Record it was built for
    pub fn is_well_formed(&self) -> bool {
        self.original_message.is_some()
    }

    pub fn package_id(&self) -> Option<&str> {
        self.original_message
            .as_ref()
            .map(|m| m.package_id.as_str())
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.error_type.as_str() {
            "ProcessingFailure" => Some(ErrorKind::ProcessingFailure),
            "TimeoutFailure" => Some(ErrorKind::TimeoutFailure),
            _ => None,
        }
    }

    /// Stamp a fresh failure timestamp before the envelope is re-dispatched
    pub fn touch(&mut self) {
        self.failed_at = Some(Utc::now());
    }
}

/// Render an error and its source chain as diagnostic trace text
pub fn render_trace(kind: ErrorKind, error: &(dyn std::error::Error + 'static)) -> String {
    let mut trace = format!("{kind}: {error}\n");
    let mut source = error.source();
    while let Some(cause) = source {
        trace.push_str(&format!("\tcaused by: {cause}\n"));
        source = cause.source();
    }
    trace
}

/// One dead-lettering event recorded by the broker (an `x-death` entry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathRecord {
    pub exchange: String,
    pub queue: String,
    pub reason: String,
    pub time: DateTime<Utc>,
}

impl DeathRecord {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        reason: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            reason: reason.into(),
            time,
        }
    }
}

/// ISO-8601 timestamps with or without an offset; offset-less values are UTC
mod iso_datetime {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let raw = String::deserialize(deserializer)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| D::Error::custom(format!("invalid ISO-8601 timestamp '{raw}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_event() -> TrackingEventRequest {
        TrackingEventRequest::new(
            "pacote-12345",
            "DC-SP",
            "arrived",
            Utc::now() - Duration::minutes(5),
        )
    }

    #[test]
    fn test_valid_event_passes_validation() {
        assert!(sample_event().validate().is_ok());
    }

    #[test]
    fn test_validation_reports_every_field() {
        let event = TrackingEventRequest::new(
            "pacote 12345!",
            "X",
            "ok",
            Utc::now() + Duration::hours(1),
        );

        let errors = event.validate().unwrap_err();
        assert!(errors.has_field("packageId"));
        assert!(errors.has_field("location"));
        assert!(errors.has_field("description"));
        assert!(errors.has_field("date"));
        assert_eq!(errors.violations.len(), 4);
    }

    #[test]
    fn test_length_bounds_are_inclusive() {
        let now = Utc::now();
        let mut event = sample_event();
        event.location = "SP".to_string();
        event.description = "a".repeat(500);
        assert!(event.validate_at(now).is_ok());

        event.location = "L".repeat(201);
        let errors = event.validate_at(now).unwrap_err();
        assert!(errors.has_field("location"));
        assert!(!errors.has_field("description"));
    }

    #[test]
    fn test_wire_shape_accepts_offsetless_timestamp() {
        let json = r#"{
            "packageId": "pacote-12345",
            "location": "DC-SP",
            "description": "arrived",
            "date": "2025-01-15T10:30:00"
        }"#;

        let event: TrackingEventRequest = serde_json::from_str(json).expect("should decode");
        assert_eq!(event.package_id, "pacote-12345");
        assert_eq!(event.event_time.to_rfc3339(), "2025-01-15T10:30:00+00:00");

        let with_alias = r#"{"packageId":"p-1","location":"DC","description":"left","timestamp":"2025-01-15T10:30:00Z"}"#;
        let event: TrackingEventRequest = serde_json::from_str(with_alias).expect("alias");
        assert_eq!(event.location, "DC");
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let json = r#"{"packageId":"p-1","location":"DC","date":"2025-01-15T10:30:00Z"}"#;
        assert!(serde_json::from_str::<TrackingEventRequest>(json).is_err());
    }

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "store write failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_envelope_from_failure_renders_cause_chain() {
        let error = Outer(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        let envelope = RetryEnvelope::from_failure(
            sample_event(),
            ErrorKind::ProcessingFailure,
            &error,
            WorkerIdentity::new("task-7", "event-consumer-8080"),
        );

        assert!(envelope.is_well_formed());
        assert_eq!(envelope.error_type, "ProcessingFailure");
        assert_eq!(envelope.error_kind(), Some(ErrorKind::ProcessingFailure));
        assert_eq!(envelope.error_message, "store write failed");
        assert!(envelope.stack_trace.starts_with("ProcessingFailure: store write failed"));
        assert!(envelope.stack_trace.contains("caused by: disk full"));
        assert_eq!(envelope.consumer_instance, "event-consumer-8080");
        assert!(envelope.failed_at.is_some());
    }

    #[test]
    fn test_raw_event_record_decodes_as_malformed_envelope() {
        let raw = serde_json::to_vec(&sample_event()).unwrap();
        let envelope: RetryEnvelope = serde_json::from_slice(&raw).expect("defaults apply");
        assert!(!envelope.is_well_formed());
        assert_eq!(envelope.package_id(), None);
    }
}
