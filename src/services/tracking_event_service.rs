//! # Tracking Event Service
//!
//! The processing collaborator behind both consumers: turns an Event Record
//! into a stored tracking event. The stored id is derived from the record's
//! own fields, so processing the same record twice (a redelivery, or a
//! timed-out attempt that finishes after its retry was dispatched) leaves a
//! single row behind.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::TRACKING_EVENT_ID_NAMESPACE;
use crate::database::DatabaseResult;
use crate::messaging::{EventProcessor, ProcessingError, TrackingEventRequest};

/// A persisted tracking event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub package_id: String,
    pub location: String,
    pub description: String,
    pub event_time: DateTime<Utc>,
}

impl TrackingEvent {
    pub fn from_request(request: &TrackingEventRequest) -> Self {
        Self {
            id: Self::derive_id(request),
            package_id: request.package_id.clone(),
            location: request.location.clone(),
            description: request.description.clone(),
            event_time: request.event_time,
        }
    }

    /// Deterministic id (UUID v5) over the record's fields
    pub fn derive_id(request: &TrackingEventRequest) -> Uuid {
        let name = format!(
            "{}|{}|{}|{}",
            request.package_id,
            request.location,
            request.description,
            request.event_time.to_rfc3339()
        );
        Uuid::new_v5(&TRACKING_EVENT_ID_NAMESPACE, name.as_bytes())
    }
}

/// Storage for tracking events
#[async_trait]
pub trait TrackingEventStore: Send + Sync + 'static {
    /// Insert unless an event with the same id exists; `true` when a row was written
    async fn save(&self, event: &TrackingEvent) -> DatabaseResult<bool>;

    /// Events for a package, oldest first
    async fn find_by_package(&self, package_id: &str) -> DatabaseResult<Vec<TrackingEvent>>;
}

/// Process-local store keyed by event id
#[derive(Debug, Default, Clone)]
pub struct InMemoryTrackingEventStore {
    events: Arc<DashMap<Uuid, TrackingEvent>>,
}

impl InMemoryTrackingEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl TrackingEventStore for InMemoryTrackingEventStore {
    async fn save(&self, event: &TrackingEvent) -> DatabaseResult<bool> {
        let mut inserted = false;
        self.events.entry(event.id).or_insert_with(|| {
            inserted = true;
            event.clone()
        });
        Ok(inserted)
    }

    async fn find_by_package(&self, package_id: &str) -> DatabaseResult<Vec<TrackingEvent>> {
        let mut events: Vec<TrackingEvent> = self
            .events
            .iter()
            .filter(|entry| entry.package_id == package_id)
            .map(|entry| entry.value().clone())
            .collect();
        events.sort_by_key(|e| e.event_time);
        Ok(events)
    }
}

/// Stores Event Records; used as the [`EventProcessor`] of both consumers
pub struct TrackingEventService {
    store: Arc<dyn TrackingEventStore>,
}

impl std::fmt::Debug for TrackingEventService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingEventService").finish_non_exhaustive()
    }
}

impl TrackingEventService {
    pub fn new(store: Arc<dyn TrackingEventStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, request: &TrackingEventRequest) -> Result<TrackingEvent, ProcessingError> {
        let event = TrackingEvent::from_request(request);
        if self.store.save(&event).await? {
            info!(
                package_id = %event.package_id,
                event_id = %event.id,
                location = %event.location,
                "📦 Tracking event stored"
            );
        } else {
            debug!(
                package_id = %event.package_id,
                event_id = %event.id,
                "Tracking event already stored, skipping duplicate"
            );
        }
        Ok(event)
    }

    pub async fn history(&self, package_id: &str) -> Result<Vec<TrackingEvent>, ProcessingError> {
        Ok(self.store.find_by_package(package_id).await?)
    }
}

#[async_trait]
impl EventProcessor for TrackingEventService {
    async fn process(&self, event: TrackingEventRequest) -> Result<(), ProcessingError> {
        self.record(&event).await.map(|_| ())
    }
}
