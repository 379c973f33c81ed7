pub mod pg_store;
pub mod tracking_event_service;

pub use pg_store::PgTrackingEventStore;
pub use tracking_event_service::{
    InMemoryTrackingEventStore, TrackingEvent, TrackingEventService, TrackingEventStore,
};
