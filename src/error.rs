use thiserror::Error;

use crate::config::ConfigurationError;
use crate::database::DatabaseError;
use crate::messaging::{MessagingError, ProcessingError, ValidationErrors};

/// Top-level error for the tracking pipeline
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),
}

pub type Result<T> = std::result::Result<T, TrackingError>;
