//! # Database Error Types
//!
//! Errors raised by data sources, the router and the failover interceptor.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatabaseError {
    #[error("Data access failed: {message}")]
    DataAccess { message: String },

    #[error("Liveness probe failed for {source_name}: {message}")]
    ProbeFailed { source_name: String, message: String },

    #[error("Liveness probe for {source_name} timed out after {timeout_ms} ms")]
    ProbeTimeout { source_name: String, timeout_ms: u64 },

    #[error("Operation failed on both data sources (replica: {replica}; primary: {primary})")]
    DoubleFailure {
        replica: Box<DatabaseError>,
        primary: Box<DatabaseError>,
    },

    #[error("Replica is unhealthy; refusing to route reads to it")]
    ReplicaUnhealthy,

    #[error("Pool configuration error for {source_name}: {message}")]
    PoolConfiguration { source_name: String, message: String },
}

impl DatabaseError {
    pub fn data_access(message: impl Into<String>) -> Self {
        Self::DataAccess {
            message: message.into(),
        }
    }

    pub fn probe_failed(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProbeFailed {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn probe_timeout(source_name: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ProbeTimeout {
            source_name: source_name.into(),
            timeout_ms,
        }
    }

    pub fn double_failure(replica: DatabaseError, primary: DatabaseError) -> Self {
        Self::DoubleFailure {
            replica: Box::new(replica),
            primary: Box::new(primary),
        }
    }

    pub fn pool_configuration(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PoolConfiguration {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Whether the failure came from talking to a data source (failover eligible)
    pub fn is_data_access(&self) -> bool {
        matches!(
            self,
            Self::DataAccess { .. } | Self::ProbeFailed { .. } | Self::ProbeTimeout { .. }
        )
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        Self::data_access(err.to_string())
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
