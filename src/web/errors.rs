//! # Web API Error Types
//!
//! Errors returned by the status surface and their HTTP mappings.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::database::DatabaseError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Operator action refused in the current routing state
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Database operation failed: {operation}")]
    DatabaseError { operation: String },
}

impl ApiError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn database_error(operation: impl Into<String>) -> Self {
        Self::DatabaseError {
            operation: operation.into(),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ReplicaUnhealthy => ApiError::conflict(err.to_string()),
            other => ApiError::database_error(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_code, message) = match &self {
            ApiError::Conflict { message } => (StatusCode::CONFLICT, "CONFLICT", message.as_str()),
            ApiError::DatabaseError { operation } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                operation.as_str(),
            ),
        };

        let error_response = json!({
            "error": {
                "code": error_code,
                "message": message
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
