//! Error taxonomy for the collection orchestrator.
//!
//! Adapters return [`AdapterError`] across the `execute_task` boundary and
//! never panic for expected failure kinds. The rest of the system propagates
//! [`CollectError`]; the HTTP surface converts both into JSON error bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Failure kinds an adapter may return from `execute_task` / `transform_config`.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The provider signaled a quota or rate-limit boundary that outlasts retry.
    #[error("quota exceeded, released at {release_at}")]
    QuotaExceeded { release_at: DateTime<Utc> },

    /// The abstract config cannot be serialized for the target provider.
    #[error("invalid collection config: {reason}")]
    InvalidConfig { reason: String },

    /// A collection attempt failed in a way that does not indicate quota
    /// (network blip, payload parse, upstream 5xx).
    #[error("collection failed: {reason}")]
    Collection { reason: String },

    /// Unrecoverable adapter state (credential loss, corrupted session).
    #[error("fatal adapter error: {reason}")]
    Fatal { reason: String },
}

impl AdapterError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn collection(reason: impl Into<String>) -> Self {
        Self::Collection {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }
}

/// Main error type of the orchestration and persistence layer.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no adapter registered for platform '{platform}'")]
    UnknownPlatform { platform: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("task validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Fatal condition re-raised from a platform manager; the collection loop
    /// logs it and exits.
    #[error("fatal: {reason}")]
    Fatal { reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the services layer.
pub type Result<T> = std::result::Result<T, CollectError>;

/// Error body returned by the HTTP surface.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub timestamp: String,
}

/// HTTP-surface error wrapper around the internal taxonomy.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] CollectError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(CollectError::UnknownPlatform { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Internal(CollectError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "INVALID_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Internal(CollectError::UnknownPlatform { .. }) => "UNKNOWN_PLATFORM",
            ApiError::Internal(CollectError::Validation(_)) => "VALIDATION_FAILED",
            ApiError::Internal(CollectError::Database(_)) => "DATABASE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        match &self {
            ApiError::Internal(err) => {
                tracing::error!(error_code = %error_code, error = %err, "request failed");
            }
            other => {
                tracing::info!(error_code = %error_code, error = %other, "client error");
            }
        }

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(json!(body))).into_response()
    }
}
