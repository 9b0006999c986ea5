//! Structured error type implementing `axum::response::IntoResponse`.
//!
//! Maps domain errors from osforge-core, osforge-remote, and
//! osforge-build to HTTP status codes with `{error: {code, message}}`
//! JSON bodies. Internal error details are never exposed to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Application-level error type that implements [`IntoResponse`].
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (400). Blank required fields, bad
    /// names, unsafe paths, malformed KEY=VALUE arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// Authentication failure — missing or invalid token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Conflict with current resource state (409). Duplicate build
    /// names, artifact requests against non-completed builds.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The build's units are not ready to serve the request yet (503).
    /// The caller is expected to retry.
    #[error("not ready: {0}")]
    NotReady(String),

    /// A cluster-side operation did not finish within its window (504).
    #[error("timed out: {0}")]
    Timeout(String),

    /// Remote execution inside a unit failed (502).
    #[error("remote execution failed: {0}")]
    Remote(String),

    /// Internal server error (500). Message is logged but not returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::NotReady(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY"),
            Self::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            Self::Remote(_) => (StatusCode::BAD_GATEWAY, "REMOTE_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::Remote(_) => tracing::error!(error = %self, "remote execution error"),
            Self::NotReady(_) => tracing::debug!(error = %self, "not ready"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail { code: code.to_string(), message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<osforge_core::ValidationError> for AppError {
    fn from(err: osforge_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<osforge_remote::ClusterError> for AppError {
    fn from(err: osforge_remote::ClusterError) -> Self {
        use osforge_remote::ClusterError;
        match err {
            ClusterError::AlreadyExists { .. } => Self::Conflict(err.to_string()),
            ClusterError::NotFound { .. } => Self::NotFound(err.to_string()),
            ClusterError::DeletionTimeout { .. } => Self::Timeout(err.to_string()),
            ClusterError::Api { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<osforge_build::UploadError> for AppError {
    fn from(err: osforge_build::UploadError) -> Self {
        use osforge_build::UploadError;
        match err {
            UploadError::UnitNotReady { .. } => Self::NotReady(err.to_string()),
            UploadError::Validation { .. } => Self::Validation(err.to_string()),
            UploadError::Transfer { .. } | UploadError::Fetch { .. } => {
                Self::Remote(err.to_string())
            }
            UploadError::Cluster(e) => e.into(),
            UploadError::Io(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<osforge_build::StreamError> for AppError {
    fn from(err: osforge_build::StreamError) -> Self {
        use osforge_build::StreamError;
        match err {
            StreamError::UnitNotReady { .. } => Self::NotReady(err.to_string()),
            StreamError::NoArtifact { .. } => Self::Conflict(err.to_string()),
            StreamError::ArtifactMissing { .. } => Self::NotFound(err.to_string()),
            StreamError::UnexpectedClassification { .. } | StreamError::Remote(_) => {
                Self::Remote(err.to_string())
            }
            StreamError::Cluster(e) => e.into(),
        }
    }
}
