//! Client error types.

use thiserror::Error;

/// Errors from gateway API calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The gateway returned a non-2xx status.
    #[error("gateway {endpoint} returned {status}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        /// Message from the structured error body, or the raw body when
        /// it was not parseable.
        message: String,
    },

    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Invalid base URL or client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A wait on the build's lifecycle exceeded its window.
    #[error("timed out waiting for build {name:?}")]
    WaitTimeout { name: String },

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether the gateway signalled a retryable not-ready condition.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::Api { status: 503, .. })
    }
}
