//! Error types for the careerpath client.

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Main error type for the streaming client.
///
/// Malformed frames and protocol violations are absent: they
/// are absorbed by the reducer and counted in
/// [`Diagnostics`](crate::transcript::Diagnostics) instead of failing a session.
#[derive(Debug, Error)]
pub enum StreamError {
    // Transport errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    #[error("Stream ended before any reply was received")]
    Truncated,

    // Session errors
    #[error("A request is already in flight for this conversation")]
    Busy,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // File system errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a status error for a non-success response.
    pub fn status(status: u16, endpoint: impl Into<String>) -> Self {
        Self::Status {
            status,
            endpoint: endpoint.into(),
        }
    }

    /// Check if this error came from the transport (connect, read, status, truncation).
    ///
    /// Transport errors finalize a session with the failure notice and are
    /// never retried by the client.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Status { .. } | Self::Truncated
        )
    }

    /// Check if this error is a busy rejection.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// HTTP status code, if the server answered with one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error() {
        let err = StreamError::status(503, "/api/chat/stream");
        assert!(err.is_transport());
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.to_string(), "HTTP 503 from /api/chat/stream");
    }

    #[test]
    fn test_busy_is_not_transport() {
        let err = StreamError::Busy;
        assert!(err.is_busy());
        assert!(!err.is_transport());
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_config_error() {
        let err = StreamError::config("base_url is empty");
        assert!(matches!(err, StreamError::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: base_url is empty");
    }

    #[test]
    fn test_truncated_is_transport() {
        assert!(StreamError::Truncated.is_transport());
        assert!(!StreamError::internal("join failed").is_transport());
    }
}
