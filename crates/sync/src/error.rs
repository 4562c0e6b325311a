//! Error types for the remote store and sync operations.

use thiserror::Error;

/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// PostgreSQL SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Errors that can occur while talking to the hosted backend.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the backend
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Backend could not be reached at all
    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    /// Invalid configuration or request (bad URL, empty key, missing data)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend answered with a body we could not use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Create an API error from status, optional backend code and message
    pub fn api(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the backend is offline or unreachable rather than rejecting a record.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Http(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            Self::Api { status, .. } => matches!(*status, 502..=504),
            _ => false,
        }
    }

    /// True when an insert collided with an existing unique key.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Api { status, code, .. } => {
                *status == 409 || code.as_deref() == Some(UNIQUE_VIOLATION_CODE)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_conflict() {
        let err = RemoteError::api(
            400,
            Some("23505".to_string()),
            "duplicate key value violates unique constraint",
        );
        assert!(err.is_conflict());
        assert!(RemoteError::api(409, None, "conflict").is_conflict());
        assert!(!RemoteError::api(400, None, "bad request").is_conflict());
    }

    #[test]
    fn gateway_errors_count_as_unreachable() {
        assert!(RemoteError::api(503, None, "maintenance").is_unreachable());
        assert!(RemoteError::unreachable("offline").is_unreachable());
        assert!(!RemoteError::api(500, None, "boom").is_unreachable());
        assert!(!RemoteError::invalid_request("bad url").is_unreachable());
    }
}
