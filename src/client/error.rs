//! Client error taxonomy with HTTP status classification.
//!
//! `AuthExpired` is never retried; the session observer decides where the user
//! goes next. `Conflict` means the caller's view of submission state is stale
//! and must be re-fetched.

use crate::workflow::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Rejected locally, before any request was made
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Token expired locally or the server answered 401
    #[error("Session expired, please sign in again")]
    AuthExpired,

    /// Server state moved on (409)
    #[error("State changed, please refresh: {0}")]
    Conflict(String),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Server refused the request body (400, 413, 422)
    #[error("Request rejected: {0}")]
    BadRequest(String),

    /// Connection failed or timed out
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl ClientError {
    /// Failures that the next poll may clear on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Server { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::AuthExpired)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            ClientError::Network(format!("Connection failed: {}", e))
        } else if e.is_decode() {
            ClientError::Parse(e.to_string())
        } else {
            ClientError::Network(format!("Request failed: {}", e))
        }
    }
}

/// Map a non-success HTTP status and body to an error.
pub fn classify_http_status(status: u16, body: String) -> ClientError {
    match status {
        401 => ClientError::AuthExpired,
        403 => ClientError::Forbidden(body),
        404 => ClientError::NotFound(body),
        409 => ClientError::Conflict(body),
        400 | 413 | 422 => ClientError::BadRequest(body),
        _ => ClientError::Server {
            status,
            message: body,
        },
    }
}
