//! Error taxonomy for calls against the Todoist API.

use std::time::Duration;

use thiserror::Error;

/// Broad classification of a [`TodoistError`], used by retry decisions and
/// by the MCP boundary when choosing what to tell the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    NotFound,
    RateLimit,
    Validation,
    ServiceUnavailable,
    Network,
    Timeout,
    Sync,
    Unknown,
}

/// Errors raised by the Todoist client, sync protocol and bulk layers.
#[derive(Debug, Clone, Error)]
pub enum TodoistError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        /// Seconds the server (or the local limiter) asked us to wait.
        retry_after: Option<u64>,
    },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Todoist service unavailable ({status}): {message}")]
    ServiceUnavailable { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Sync command {uuid} failed: {message}")]
    Sync {
        uuid: String,
        message: String,
        code: Option<i64>,
    },

    #[error("Unexpected response ({status:?}): {message}")]
    Unknown {
        status: Option<u16>,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, TodoistError>;

impl TodoistError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Validation(_) => ErrorKind::Validation,
            Self::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Sync { .. } => ErrorKind::Sync,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Whether the batch submission path should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimit | ErrorKind::ServiceUnavailable | ErrorKind::Timeout
        )
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            status: None,
            message: message.into(),
        }
    }

    /// Message safe to show outside the process: no response bodies, URLs
    /// or transport internals for the opaque kinds.
    pub fn user_message(&self) -> String {
        match self {
            Self::Authentication(msg) => format!("Authentication failed: {}", msg),
            Self::NotFound(_) => "Resource not found".to_string(),
            Self::RateLimit { retry_after, .. } => match retry_after {
                Some(secs) => format!("Rate limit exceeded, retry after {} seconds", secs),
                None => "Rate limit exceeded, retry later".to_string(),
            },
            Self::Validation(msg) => format!("Invalid request: {}", msg),
            Self::ServiceUnavailable { .. } => "Todoist is temporarily unavailable".to_string(),
            Self::Network(_) => "Could not reach Todoist".to_string(),
            Self::Timeout(_) => "Request timed out".to_string(),
            Self::Sync { message, .. } => format!("Todoist rejected the command: {}", message),
            Self::Unknown { .. } => "Internal server error".to_string(),
        }
    }

    /// Classify a transport-level reqwest failure. `timeout` is the per-call
    /// budget that was configured on the client.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() {
            Self::Network(err.to_string())
        } else if err.is_decode() {
            Self::unknown(format!("Invalid JSON format: {}", err))
        } else {
            Self::unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TodoistError {
    fn from(err: serde_json::Error) -> Self {
        Self::unknown(format!("Invalid JSON format: {}", err))
    }
}
