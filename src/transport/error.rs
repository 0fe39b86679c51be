//! Error taxonomy shared by every layer of the client.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by a call to the remote API.
///
/// Cloneable so a settled failure can be stored in call state and handed to
/// callbacks at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No response reached the client.
    #[error("network error: {0}")]
    Network(String),

    /// No response within the transport budget.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with a failure status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The credential was rejected; the session has been ended.
    #[error("authorization failed: {0}")]
    Auth(String),

    /// Success status but the body could not be decoded.
    #[error("failed to decode response body: {0}")]
    Decode(String),

    /// Offline with no cached or fallback data available.
    #[error("offline and no cached or fallback data is available")]
    Offline,

    /// Offline; the request was accepted for replay once connectivity returns.
    #[error("offline: request queued for replay")]
    OfflineQueued,

    /// The request could not be built (bad URL, unserializable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse classification used to map errors to UI treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Network,
    Timeout,
    Auth,
    NotFound,
    Forbidden,
    Validation,
    Server,
    Decode,
    Offline,
    Pending,
    Other,
}

impl ApiError {
    /// Only connectivity-class failures and 5xx responses are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => true,
            ApiError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True for errors that end the current session.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }

    /// HTTP status attached to the error, if the server responded.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Auth(_) => Some(401),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Network(_) => ErrorCategory::Network,
            ApiError::Timeout(_) => ErrorCategory::Timeout,
            ApiError::Auth(_) => ErrorCategory::Auth,
            ApiError::Decode(_) => ErrorCategory::Decode,
            ApiError::Offline => ErrorCategory::Offline,
            ApiError::OfflineQueued => ErrorCategory::Pending,
            ApiError::InvalidRequest(_) => ErrorCategory::Other,
            ApiError::Http { status, .. } => match *status {
                404 => ErrorCategory::NotFound,
                403 => ErrorCategory::Forbidden,
                400 | 409 | 422 => ErrorCategory::Validation,
                s if s >= 500 => ErrorCategory::Server,
                _ => ErrorCategory::Other,
            },
        }
    }

    /// The single user-facing message for this error kind.
    ///
    /// Validation failures carry the server's own message so it can be shown
    /// next to the offending field.
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => "Unable to reach the server. Check your connection.".to_string(),
            ErrorCategory::Timeout => "The server took too long to respond.".to_string(),
            ErrorCategory::Auth => "Your session has expired. Please sign in again.".to_string(),
            ErrorCategory::NotFound => "The requested resource was not found.".to_string(),
            ErrorCategory::Forbidden => "You do not have permission to perform this action.".to_string(),
            ErrorCategory::Server => "The server encountered an error. Please try again later.".to_string(),
            ErrorCategory::Decode => "Received an unexpected response from the server.".to_string(),
            ErrorCategory::Offline => "You are offline.".to_string(),
            ErrorCategory::Pending => "You are offline. The request will be sent when you reconnect.".to_string(),
            ErrorCategory::Validation => match self {
                ApiError::Http { message, .. } if !message.is_empty() => message.clone(),
                _ => "The request was invalid.".to_string(),
            },
            ErrorCategory::Other => "Something went wrong.".to_string(),
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "network",
            ApiError::Timeout(_) => "timeout",
            ApiError::Http { .. } => "http",
            ApiError::Auth(_) => "auth",
            ApiError::Decode(_) => "decode",
            ApiError::Offline => "offline",
            ApiError::OfflineQueued => "offline_queued",
            ApiError::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
