//! Error types for dispatch and per-channel delivery.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for fallible dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Pre-flight failures that abort a dispatch before any channel runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No enabled notification channels")]
    NoChannels,
}

impl DispatchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Classification of a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network-level failure: connect, reset, transport timeout.
    Transport,
    /// The remote service answered with a 5xx-class status.
    Server,
    /// The remote service is throttling us.
    RateLimited,
    /// Credentials were rejected.
    Auth,
    /// The remote service rejected the request as malformed.
    InvalidRequest,
    /// The adapter refused the input locally.
    Validation,
    /// An attempt or channel deadline was exceeded.
    Timeout,
    /// The adapter misbehaved (panicked, returned garbage).
    Internal,
}

impl ErrorKind {
    /// Whether a failure of this kind may succeed if tried again.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transport | Self::Server | Self::RateLimited)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Server => "server",
            Self::RateLimited => "rate_limited",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid_request",
            Self::Validation => "validation",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed attempt as reported by a channel adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ChannelError {
    pub kind: ErrorKind,
    pub message: String,
    /// Server-provided hint for how long to back off (rate limits).
    pub retry_after: Option<Duration>,
}

impl ChannelError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(ErrorKind::RateLimited, message)
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Classify an HTTP status code returned by a remote service.
    ///
    /// 429 is throttling, 401/403 are credential rejections, other 4xx are
    /// malformed requests and everything else non-2xx is a server fault.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => ErrorKind::RateLimited,
            401 | 403 => ErrorKind::Auth,
            400..=499 => ErrorKind::InvalidRequest,
            _ => ErrorKind::Server,
        };
        Self::new(kind, message)
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Transport.is_retryable());
        assert!(ErrorKind::Server.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::Auth.is_retryable());
        assert!(!ErrorKind::InvalidRequest.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::Internal.is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(ChannelError::from_status(429, "slow down").kind, ErrorKind::RateLimited);
        assert_eq!(ChannelError::from_status(401, "nope").kind, ErrorKind::Auth);
        assert_eq!(ChannelError::from_status(403, "nope").kind, ErrorKind::Auth);
        assert_eq!(ChannelError::from_status(404, "gone").kind, ErrorKind::InvalidRequest);
        assert_eq!(ChannelError::from_status(502, "bad gateway").kind, ErrorKind::Server);
        assert_eq!(ChannelError::from_status(503, "unavailable").kind, ErrorKind::Server);
    }

    #[test]
    fn test_display() {
        let err = ChannelError::transport("connection reset");
        assert_eq!(err.to_string(), "transport: connection reset");
        assert_eq!(
            DispatchError::validation("title is empty").to_string(),
            "Validation error: title is empty"
        );
    }

    #[test]
    fn test_rate_limited_carries_hint() {
        let err = ChannelError::rate_limited("429", Some(Duration::from_secs(3)));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after, Some(Duration::from_secs(3)));
    }
}
