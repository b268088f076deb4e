//! Error types for Rulesmith

use std::time::Duration;

use crate::media::UnsupportedMediaError;
use crate::validate::ValidationError;

/// Result type alias using Rulesmith's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Rulesmith operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Model credentials or endpoint are missing or unusable
    #[error("configuration error: {0}")]
    Config(String),

    /// An uploaded file is neither an image nor a video
    #[error(transparent)]
    UnsupportedMedia(#[from] UnsupportedMediaError),

    /// The model produced a structure that breaks the rule graph contract
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The external model call failed
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failures of the external model call
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("model endpoint rate limited the request")]
    RateLimited,

    #[error("model endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model refused to answer: {0}")]
    Refused(String),

    #[error("model output does not match the rule schema: {0}")]
    MalformedOutput(String),
}

impl UpstreamError {
    /// Short label used for metrics and error bodies
    pub fn label(&self) -> &'static str {
        match self {
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::Transport(_) => "transport",
            UpstreamError::RateLimited => "rate_limited",
            UpstreamError::Status { .. } => "status",
            UpstreamError::Refused(_) => "refused",
            UpstreamError::MalformedOutput(_) => "malformed_output",
        }
    }
}

/// Machine-readable classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    UnsupportedMedia,
    Validation,
    Upstream,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::UnsupportedMedia => "unsupported_media",
            ErrorKind::Validation => "validation",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::UnsupportedMedia(_) => ErrorKind::UnsupportedMedia,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Upstream(_) => ErrorKind::Upstream,
            Error::Io(_) | Error::Serialization(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Upstream failures are transient; a validation failure only changes if the
    /// caller asks the model again, which is the caller's decision.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Upstream(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::ValidationError;

    #[test]
    fn test_upstream_errors_are_retryable() {
        let err = Error::from(UpstreamError::Timeout(Duration::from_secs(5)));
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.is_retryable());

        let err = Error::from(UpstreamError::RateLimited);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_validation_and_config_are_not_retryable() {
        let err = Error::from(ValidationError::EmptyAlertMessage);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());

        let err = Error::config("OPENAI_API_KEY is not set");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_upstream_labels() {
        assert_eq!(UpstreamError::RateLimited.label(), "rate_limited");
        assert_eq!(
            UpstreamError::Status { status: 500, body: String::new() }.label(),
            "status"
        );
    }
}
