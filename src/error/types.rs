//! Core error types.

use thiserror::Error;

/// Status codes that the transport treats as transient server-side failures.
pub const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Coarse classification used for retry decisions and user-facing summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Client,
    Server,
    Network,
    Parsing,
    Validation,
    Cancelled,
    Routing,
    Unknown,
}

/// Error type shared by the transport, decoder, collector and router.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Generic HTTP failure that is not known to be transient.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Upstream API returned a non-success status.
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// 429 Too Many Requests.
    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),

    /// Quota exhausted (not transient).
    #[error("Quota exceeded: {0}")]
    QuotaExceededError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The request (or a connection phase) timed out.
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// A transient connection failure (refused, reset, aborted).
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The caller cancelled the operation or its deadline elapsed.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A payload line that should carry structured data was malformed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The byte stream failed or ended in an invalid state.
    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("JSON error: {0}")]
    JsonError(String),

    /// No endpoint could serve the requested model.
    #[error("Routing error: {0}")]
    RoutingError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LlmError {
    /// Create an API error from a status code and message.
    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create an API error carrying structured details (e.g. the response body).
    pub fn api_error_with_details(
        code: u16,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// HTTP status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { code, .. } => Some(*code),
            Self::RateLimitError(_) => Some(429),
            Self::AuthenticationError(_) => Some(401),
            Self::NotFound(_) => Some(404),
            _ => None,
        }
    }

    /// Whether the resilient transport may retry after this error.
    ///
    /// Cancellation is never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { code, .. } => RETRYABLE_STATUS_CODES.contains(code),
            Self::RateLimitError(_) | Self::TimeoutError(_) | Self::ConnectionError(_) => true,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationError(_) => ErrorCategory::Authentication,
            Self::RateLimitError(_) | Self::QuotaExceededError(_) => ErrorCategory::RateLimit,
            Self::ApiError { code, .. } if *code >= 500 => ErrorCategory::Server,
            Self::ApiError { .. } | Self::NotFound(_) => ErrorCategory::Client,
            Self::InvalidInput(_) | Self::ConfigurationError(_) => ErrorCategory::Validation,
            Self::HttpError(_)
            | Self::TimeoutError(_)
            | Self::ConnectionError(_)
            | Self::IoError(_) => ErrorCategory::Network,
            Self::ParseError(_) | Self::StreamError(_) | Self::JsonError(_) => {
                ErrorCategory::Parsing
            }
            Self::Cancelled(_) => ErrorCategory::Cancelled,
            Self::RoutingError(_) => ErrorCategory::Routing,
            Self::InternalError(_) => ErrorCategory::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_match_transport_set() {
        for code in RETRYABLE_STATUS_CODES {
            assert!(LlmError::api_error(code, "x").is_retryable(), "{code}");
        }
        for code in [400, 401, 403, 404, 409, 422, 501] {
            assert!(!LlmError::api_error(code, "x").is_retryable(), "{code}");
        }
    }

    #[test]
    fn cancellation_is_never_retryable() {
        let err = LlmError::Cancelled("caller".into());
        assert!(!err.is_retryable());
        assert!(err.is_cancelled());
        assert_eq!(err.category(), ErrorCategory::Cancelled);
    }

    #[test]
    fn categories() {
        assert_eq!(
            LlmError::api_error(503, "down").category(),
            ErrorCategory::Server
        );
        assert_eq!(
            LlmError::api_error(404, "nope").category(),
            ErrorCategory::Client
        );
        assert_eq!(
            LlmError::TimeoutError("t".into()).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            LlmError::ParseError("p".into()).category(),
            ErrorCategory::Parsing
        );
    }
}
