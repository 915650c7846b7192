//! SDK-specific error types with recovery context.
//!
//! Provides a two-tier error model:
//! - **Transport errors**: connection failures, timeouts, HTTP status codes
//! - **Operation errors**: bulk submission failures, malformed responses,
//!   and misuse of the bulk API
//!
//! Errors carry a retryability classification used by the retry layer.

use std::time::Duration;

use snafu::{Location, Snafu};
use text2everything_types::{ModelError, ResourceKind};

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;

/// SDK error types with context-rich error messages.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SdkError {
    /// Failed to reach the server.
    #[snafu(display("Connection error at {location}: {message}"))]
    Connection {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Request did not complete within the configured timeout.
    #[snafu(display("Request timed out: {message}"))]
    Timeout {
        /// Error description.
        message: String,
    },

    /// The server rejected the request body (HTTP 400).
    #[snafu(display("Validation error: {message}"))]
    Validation {
        /// Message from the server.
        message: String,
    },

    /// Credentials were missing or rejected (HTTP 401/403).
    #[snafu(display("Authentication failed (HTTP {status}): {message}"))]
    Authentication {
        /// HTTP status code.
        status: u16,
        /// Message from the server.
        message: String,
    },

    /// The addressed resource does not exist (HTTP 404).
    #[snafu(display("Not found: {message}"))]
    NotFound {
        /// Message from the server.
        message: String,
    },

    /// The server throttled the request (HTTP 429).
    #[snafu(display("Rate limit exceeded: {message}"))]
    RateLimited {
        /// Message from the server.
        message: String,
        /// Delay requested through `Retry-After`, if any.
        retry_after: Option<Duration>,
    },

    /// The server failed to handle the request (HTTP 5xx).
    #[snafu(display("Server error (HTTP {status}): {message}"))]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the server.
        message: String,
    },

    /// Any other non-success HTTP status.
    #[snafu(display("HTTP {status}: {message}"))]
    Http {
        /// HTTP status code.
        status: u16,
        /// Message from the server.
        message: String,
    },

    /// A success response did not have the expected shape.
    #[snafu(display("Unexpected response shape: {message}"))]
    ResponseShape {
        /// What was wrong with the response.
        message: String,
    },

    /// A payload or server record failed model validation.
    #[snafu(display("Model error: {source}"))]
    Model {
        /// Underlying model error.
        source: ModelError,
    },

    /// The bulk endpoint failed for the whole submission.
    #[snafu(display("Bulk submission of {count} {kind} inputs failed: {source}"))]
    BulkSubmissionFailed {
        /// Resource kind being created.
        kind: ResourceKind,
        /// Number of inputs in the submission.
        count: usize,
        /// Error that failed the submission.
        source: Box<SdkError>,
    },

    /// Retry attempts exhausted.
    #[snafu(display("Retry exhausted after {attempts} attempts: {last_error}"))]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last error message before giving up.
        last_error: String,
    },

    /// Bulk operation called with no inputs.
    #[snafu(display("Bulk {kind} operation requires at least one input"))]
    EmptyInput {
        /// Resource kind of the rejected call.
        kind: ResourceKind,
    },

    /// A bulk call mixed payloads of different resource kinds.
    #[snafu(display(
        "Input {sequence_index} is a {found} payload but the operation creates {expected}"
    ))]
    ResourceKindMismatch {
        /// Position of the offending input.
        sequence_index: usize,
        /// Kind the operation creates.
        expected: ResourceKind,
        /// Kind of the offending payload.
        found: ResourceKind,
    },

    /// The operation does not exist for this resource kind.
    #[snafu(display("{operation} is not supported for {kind}"))]
    UnsupportedOperation {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Kind of the handle it was called on.
        kind: ResourceKind,
    },

    /// Configuration validation error.
    #[snafu(display("Configuration error: {message}"))]
    Config {
        /// Error description.
        message: String,
    },

    /// URL parsing error.
    #[snafu(display("Invalid URL '{url}': {message}"))]
    InvalidUrl {
        /// The invalid URL.
        url: String,
        /// Parse error description.
        message: String,
    },

    /// Operation was cancelled before it was dispatched or completed.
    #[snafu(display("Operation cancelled"))]
    Cancelled,
}

impl SdkError {
    /// Builds the error matching an HTTP failure status.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let message = message.into();
        match status {
            400 => Self::Validation { message },
            401 | 403 => Self::Authentication { status, message },
            404 => Self::NotFound { message },
            429 => Self::RateLimited { message, retry_after },
            500..=599 => Self::Server { status, message },
            _ => Self::Http { status, message },
        }
    }

    /// Returns true if the error is transient and the operation should be retried.
    ///
    /// Retryable errors:
    /// - Connection failures and timeouts
    /// - HTTP 429 (rate limited)
    /// - HTTP 5xx
    ///
    /// Everything else, including validation rejections and misuse of the
    /// API, fails immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Timeout { .. } => true,
            Self::RateLimited { .. } => true,
            Self::Server { .. } => true,
            // Non-retryable
            Self::Validation { .. } => false,
            Self::Authentication { .. } => false,
            Self::NotFound { .. } => false,
            Self::Http { .. } => false,
            Self::ResponseShape { .. } => false,
            Self::Model { .. } => false,
            Self::BulkSubmissionFailed { .. } => false,
            Self::RetryExhausted { .. } => false,
            Self::EmptyInput { .. } => false,
            Self::ResourceKindMismatch { .. } => false,
            Self::UnsupportedOperation { .. } => false,
            Self::Config { .. } => false,
            Self::InvalidUrl { .. } => false,
            Self::Cancelled => false,
        }
    }

    /// Returns the server-requested delay before retrying, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the HTTP status code if the error came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { .. } => Some(400),
            Self::NotFound { .. } => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::Authentication { status, .. }
            | Self::Server { status, .. }
            | Self::Http { status, .. } => Some(*status),
            Self::BulkSubmissionFailed { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Returns true for errors caused by calling the API incorrectly, which
    /// surface immediately instead of being recorded per item.
    #[must_use]
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput { .. }
                | Self::ResourceKindMismatch { .. }
                | Self::UnsupportedOperation { .. }
        )
    }

    /// Short classification used in structured logs.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Timeout { .. } => "timeout",
            Self::Validation { .. } => "validation",
            Self::Authentication { .. } => "authentication",
            Self::NotFound { .. } => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::Server { .. } => "server",
            Self::Http { .. } => "http",
            Self::ResponseShape { .. } => "response_shape",
            Self::Model { .. } => "model",
            Self::BulkSubmissionFailed { .. } => "bulk_submission_failed",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::EmptyInput { .. } => "empty_input",
            Self::ResourceKindMismatch { .. } => "resource_kind_mismatch",
            Self::UnsupportedOperation { .. } => "unsupported_operation",
            Self::Config { .. } => "config",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<ModelError> for SdkError {
    fn from(source: ModelError) -> Self {
        Self::Model { source }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(SdkError::from_status(400, "bad", None), SdkError::Validation { .. }));
        assert!(matches!(
            SdkError::from_status(401, "nope", None),
            SdkError::Authentication { status: 401, .. }
        ));
        assert!(matches!(SdkError::from_status(404, "gone", None), SdkError::NotFound { .. }));
        assert!(matches!(
            SdkError::from_status(503, "down", None),
            SdkError::Server { status: 503, .. }
        ));
        assert!(matches!(
            SdkError::from_status(409, "conflict", None),
            SdkError::Http { status: 409, .. }
        ));
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let err = SdkError::from_status(429, "slow down", Some(Duration::from_secs(3)));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SdkError::from_status(500, "boom", None).is_retryable());
        assert!(SdkError::Timeout { message: "read".to_owned() }.is_retryable());
        assert!(!SdkError::from_status(400, "bad", None).is_retryable());
        assert!(!SdkError::from_status(404, "gone", None).is_retryable());
        assert!(!SdkError::Cancelled.is_retryable());
        assert!(
            !SdkError::RetryExhausted { attempts: 3, last_error: "x".to_owned() }.is_retryable()
        );
    }

    #[test]
    fn test_bulk_failure_exposes_inner_status() {
        let err = SdkError::BulkSubmissionFailed {
            kind: ResourceKind::SchemaMetadata,
            count: 2,
            source: Box::new(SdkError::from_status(502, "bad gateway", None)),
        };
        assert_eq!(err.status(), Some(502));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("2 schema_metadata inputs"));
    }

    #[test]
    fn test_programmer_errors() {
        assert!(SdkError::EmptyInput { kind: ResourceKind::Context }.is_programmer_error());
        assert!(
            SdkError::ResourceKindMismatch {
                sequence_index: 1,
                expected: ResourceKind::Context,
                found: ResourceKind::GoldenExample,
            }
            .is_programmer_error()
        );
        assert!(!SdkError::Cancelled.is_programmer_error());
    }

    #[test]
    fn test_unsupported_operation() {
        let err = SdkError::UnsupportedOperation {
            operation: "list_by_type",
            kind: ResourceKind::Context,
        };
        assert!(err.is_programmer_error());
        assert!(!err.is_retryable());
        assert_eq!(err.error_type(), "unsupported_operation");
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "list_by_type is not supported for context");
    }

    #[test]
    fn test_model_error_conversion() {
        let err: SdkError = ModelError::invalid_field("name", "must not be empty").into();
        assert_eq!(err.error_type(), "model");
        assert!(err.to_string().contains("Invalid name"));
    }
}
