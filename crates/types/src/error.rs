//! Error types for Text2Everything models using snafu.
//!
//! Model errors are raised while building or decoding payloads, before any
//! request reaches the network. They carry enough context to point at the
//! offending field.

use snafu::Snafu;

/// Result type for model operations.
pub type Result<T, E = ModelError> = std::result::Result<T, E>;

/// Errors raised while validating or decoding domain models.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum ModelError {
    /// Schema data does not match any supported schema shape.
    #[snafu(display("Schema data validation failed: {}", problems.join("; ")))]
    InvalidSchema {
        /// Every structural problem found, in document order.
        problems: Vec<String>,
    },

    /// A single field violates a payload constraint.
    #[snafu(display("Invalid {field}: {constraint}"))]
    InvalidField {
        /// The field that failed validation.
        field: String,
        /// Description of the violated constraint.
        constraint: String,
    },

    /// A server value could not be decoded into the requested model.
    #[snafu(display("Failed to decode {what}: {message}"))]
    Decode {
        /// What was being decoded.
        what: String,
        /// Underlying decoder message.
        message: String,
    },
}

impl ModelError {
    /// Builds an [`ModelError::InvalidField`] for `field`.
    pub fn invalid_field(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self::InvalidField { field: field.into(), constraint: constraint.into() }
    }
}
