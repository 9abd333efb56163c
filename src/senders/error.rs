//! Error types for notification senders.

use std::time::Duration;

use thiserror::Error;

/// Defines the possible errors that can occur while configuring a sender or
/// delivering through it.
#[derive(Debug, Error)]
pub enum SenderError {
    /// A sender definition is invalid or incomplete.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No sender is registered for the contact type.
    #[error("Unknown contact type: {0}")]
    UnknownContactType(String),

    /// The contact's destination cannot be used.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// The remote endpoint answered with a non-success status.
    #[error("Delivery rejected with status {status}: {body}")]
    HttpStatus {
        /// Response status code.
        status: u16,
        /// Response body, kept as diagnostic text.
        body: String,
    },

    /// A failure that is expected to go away on its own (network, overload).
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// A failure that retrying will not fix.
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),

    /// The sender did not finish within the allotted time.
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The message template could not be rendered.
    #[error("Template rendering error: {0}")]
    TemplateError(#[from] minijinja::Error),
}

impl SenderError {
    /// Returns true if delivery should be retried later.
    pub fn is_transient(&self) -> bool {
        match self {
            SenderError::Transient(_) | SenderError::Timeout(_) => true,
            SenderError::HttpStatus { status, .. } => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let status = |status| SenderError::HttpStatus { status, body: String::new() };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(status(408).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(301).is_transient());
    }

    #[test]
    fn test_configuration_errors_are_permanent() {
        assert!(!SenderError::ConfigError("missing name".into()).is_transient());
        assert!(!SenderError::UnknownContactType("pager".into()).is_transient());
        assert!(SenderError::Timeout(Duration::from_secs(1)).is_transient());
    }

    #[test]
    fn test_status_error_carries_body() {
        let err = SenderError::HttpStatus { status: 404, body: "not found".into() };
        assert_eq!(err.to_string(), "Delivery rejected with status 404: not found");
    }
}
