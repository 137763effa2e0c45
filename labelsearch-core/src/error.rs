//! Error types for labelsearch operations.

use thiserror::Error;

/// Result type alias using labelsearch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during labelsearch operations.
///
/// Partial bulk failures are not errors: they are reported through
/// [`BulkReport`](crate::bulk::BulkReport) so callers can decide remediation.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied arguments violate an invariant. Never retried.
    #[error("precondition failed in {operation}: {reason}")]
    Precondition {
        operation: &'static str,
        reason: String,
    },

    /// A filter node cannot be compiled against the dataset schema.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A text query does not follow the query grammar.
    #[error("invalid text query: {0}")]
    InvalidQuery(String),

    /// Index (or mapping) already exists with a shape we did not create.
    #[error("index {index} already exists")]
    SchemaConflict { index: String },

    /// Timeout, connection failure or 5xx after retries were exhausted.
    #[error("transient backend error in {operation}: {reason}")]
    Transient {
        operation: &'static str,
        reason: String,
    },

    /// Document or index not found.
    #[error("{id} not found in index {index}")]
    NotFound { index: String, id: String },

    /// Non-retryable backend rejection, surfaced verbatim.
    #[error("backend rejected {operation} with status {status} ({kind}): {reason}")]
    Backend {
        operation: &'static str,
        status: u16,
        kind: String,
        reason: String,
    },

    /// Backend answered with a body we could not interpret.
    #[error("unexpected backend response in {operation}: {reason}")]
    UnexpectedResponse {
        operation: &'static str,
        reason: String,
    },

    /// Configuration rejected by validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client failure that is not a timeout or connection error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Shorthand for a [`Error::Precondition`].
    pub fn precondition(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Precondition {
            operation,
            reason: reason.into(),
        }
    }

    /// Returns true when the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient { .. } => true,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Returns true for errors raised before any request was sent.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::Precondition { .. } | Error::InvalidFilter(_) | Error::InvalidQuery(_)
        )
    }

    /// Returns true for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::precondition("similarity_search", "both value and record given");
        assert_eq!(
            err.to_string(),
            "precondition failed in similarity_search: both value and record given"
        );

        let err = Error::Backend {
            operation: "search",
            status: 400,
            kind: "parsing_exception".into(),
            reason: "unknown query [foo]".into(),
        };
        assert_eq!(
            err.to_string(),
            "backend rejected search with status 400 (parsing_exception): unknown query [foo]"
        );
    }

    #[test]
    fn test_error_classification() {
        let transient = Error::Transient {
            operation: "bulk",
            reason: "503".into(),
        };
        assert!(transient.is_transient());
        assert!(!transient.is_precondition());

        assert!(Error::InvalidFilter("x".into()).is_precondition());
        assert!(Error::NotFound {
            index: "i".into(),
            id: "1".into()
        }
        .is_not_found());
        assert!(!Error::SchemaConflict { index: "i".into() }.is_transient());
    }
}
