//! Error types shared by the API client, the query cache, and the hook facade.
//!
//! Three kinds of failure flow through the crate:
//!
//! - [`Error::Transport`] - the request never produced an HTTP status
//!   (connection refused, timeout, malformed response body)
//! - [`Error::Api`] - the server answered with a non-2xx status, optionally
//!   carrying per-field validation messages
//! - [`Error::Validation`] - input rejected locally, before any network call
//!
//! Errors are `Clone` because query and mutation state is published through
//! watch channels that every subscriber reads.

use std::collections::HashMap;
use std::fmt;

/// Error type for API, query, and mutation operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Connection-level failure before an HTTP status was received.
    #[error("network error: {0}")]
    Transport(String),

    /// Non-2xx response from the record store.
    #[error("api error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Human-readable message from the response body, or a fallback.
        message: String,
        /// Per-field validation messages reported by the server, if any.
        field_errors: Option<HashMap<String, String>>,
    },

    /// Input rejected by client-side validation; no request was made.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
}

impl Error {
    /// Returns `true` for connection-level failures. Only these are retried
    /// by the cache's read path.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` for client-side validation failures.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns the HTTP status code, if the server answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Looks up the message for a single field, whether the error came from
    /// client-side validation or from the server's field errors.
    #[must_use]
    pub fn field_error(&self, field: &str) -> Option<&str> {
        match self {
            Self::Validation(errors) => errors.get(field),
            Self::Api {
                field_errors: Some(map),
                ..
            } => map.get(field).map(String::as_str),
            _ => None,
        }
    }
}

/// A collection of per-field validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(pub Vec<FieldError>);

impl FieldErrors {
    /// Returns the message for the given field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    /// Returns `true` if no field failed validation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

/// A single failed field and its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The form field that failed.
    pub field: &'static str,
    /// Human-readable message suitable for display next to the field.
    pub message: String,
}

impl FieldError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}
