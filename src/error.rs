//! Crate-wide error taxonomy.
//!
//! External collaborators (chat, embedding) fail as [`RaglineError::Collaborator`]
//! or [`RaglineError::Timeout`] with the service name attached; bad caller
//! input is [`RaglineError::Validation`]; [`RaglineError::Parse`] marks a
//! malformed model decision and is always recoverable. Binary-level setup
//! (config, bind) uses `anyhow` instead.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RaglineError>;

/// Upper bound on collaborator response bodies carried inside errors.
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum RaglineError {
    /// An external service answered with a non-success status or an
    /// unusable payload. `body` is truncated, never logged wholesale.
    #[error("{service} request failed (HTTP {status}): {body}")]
    Collaborator {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} request timed out after {secs}s")]
    Timeout { service: &'static str, secs: u64 },

    #[error("invalid request: {0}")]
    Validation(String),

    /// A model reply that could not be interpreted as a decision. Callers
    /// degrade gracefully instead of propagating this to the user.
    #[error("unparseable model output: {0}")]
    Parse(String),
}

impl RaglineError {
    pub fn collaborator(service: &'static str, status: u16, body: &str) -> Self {
        Self::Collaborator {
            service,
            status,
            body: truncate_chars(body, MAX_ERROR_BODY_CHARS),
        }
    }

    /// Map a transport error, distinguishing timeouts from other failures.
    pub fn from_reqwest(service: &'static str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                service,
                secs: timeout_secs,
            }
        } else {
            Self::Collaborator {
                service,
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                body: truncate_chars(&err.to_string(), MAX_ERROR_BODY_CHARS),
            }
        }
    }
}

/// First `max` chars of `s` (char-counted, safe on multi-byte text).
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
