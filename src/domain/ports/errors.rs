//! Errors surfaced by external collaborators.

use thiserror::Error;

/// Failure classes for project-management, chat, and language-model calls.
///
/// Transient classes are eligible for retry with backoff; the rest
/// propagate immediately.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("rate limited")]
    RateLimited,

    #[error("service error {status}: {message}")]
    Service { status: u16, message: String },

    #[error("authentication failed")]
    Auth,

    #[error("validation rejected: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("delivery rejected: {0}")]
    Delivery(String),
}

impl CollaboratorError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) | Self::RateLimited => true,
            Self::Service { status, .. } => *status >= 500,
            Self::Auth | Self::Validation(_) | Self::NotFound(_) | Self::Delivery(_) => false,
        }
    }
}

/// Errors from the persistent key-value store backing the cache.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}
