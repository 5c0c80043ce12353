//! Error types for BuildIt.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("dependency failed: {0}")]
    DependencyFailed(String),

    #[error("sandbox timeout after {elapsed_ms}ms")]
    SandboxTimeout { elapsed_ms: u64 },

    #[error("sandbox crashed: {0}")]
    SandboxCrash(String),

    #[error("sandbox violation: {0}")]
    SandboxViolation(String),

    #[error("bundle unrecoverable: {0}")]
    BundleUnrecoverable(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("insufficient scope: missing {0}")]
    InsufficientScope(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The language-neutral error kind, as named in the error taxonomy.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::QueueUnavailable(_) => "queue_unavailable",
            Error::DependencyFailed(_) => "dependency_failed",
            Error::SandboxTimeout { .. } => "sandbox_timeout",
            Error::SandboxCrash(_) => "sandbox_crash",
            Error::SandboxViolation(_) => "sandbox_violation",
            Error::BundleUnrecoverable(_) => "bundle_unrecoverable",
            Error::ChecksumMismatch { .. } => "checksum_mismatch",
            Error::Unauthorized(_) => "unauthorized",
            Error::InsufficientScope(_) => "insufficient_scope",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether a job-run failure of this kind is eligible for retry under a retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::QueueUnavailable(_)
                | Error::DependencyFailed(_)
                | Error::SandboxTimeout { .. }
                | Error::SandboxCrash(_)
        )
    }

    /// Truncate an error message to the 500-character cap used for entity `error_message` columns.
    pub fn truncated_message(&self) -> String {
        let message = self.to_string();
        if message.len() <= 500 {
            message
        } else {
            message.chars().take(500).collect()
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
