//! Job-facing error taxonomy for the ingestion core.
//!
//! Each variant maps to a distinct caller-visible failure kind so import
//! results can report "timeout" or "file too large" instead of a generic
//! failure. `InvariantViolation` is an internal-bug signal and must fail
//! loudly rather than be absorbed.

use thiserror::Error;

/// Errors surfaced by ingestion operations.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    /// Malformed input that will never succeed on retry.
    #[error("invalid input: {reason}\n  Suggestion: {suggestion}")]
    Validation {
        /// Why the input was rejected.
        reason: String,
        /// How to fix the issue.
        suggestion: String,
    },

    /// An extraction pass or provider call exceeded its wall-clock budget.
    #[error("{operation} timed out after {budget_secs}s\n  Suggestion: resubmit the job or reduce the input size")]
    Timeout {
        /// The operation that exceeded its budget.
        operation: String,
        /// The configured budget in seconds.
        budget_secs: u64,
    },

    /// Payload or extracted text exceeds a configured cap.
    #[error("{what} exceeds the configured limit ({actual} > {limit})\n  Suggestion: split the upload or use a structured format")]
    SizeLimit {
        /// What was measured (bytes, characters).
        what: String,
        /// Measured size.
        actual: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// One external search provider failed. Recorded per-source; the job
    /// aborts only when every provider fails.
    #[error("provider '{provider}' failed: {message}")]
    Provider {
        /// The failing provider's name.
        provider: String,
        /// Human-readable cause.
        message: String,
    },

    /// Internal consistency check failed. This is a bug in the engine, not
    /// caller misuse.
    #[error("invariant violation: {detail}")]
    InvariantViolation {
        /// What was violated, with enough context to debug.
        detail: String,
    },
}

impl IngestError {
    /// Creates a `Validation` error for an unsupported file extension.
    #[must_use]
    pub fn unsupported_extension(filename: &str) -> Self {
        Self::Validation {
            reason: format!("unsupported file extension in '{filename}'"),
            suggestion: "Upload a .ris, .bib, .pdf, or .docx file".to_string(),
        }
    }

    /// Creates a `Validation` error with a custom reason.
    #[must_use]
    pub fn validation(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a `Timeout` error for a named operation.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, budget: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            budget_secs: budget.as_secs(),
        }
    }

    /// Creates a `SizeLimit` error for an oversized payload.
    #[must_use]
    pub fn size_limit(what: impl Into<String>, actual: usize, limit: usize) -> Self {
        Self::SizeLimit {
            what: what.into(),
            actual,
            limit,
        }
    }

    /// Creates a `Provider` error for a named source.
    #[must_use]
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates an `InvariantViolation` error.
    #[must_use]
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            detail: detail.into(),
        }
    }

    /// Returns true when resubmitting the job could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Provider { .. })
    }

    /// Returns the stable kind label used in job error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Timeout { .. } => "timeout",
            Self::SizeLimit { .. } => "size_limit",
            Self::Provider { .. } => "provider",
            Self::InvariantViolation { .. } => "invariant_violation",
        }
    }
}
