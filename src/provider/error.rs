//! Error types for search provider operations.

use thiserror::Error;

/// Errors from one provider call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider returned a non-success HTTP status.
    #[error("{provider} returned HTTP {status}: {context}")]
    HttpStatus {
        /// Provider name.
        provider: String,
        /// HTTP status code.
        status: u16,
        /// What was being fetched.
        context: String,
    },

    /// The request failed before a response arrived (DNS, TLS, connection).
    #[error("{provider} request failed: {message}")]
    Network {
        /// Provider name.
        provider: String,
        /// Transport-level cause.
        message: String,
    },

    /// The per-call timeout elapsed.
    #[error("{provider} call timed out after {budget_secs}s")]
    Timeout {
        /// Provider name.
        provider: String,
        /// Configured per-call budget in seconds.
        budget_secs: u64,
    },

    /// The response body could not be interpreted.
    #[error("{provider} response could not be parsed: {message}")]
    Parse {
        /// Provider name.
        provider: String,
        /// Parse-level cause.
        message: String,
    },
}

impl ProviderError {
    /// Creates an `HttpStatus` error.
    #[must_use]
    pub fn http_status(provider: &str, status: u16, context: impl Into<String>) -> Self {
        Self::HttpStatus {
            provider: provider.to_string(),
            status,
            context: context.into(),
        }
    }

    /// Creates a `Network` error.
    #[must_use]
    pub fn network(provider: &str, message: impl Into<String>) -> Self {
        Self::Network {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error.
    #[must_use]
    pub fn timeout(provider: &str, budget: std::time::Duration) -> Self {
        Self::Timeout {
            provider: provider.to_string(),
            budget_secs: budget.as_secs(),
        }
    }

    /// Creates a `Parse` error.
    #[must_use]
    pub fn parse(provider: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Wraps a `reqwest` error, distinguishing timeouts from other
    /// transport failures.
    #[must_use]
    pub fn from_reqwest(provider: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(provider, crate::config::PROVIDER_CALL_TIMEOUT)
        } else {
            Self::network(provider, error.to_string())
        }
    }

    /// Returns true for failures that may succeed on retry.
    ///
    /// 429 and 5xx statuses are transient; 4xx statuses (bad query, auth)
    /// are not. Parse failures are never transient — the same body will
    /// fail the same way.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } => false,
        }
    }

    /// Returns the provider name this error belongs to.
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            Self::HttpStatus { provider, .. }
            | Self::Network { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Parse { provider, .. } => provider,
        }
    }
}
