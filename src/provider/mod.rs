//! Literature-search provider collaborators.
//!
//! Providers are capability objects behind the [`SearchProvider`] trait:
//! an ID-list search phase followed by a batched detail-fetch phase. The
//! ingestion worker is constructed with an explicit list of providers —
//! selection happens at construction time via configuration, never by
//! runtime type inspection.
//!
//! # Architecture
//!
//! - [`SearchProvider`] - async trait individual providers implement
//! - [`PubmedProvider`] - NCBI E-utilities implementation
//! - [`HostRateLimiter`] - per-host politeness delays with `Retry-After`
//! - [`RetryPolicy`] - bounded exponential backoff for transient failures
//!
//! # Object Safety
//!
//! The trait uses `async_trait` to support dynamic dispatch via
//! `Arc<dyn SearchProvider>`. Rust 2024 native async traits are not
//! object-safe, so `async_trait` is required for the provider-list pattern.

mod error;
mod pubmed;
mod rate_limiter;
mod retry;

pub use error::ProviderError;
pub use pubmed::{PubmedProvider, default_provider_limiter};
pub use rate_limiter::{HostRateLimiter, parse_retry_after};
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryDecision, RetryPolicy};

use async_trait::async_trait;
use reqwest::Client;

use crate::config::PROVIDER_CALL_TIMEOUT;
use crate::record::NormalizedRef;

/// Contract for one external literature-search source.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns the provider's name (e.g., "pubmed").
    fn name(&self) -> &str;

    /// Runs the ID-list phase: a query returning up to `limit` natural ids.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, ProviderError>;

    /// Runs the detail phase for the given ids, chunked internally at the
    /// provider's batch limit. Returns one record per resolvable id.
    async fn fetch_details(&self, ids: &[String]) -> Result<Vec<NormalizedRef>, ProviderError>;
}

/// Builds the shared HTTP client for a provider: per-call timeout, gzip,
/// identifying user agent.
///
/// # Errors
///
/// Returns [`ProviderError::Network`] when client construction fails.
pub fn build_provider_http_client(provider: &str) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(PROVIDER_CALL_TIMEOUT)
        .user_agent(standard_user_agent(provider))
        .build()
        .map_err(|error| ProviderError::network(provider, error.to_string()))
}

/// Identifying user agent shared across provider clients.
#[must_use]
pub fn standard_user_agent(provider: &str) -> String {
    format!(
        "refharvest/{} (+{provider} adapter)",
        env!("CARGO_PKG_VERSION")
    )
}
