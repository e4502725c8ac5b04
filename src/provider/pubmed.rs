//! `PubMed` search provider over the NCBI E-utilities JSON API.
//!
//! Two-phase protocol: `esearch.fcgi` returns the matching PMID list,
//! `esummary.fcgi` returns per-PMID summary records, fetched in fixed-size
//! id batches to respect upstream limits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::rate_limiter::{HostRateLimiter, parse_retry_after};
use super::{ProviderError, SearchProvider, build_provider_http_client};
use crate::config::{PROVIDER_DETAIL_BATCH_SIZE, PROVIDER_MIN_DELAY};
use crate::record::{NormalizedRef, RefSource};

const DEFAULT_EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// NCBI E-utilities search provider.
pub struct PubmedProvider {
    client: Client,
    base_url: String,
    host: String,
    limiter: Arc<HostRateLimiter>,
}

impl PubmedProvider {
    /// Creates a provider against the public E-utilities endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when HTTP client construction fails.
    pub fn new(limiter: Arc<HostRateLimiter>) -> Result<Self, ProviderError> {
        Self::with_base_url(limiter, DEFAULT_EUTILS_BASE_URL)
    }

    /// Creates a provider with a custom endpoint for tests.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when HTTP client construction fails.
    pub fn with_base_url(
        limiter: Arc<HostRateLimiter>,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.into();
        let host = Url::parse(&base_url)
            .ok()
            .and_then(|u| u.host_str().map(ToString::to_string))
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            client: build_provider_http_client("pubmed")?,
            base_url,
            host,
            limiter,
        })
    }

    /// Shared request path: politeness delay, GET, status handling.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        context: &str,
    ) -> Result<T, ProviderError> {
        self.limiter.acquire(&self.host).await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| ProviderError::from_reqwest("pubmed", &error))?;

        let status = response.status();
        if status.as_u16() == 429 {
            if let Some(delay) = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
            {
                warn!(delay_secs = delay.as_secs(), "PubMed requested a pause");
                self.limiter.record_retry_after(&self.host, delay).await;
            }
            return Err(ProviderError::http_status("pubmed", 429, context));
        }
        if !status.is_success() {
            return Err(ProviderError::http_status("pubmed", status.as_u16(), context));
        }

        response
            .json::<T>()
            .await
            .map_err(|error| ProviderError::parse("pubmed", error.to_string()))
    }
}

impl std::fmt::Debug for PubmedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubmedProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SearchProvider for PubmedProvider {
    fn name(&self) -> &'static str {
        "pubmed"
    }

    #[tracing::instrument(skip(self), fields(provider = "pubmed"))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, ProviderError> {
        let url = format!(
            "{}/esearch.fcgi?db=pubmed&retmode=json&retmax={limit}&term={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(query)
        );

        let parsed: EsearchResponse = self.get_json(&url, "esearch").await?;
        debug!(ids = parsed.esearchresult.idlist.len(), "esearch complete");
        Ok(parsed.esearchresult.idlist)
    }

    #[tracing::instrument(skip(self, ids), fields(provider = "pubmed", id_count = ids.len()))]
    async fn fetch_details(&self, ids: &[String]) -> Result<Vec<NormalizedRef>, ProviderError> {
        let mut records = Vec::with_capacity(ids.len());

        for (batch_index, chunk) in ids.chunks(PROVIDER_DETAIL_BATCH_SIZE).enumerate() {
            let url = format!(
                "{}/esummary.fcgi?db=pubmed&retmode=json&id={}",
                self.base_url.trim_end_matches('/'),
                chunk.join(",")
            );

            let parsed: EsummaryResponse = self
                .get_json(&url, &format!("esummary batch {batch_index}"))
                .await?;

            for uid in &parsed.result.uids {
                let Some(value) = parsed.result.records.get(uid) else {
                    continue;
                };
                match serde_json::from_value::<PubmedSummary>(value.clone()) {
                    Ok(summary) => records.push(summary.into_record(uid)),
                    Err(error) => {
                        // One malformed summary is noise, not a batch failure.
                        warn!(uid, error = %error, "skipping unparseable esummary record");
                    }
                }
            }
        }

        debug!(records = records.len(), "esummary complete");
        Ok(records)
    }
}

/// Builds the default provider limiter tuned to E-utilities limits.
#[must_use]
pub fn default_provider_limiter() -> Arc<HostRateLimiter> {
    Arc::new(HostRateLimiter::new(PROVIDER_MIN_DELAY))
}

// ── Wire types ──
//
// Known fields are modeled explicitly; everything else lands in the opaque
// `extra` map so schema drift upstream never breaks deserialization.

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(flatten)]
    #[allow(dead_code)]
    extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EsummaryResponse {
    result: EsummaryResult,
}

#[derive(Debug, Deserialize)]
struct EsummaryResult {
    #[serde(default)]
    uids: Vec<String>,
    #[serde(flatten)]
    records: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PubmedSummary {
    #[serde(default)]
    title: String,
    #[serde(default)]
    fulljournalname: String,
    /// Journal abbreviation; fallback venue when the full name is absent.
    #[serde(default)]
    source: String,
    #[serde(default)]
    pubdate: String,
    #[serde(default)]
    authors: Vec<PubmedAuthor>,
    #[serde(default)]
    articleids: Vec<PubmedArticleId>,
    #[serde(flatten)]
    #[allow(dead_code)]
    extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PubmedAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PubmedArticleId {
    #[serde(default)]
    idtype: String,
    #[serde(default)]
    value: String,
}

impl PubmedSummary {
    fn into_record(self, uid: &str) -> NormalizedRef {
        let mut record = NormalizedRef::new(self.title, RefSource::Pubmed);
        record.pmid = Some(uid.to_string());
        record.journal = if self.fulljournalname.is_empty() {
            self.source
        } else {
            self.fulljournalname
        };
        record.year = self
            .pubdate
            .get(..4)
            .and_then(|prefix| prefix.parse::<u16>().ok());
        record.authors = self
            .authors
            .into_iter()
            .map(|a| a.name)
            .filter(|name| !name.is_empty())
            .collect();

        for article_id in self.articleids {
            match article_id.idtype.as_str() {
                "doi" if !article_id.value.is_empty() => record.doi = Some(article_id.value),
                "pmc" | "pmcid" if !article_id.value.is_empty() => {
                    record.pmcid = Some(article_id.value);
                }
                _ => {}
            }
        }

        record.partial = !record.has_core_fields();
        record
    }
}
