//! Worker that claims ingestion jobs and runs them end-to-end.
//!
//! Checkpoint sequence for both pipelines, each a durable write before the
//! next stage starts: planning (10%) → provider fetch / parsing (40%) →
//! cache fill / dedup (70%) → persistence (90%) → completed (100%). A crash
//! between checkpoints leaves the job at the last recorded step; staleness
//! detection on top of that is the polling collaborator's concern.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{
    ImportSubmission, IngestReport, JobError, JobKind, JobRecord, JobStore, SearchSubmission,
};
use crate::cache::Cache;
use crate::config::{PARSE_WALL_CLOCK_BUDGET, PROVIDER_CACHE_TTL};
use crate::dedupe::{DedupeResult, dedupe, validate_dedupe_result};
use crate::error::IngestError;
use crate::extract::{BatchConfidence, assess_confidence};
use crate::import::{parse_upload, validate_upload};
use crate::provider::{ProviderError, RetryDecision, RetryPolicy, SearchProvider};
use crate::record::NormalizedRef;
use crate::store::{COUNTER_DUPLICATES_REMOVED, COUNTER_RECORDS_IDENTIFIED, CandidateStore};

/// Sleep between queue polls when no work is available.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Worker tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Time-to-live for cached provider records.
    pub cache_ttl: Duration,
    /// Wall-clock budget for one upload parse/extraction.
    pub parse_budget: Duration,
    /// Retry policy for transient provider failures.
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: PROVIDER_CACHE_TTL,
            parse_budget: PARSE_WALL_CLOCK_BUDGET,
            retry: RetryPolicy::default(),
        }
    }
}

/// Executes ingestion jobs claimed from the shared queue.
///
/// Dependencies are injected at construction: queue and store handles, the
/// cache, and the explicit provider list. This keeps per-test isolation
/// (fresh cache, fresh queue) trivial and provider selection a
/// configuration decision.
pub struct Worker {
    jobs: JobStore,
    candidates: CandidateStore,
    cache: Arc<dyn Cache>,
    providers: Vec<Arc<dyn SearchProvider>>,
    config: WorkerConfig,
}

impl Worker {
    /// Creates a worker with default tuning.
    #[must_use]
    pub fn new(
        jobs: JobStore,
        candidates: CandidateStore,
        cache: Arc<dyn Cache>,
        providers: Vec<Arc<dyn SearchProvider>>,
    ) -> Self {
        Self::with_config(jobs, candidates, cache, providers, WorkerConfig::default())
    }

    /// Creates a worker with explicit tuning.
    #[must_use]
    pub fn with_config(
        jobs: JobStore,
        candidates: CandidateStore,
        cache: Arc<dyn Cache>,
        providers: Vec<Arc<dyn SearchProvider>>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            candidates,
            cache,
            providers,
            config,
        }
    }

    /// Claims and executes one job. Returns whether a job was processed.
    ///
    /// This is the only place lower-level errors become job-level state:
    /// any [`IngestError`] out of a pipeline marks the job failed with a
    /// `kind: message` string sufficient to decide whether to resubmit.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] only for job-store failures (the queue itself
    /// being unreachable); pipeline failures are recorded on the job.
    pub async fn run_next(&self) -> Result<bool, JobError> {
        let Some(job) = self.jobs.claim_next().await? else {
            return Ok(false);
        };
        info!(job_id = job.id, kind = %job.kind(), "job claimed");

        let outcome = match job.kind() {
            JobKind::ProviderSearch => self.run_search(&job).await,
            JobKind::FileImport => self.run_import(&job).await,
        };

        match outcome {
            Ok(report) => {
                let payload = serde_json::to_string(&report)?;
                self.jobs.mark_completed(job.id, &payload).await?;
                info!(
                    job_id = job.id,
                    imported = report.imported,
                    duplicates = report.duplicates,
                    "job completed"
                );
            }
            Err(error) => {
                let message = format!("{}: {error}", error.kind());
                warn!(job_id = job.id, error = %message, "job failed");
                self.jobs.mark_failed(job.id, &message).await?;
            }
        }

        Ok(true)
    }

    /// Runs jobs until the queue is empty. Returns how many were processed.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] for job-store failures.
    pub async fn run_until_idle(&self) -> Result<usize, JobError> {
        let mut processed = 0;
        while self.run_next().await? {
            processed += 1;
        }
        Ok(processed)
    }

    // ── Provider search pipeline ──

    #[instrument(skip(self, job), fields(job_id = job.id))]
    async fn run_search(&self, job: &JobRecord) -> Result<IngestReport, IngestError> {
        let submission: SearchSubmission = parse_payload(&job.payload)?;
        self.checkpoint(job.id, "planning", 10).await?;

        if self.providers.is_empty() {
            return Err(IngestError::provider(
                "none",
                "no search providers configured",
            ));
        }

        let query = build_query(&submission);
        self.checkpoint(job.id, "provider_fetch", 40).await?;

        // ID-list phase, fanned out across providers. Each provider's
        // failure is isolated; the job aborts only when all of them fail.
        let limit = submission.limit;
        let searches = self.providers.iter().map(|provider| {
            let query = query.clone();
            async move {
                let ids = self
                    .search_with_retry(provider.as_ref(), &query, limit)
                    .await;
                (Arc::clone(provider), ids)
            }
        });
        let search_results = join_all(searches).await;

        self.checkpoint(job.id, "cache_fill", 70).await?;

        let mut all_records: Vec<NormalizedRef> = Vec::new();
        let mut provider_errors: Vec<String> = Vec::new();
        let mut any_success = false;

        for (provider, ids) in search_results {
            let outcome = match ids {
                Ok(ids) => self.records_via_cache(provider.as_ref(), &ids).await,
                Err(error) => Err(error),
            };
            match outcome {
                Ok(mut records) => {
                    any_success = true;
                    all_records.append(&mut records);
                }
                Err(error) => {
                    warn!(provider = provider.name(), error = %error, "provider failed");
                    provider_errors.push(error.to_string());
                }
            }
        }

        if !any_success {
            return Err(IngestError::provider(
                "all",
                format!("every provider failed: {}", provider_errors.join("; ")),
            ));
        }

        let confidence = assess_confidence(&all_records);
        let result = dedupe(all_records);
        validate_dedupe_result(&result)?;

        self.checkpoint(job.id, "persisting", 90).await?;
        let imported = self.persist(&submission.project_id, &result).await?;
        self.audit("search_completed", job, &result, imported, &provider_errors)
            .await?;

        Ok(build_report(
            imported,
            &result,
            confidence,
            provider_errors,
            Vec::new(),
        ))
    }

    // ── File import pipeline ──

    #[instrument(skip(self, job), fields(job_id = job.id))]
    async fn run_import(&self, job: &JobRecord) -> Result<IngestReport, IngestError> {
        let submission: ImportSubmission = parse_payload(&job.payload)?;
        self.checkpoint(job.id, "planning", 10).await?;

        // Revalidated here: the job row may outlive a config change.
        let format = validate_upload(&submission.upload)?;

        self.checkpoint(job.id, "parsing", 40).await?;
        let upload = submission.upload.clone();
        let parse_task =
            tokio::task::spawn_blocking(move || parse_upload(format, &upload));
        let parse = tokio::time::timeout(self.config.parse_budget, parse_task)
            .await
            .map_err(|_| {
                IngestError::timeout(format!("{format:?} extraction"), self.config.parse_budget)
            })?
            .map_err(|join_error| {
                IngestError::invariant(format!("extraction task aborted: {join_error}"))
            })?;

        let confidence = assess_confidence(&parse.records);
        self.checkpoint(job.id, "deduplicating", 70).await?;
        let result = dedupe(parse.records);
        validate_dedupe_result(&result)?;

        self.checkpoint(job.id, "persisting", 90).await?;
        let imported = self.persist(&submission.project_id, &result).await?;
        self.audit("import_completed", job, &result, imported, &[]).await?;

        Ok(build_report(
            imported,
            &result,
            confidence,
            Vec::new(),
            parse.skipped,
        ))
    }

    // ── Shared stages ──

    /// Per-item cache check-and-fill: cached records are reused, missing
    /// ones are detail-fetched and written through. A cache miss (or a
    /// corrupt cached value) is never an error, only a cost.
    async fn records_via_cache(
        &self,
        provider: &dyn SearchProvider,
        ids: &[String],
    ) -> Result<Vec<NormalizedRef>, ProviderError> {
        let keys: Vec<String> = ids
            .iter()
            .map(|id| cache_key(provider.name(), id))
            .collect();
        let cached = self.cache.get_many(&keys).await;

        let mut records = Vec::with_capacity(ids.len());
        let mut missing: Vec<String> = Vec::new();
        for (id, hit) in ids.iter().zip(cached) {
            match hit.and_then(|raw| serde_json::from_str::<NormalizedRef>(&raw).ok()) {
                Some(record) => records.push(record),
                None => missing.push(id.clone()),
            }
        }
        debug!(
            provider = provider.name(),
            hits = records.len(),
            misses = missing.len(),
            "cache check complete"
        );

        if !missing.is_empty() {
            let fetched = self.details_with_retry(provider, &missing).await?;

            let entries: Vec<(String, String)> = fetched
                .iter()
                .filter_map(|record| {
                    let id = record.pmid.as_deref()?;
                    let payload = serde_json::to_string(record).ok()?;
                    Some((cache_key(provider.name(), id), payload))
                })
                .collect();
            self.cache.set_many(entries, self.config.cache_ttl).await;

            records.extend(fetched);
        }

        Ok(records)
    }

    async fn search_with_retry(
        &self,
        provider: &dyn SearchProvider,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, ProviderError> {
        let mut attempt = 1;
        loop {
            match provider.search(query, limit).await {
                Ok(ids) => return Ok(ids),
                Err(error) => {
                    attempt = self.next_attempt(provider.name(), &error, attempt).await?;
                }
            }
        }
    }

    async fn details_with_retry(
        &self,
        provider: &dyn SearchProvider,
        ids: &[String],
    ) -> Result<Vec<NormalizedRef>, ProviderError> {
        let mut attempt = 1;
        loop {
            match provider.fetch_details(ids).await {
                Ok(records) => return Ok(records),
                Err(error) => {
                    attempt = self.next_attempt(provider.name(), &error, attempt).await?;
                }
            }
        }
    }

    /// Applies the retry policy to a failed attempt: sleeps and returns the
    /// next attempt number, or surfaces the error when retries are done.
    async fn next_attempt(
        &self,
        provider: &str,
        error: &ProviderError,
        attempt: u32,
    ) -> Result<u32, ProviderError> {
        match self.config.retry.should_retry(error.is_transient(), attempt) {
            RetryDecision::Retry { delay, attempt: next } => {
                debug!(provider, attempt, delay_ms = delay.as_millis(), error = %error, "retrying provider call");
                tokio::time::sleep(delay).await;
                Ok(next)
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(provider, attempt, reason = %reason, "not retrying");
                Err(error.clone())
            }
        }
    }

    async fn persist(
        &self,
        project_id: &str,
        result: &DedupeResult,
    ) -> Result<usize, IngestError> {
        let inserted = self
            .candidates
            .upsert_candidates(project_id, &result.unique)
            .await
            .map_err(persistence_failure)?;

        self.candidates
            .increment_counter(project_id, COUNTER_RECORDS_IDENTIFIED, to_i64(result.stats.total))
            .await
            .map_err(persistence_failure)?;
        self.candidates
            .increment_counter(
                project_id,
                COUNTER_DUPLICATES_REMOVED,
                to_i64(result.stats.duplicates),
            )
            .await
            .map_err(persistence_failure)?;

        Ok(inserted)
    }

    async fn audit(
        &self,
        action: &str,
        job: &JobRecord,
        result: &DedupeResult,
        imported: usize,
        provider_errors: &[String],
    ) -> Result<(), IngestError> {
        let details = serde_json::json!({
            "job_id": job.id,
            "project_id": job.project_id,
            "imported": imported,
            "total": result.stats.total,
            "duplicates": result.stats.duplicates,
            "provider_errors": provider_errors,
        });
        self.candidates
            .append_audit(action, &details)
            .await
            .map_err(persistence_failure)?;
        Ok(())
    }

    /// Durable progress write. Checkpoints within one job are strictly
    /// sequential; there is no cross-job ordering.
    async fn checkpoint(&self, job_id: i64, step: &str, pct: i64) -> Result<(), IngestError> {
        self.jobs
            .update_progress(job_id, step, pct)
            .await
            .map_err(|error| IngestError::invariant(format!("checkpoint write failed: {error}")))
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("providers", &self.providers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Spawns `count` worker tasks that poll the shared queue until `shutdown`
/// flips to true. Concurrency across jobs is bounded by `count` — tune it to
/// the provider rate limit, not the CPU count.
#[must_use]
pub fn spawn_pool(
    worker: Arc<Worker>,
    count: usize,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|index| {
            let worker = Arc::clone(&worker);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                debug!(worker_index = index, "worker started");
                loop {
                    if *shutdown.borrow() {
                        break;
                    }
                    match worker.run_next().await {
                        Ok(true) => {}
                        Ok(false) => {
                            tokio::select! {
                                () = tokio::time::sleep(IDLE_POLL) => {}
                                _ = shutdown.changed() => {}
                            }
                        }
                        Err(error) => {
                            warn!(worker_index = index, error = %error, "worker iteration failed");
                            tokio::time::sleep(IDLE_POLL).await;
                        }
                    }
                }
                debug!(worker_index = index, "worker stopped");
            })
        })
        .collect()
}

fn parse_payload<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T, IngestError> {
    serde_json::from_str(payload).map_err(|error| {
        IngestError::invariant(format!("stored job payload is unreadable: {error}"))
    })
}

fn build_query(submission: &SearchSubmission) -> String {
    if submission.filters.is_empty() {
        return submission.query.clone();
    }
    let mut parts = vec![submission.query.clone()];
    parts.extend(submission.filters.iter().cloned());
    parts.join(" AND ")
}

fn build_report(
    imported: usize,
    result: &DedupeResult,
    confidence: BatchConfidence,
    provider_errors: Vec<String>,
    skipped: Vec<String>,
) -> IngestReport {
    let warning = (confidence == BatchConfidence::Low).then(|| {
        "Extraction confidence is low; prefer a structured export (RIS/BibTeX) for reliable import"
            .to_string()
    });

    IngestReport {
        imported,
        duplicates: result.stats.duplicates,
        confidence: confidence.to_string(),
        warning,
        provider_errors,
        skipped,
    }
}

fn cache_key(provider: &str, id: &str) -> String {
    format!("{provider}:{id}")
}

fn persistence_failure(error: crate::store::StoreError) -> IngestError {
    IngestError::invariant(format!("persistence write failed: {error}"))
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
