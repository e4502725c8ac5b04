//! SQLite-backed job queue and status store.

use sqlx::Row;
use thiserror::Error;
use tracing::instrument;

use super::{ImportSubmission, JobKind, JobRecord, JobState, SearchSubmission};
use crate::config::MAX_SEARCH_LIMIT;
use crate::db::Database;
use crate::error::IngestError;
use crate::import::validate_upload;

/// Job store operation errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Payload could not be (de)serialized.
    #[error("job payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No job exists with the given id.
    #[error("job {0} not found")]
    NotFound(i64),

    /// Resubmission is only valid for failed jobs.
    #[error("job {0} is not in the failed state and cannot be resubmitted")]
    NotResubmittable(i64),

    /// Submission was rejected before enqueueing.
    #[error(transparent)]
    Rejected(#[from] IngestError),
}

/// Result type for job store operations.
pub type Result<T> = std::result::Result<T, JobError>;

/// Queue and status store for ingestion jobs.
///
/// Enqueueing writes only to the local database — it never blocks on
/// external I/O. Claiming uses one atomic `UPDATE ... RETURNING`, which is
/// the single-delivery-in-flight guarantee for the worker pool.
#[derive(Debug, Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    /// Creates a job store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Enqueues a provider search job and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Rejected`] when the requested limit exceeds the
    /// configured cap (malformed input is refused at submission, never
    /// retried), or [`JobError::Database`] if the insert fails.
    #[instrument(skip(self, submission), fields(project_id = %submission.project_id))]
    pub async fn submit_search(&self, submission: &SearchSubmission) -> Result<i64> {
        if submission.limit > MAX_SEARCH_LIMIT {
            return Err(JobError::Rejected(IngestError::validation(
                format!(
                    "requested limit {} exceeds the maximum of {MAX_SEARCH_LIMIT}",
                    submission.limit
                ),
                format!("Request at most {MAX_SEARCH_LIMIT} results per search"),
            )));
        }
        if submission.query.trim().is_empty() {
            return Err(JobError::Rejected(IngestError::validation(
                "search query is empty",
                "Provide a non-empty query string",
            )));
        }

        self.enqueue(
            &submission.project_id,
            JobKind::ProviderSearch,
            &serde_json::to_string(submission)?,
        )
        .await
    }

    /// Enqueues a file import job and returns its id.
    ///
    /// The upload is validated (extension, size caps) before enqueueing so
    /// malformed submissions are surfaced immediately.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Rejected`] for unsupported extensions or
    /// oversized payloads, or [`JobError::Database`] if the insert fails.
    #[instrument(skip(self, submission), fields(project_id = %submission.project_id, filename = %submission.upload.filename))]
    pub async fn submit_import(&self, submission: &ImportSubmission) -> Result<i64> {
        validate_upload(&submission.upload)?;

        self.enqueue(
            &submission.project_id,
            JobKind::FileImport,
            &serde_json::to_string(submission)?,
        )
        .await
    }

    async fn enqueue(&self, project_id: &str, kind: JobKind, payload: &str) -> Result<i64> {
        let result = sqlx::query(
            r"INSERT INTO ingestion_jobs (project_id, kind, payload, status, progress_step, progress_pct)
              VALUES (?, ?, ?, ?, 'queued', 0)
              RETURNING id",
        )
        .bind(project_id)
        .bind(kind.as_str())
        .bind(payload)
        .bind(JobState::Pending.as_str())
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get("id"))
    }

    /// Atomically claims the oldest pending job, transitioning it to
    /// running. Returns `None` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn claim_next(&self) -> Result<Option<JobRecord>> {
        // Atomic UPDATE...RETURNING: no race between select and update, and
        // no job can be claimed twice.
        let job = sqlx::query_as::<_, JobRecord>(
            r"UPDATE ingestion_jobs
              SET status = ?, progress_step = 'claimed', updated_at = datetime('now')
              WHERE id = (
                  SELECT id FROM ingestion_jobs
                  WHERE status = ?
                  ORDER BY created_at ASC, id ASC
                  LIMIT 1
              )
              RETURNING *",
        )
        .bind(JobState::Running.as_str())
        .bind(JobState::Pending.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(job)
    }

    /// Records a durable progress checkpoint for a running job.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] if no job exists with the given id,
    /// or [`JobError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn update_progress(&self, id: i64, step: &str, pct: i64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE ingestion_jobs
              SET progress_step = ?, progress_pct = ?, updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(step)
        .bind(pct.clamp(0, 100))
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Transitions a job to completed with its result payload and the
    /// final checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] if no job exists with the given id,
    /// or [`JobError::Database`] if the update fails.
    #[instrument(skip(self, result_json))]
    pub async fn mark_completed(&self, id: i64, result_json: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE ingestion_jobs
              SET status = ?, result = ?, progress_step = 'completed', progress_pct = 100,
                  updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(JobState::Completed.as_str())
        .bind(result_json)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Transitions a job to failed with a caller-facing message.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] if no job exists with the given id,
    /// or [`JobError::Database`] if the update fails.
    #[instrument(skip(self), fields(error = %error))]
    pub async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE ingestion_jobs
              SET status = ?, error = ?, updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(JobState::Failed.as_str())
        .bind(error)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Resets a failed job to pending with cleared error and zeroed
    /// progress.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] for unknown ids,
    /// [`JobError::NotResubmittable`] when the job is not failed, or
    /// [`JobError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn resubmit(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE ingestion_jobs
              SET status = ?, error = NULL, result = NULL,
                  progress_step = 'queued', progress_pct = 0,
                  updated_at = datetime('now')
              WHERE id = ? AND status = ?",
        )
        .bind(JobState::Pending.as_str())
        .bind(id)
        .bind(JobState::Failed.as_str())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.get(id).await? {
            Some(_) => Err(JobError::NotResubmittable(id)),
            None => Err(JobError::NotFound(id)),
        }
    }

    /// Reads one job row. Always a snapshot, never a lock.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Option<JobRecord>> {
        let job = sqlx::query_as::<_, JobRecord>(r"SELECT * FROM ingestion_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(job)
    }

    /// Counts jobs in a state.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_by_state(&self, state: JobState) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) AS n FROM ingestion_jobs WHERE status = ?")
            .bind(state.as_str())
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("n"))
    }
}

/// Returns `Ok(())` if at least one row was affected; otherwise [`JobError::NotFound`].
fn check_affected(id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(JobError::NotFound(id))
    } else {
        Ok(())
    }
}
