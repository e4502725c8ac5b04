//! Asynchronous ingestion jobs: one provider search or one file import.
//!
//! A job's database row is the single source of truth for its progress —
//! other subsystems poll it and never receive callbacks. Transitions are
//! driven exclusively by the worker that claimed the job; claiming is a
//! single atomic `pending → running` update, which is what guarantees no
//! job is ever executed by two workers at once.
//!
//! # Lifecycle
//!
//! `pending → running → {completed | failed}`; terminal states are
//! absorbing except that a failed job may be explicitly resubmitted, which
//! resets it to pending with cleared error and zeroed progress.

mod store;
mod worker;

pub use store::{JobError, JobStore};
pub use worker::{Worker, WorkerConfig, spawn_pool};

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::import::UploadedText;

/// Lifecycle state of an ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be claimed by a worker.
    Pending,
    /// Claimed; being processed end-to-end by exactly one worker.
    Running,
    /// Finished successfully (possibly with per-provider errors recorded).
    Completed,
    /// Finished unsuccessfully; may be resubmitted.
    Failed,
}

impl JobState {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns true for the absorbing states.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid job state: {s}")),
        }
    }
}

/// What kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Query the configured search providers.
    ProviderSearch,
    /// Parse one uploaded file into candidates.
    FileImport,
}

impl JobKind {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderSearch => "provider_search",
            Self::FileImport => "file_import",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provider_search" => Ok(Self::ProviderSearch),
            "file_import" => Ok(Self::FileImport),
            _ => Err(format!("invalid job kind: {s}")),
        }
    }
}

/// Submitted input for a provider search job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSubmission {
    /// Project the results belong to.
    pub project_id: String,
    /// Provider query string.
    pub query: String,
    /// Maximum results requested (capped by configuration).
    pub limit: usize,
    /// Optional filter clauses AND-ed onto the query.
    #[serde(default)]
    pub filters: Vec<String>,
}

/// Submitted input for a file import job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSubmission {
    /// Project the results belong to.
    pub project_id: String,
    /// The uploaded file after host-side text extraction.
    pub upload: UploadedText,
}

/// One ingestion job row.
#[derive(Debug, Clone, FromRow)]
pub struct JobRecord {
    /// Unique identifier.
    pub id: i64,
    /// Owning project.
    pub project_id: String,
    /// Job kind (stored as text, parsed via `kind()`).
    #[sqlx(rename = "kind")]
    pub kind_str: String,
    /// Submitted input payload, JSON.
    pub payload: String,
    /// Current lifecycle state (stored as text, parsed via `state()`).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// Last durable progress checkpoint name.
    pub progress_step: String,
    /// Last durable progress percentage (0-100).
    pub progress_pct: i64,
    /// Result payload once completed, JSON.
    pub result: Option<String>,
    /// Failure message once failed.
    pub error: Option<String>,
    /// When the job was created.
    pub created_at: String,
    /// When the job was last updated.
    pub updated_at: String,
}

impl JobRecord {
    /// Returns the parsed lifecycle state.
    ///
    /// Falls back to `Pending` if the stored state string is invalid.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.status_str.parse().unwrap_or(JobState::Pending)
    }

    /// Returns the parsed job kind.
    ///
    /// Falls back to `ProviderSearch` if the stored kind string is invalid.
    #[must_use]
    pub fn kind(&self) -> JobKind {
        self.kind_str.parse().unwrap_or(JobKind::ProviderSearch)
    }

    /// Returns the caller-facing poll snapshot.
    #[must_use]
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            state: self.state(),
            progress_step: self.progress_step.clone(),
            progress_pct: self.progress_pct.clamp(0, 100),
            result: self
                .result
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            error: self.error.clone(),
        }
    }
}

impl fmt::Display for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Job {{ id: {}, kind: {}, state: {}, progress: {}% }}",
            self.id,
            self.kind(),
            self.state(),
            self.progress_pct
        )
    }
}

/// Point-in-time view returned to pollers. Never a lock — just a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Lifecycle state at read time.
    pub state: JobState,
    /// Last recorded checkpoint name.
    pub progress_step: String,
    /// Last recorded progress percentage.
    pub progress_pct: i64,
    /// Completed-job result payload.
    pub result: Option<serde_json::Value>,
    /// Failed-job error message.
    pub error: Option<String>,
}

/// Result payload of a completed ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Newly stored unique candidates.
    pub imported: usize,
    /// Duplicates absorbed by deduplication.
    pub duplicates: usize,
    /// Batch extraction confidence (high/medium/low).
    pub confidence: String,
    /// Present when confidence is low: recommendation to prefer a
    /// structured format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Per-provider failure messages for partially successful searches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_errors: Vec<String>,
    /// Entries the format parser reported as unparseable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn job(status: &str, kind: &str) -> JobRecord {
        JobRecord {
            id: 1,
            project_id: "p1".to_string(),
            kind_str: kind.to_string(),
            payload: "{}".to_string(),
            status_str: status.to_string(),
            progress_step: "queued".to_string(),
            progress_pct: 0,
            result: None,
            error: None,
            created_at: "2026-01-01".to_string(),
            updated_at: "2026-01-01".to_string(),
        }
    }

    // ==================== JobState Tests ====================

    #[test]
    fn test_job_state_roundtrip() {
        for state in [
            JobState::Pending,
            JobState::Running,
            JobState::Completed,
            JobState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
    }

    #[test]
    fn test_job_state_terminality() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn test_job_state_from_str_invalid() {
        assert!("paused".parse::<JobState>().is_err());
    }

    // ==================== JobRecord Tests ====================

    #[test]
    fn test_job_record_state_fallback_on_invalid() {
        assert_eq!(job("garbage", "provider_search").state(), JobState::Pending);
    }

    #[test]
    fn test_job_record_kind_parses() {
        assert_eq!(job("pending", "file_import").kind(), JobKind::FileImport);
    }

    #[test]
    fn test_job_snapshot_clamps_progress() {
        let mut j = job("running", "provider_search");
        j.progress_pct = 250;
        assert_eq!(j.snapshot().progress_pct, 100);
    }

    #[test]
    fn test_job_snapshot_parses_result_payload() {
        let mut j = job("completed", "file_import");
        j.result = Some(r#"{"imported": 3, "duplicates": 1, "confidence": "high"}"#.to_string());
        let snapshot = j.snapshot();
        assert_eq!(snapshot.result.unwrap()["imported"], 3);
    }

    #[test]
    fn test_ingest_report_omits_empty_optional_fields() {
        let report = IngestReport {
            imported: 2,
            duplicates: 0,
            confidence: "high".to_string(),
            warning: None,
            provider_errors: Vec::new(),
            skipped: Vec::new(),
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("warning"));
        assert!(!json.contains("provider_errors"));
    }
}
