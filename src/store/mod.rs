//! Persistence collaborator for candidate records, running counters, and
//! the audit trail.
//!
//! Writes here are awaited before a job checkpoint advances, so a crash
//! between checkpoints can never leave counters ahead of the stored
//! candidates. Counters use atomic in-SQL increments — two jobs for the same
//! project may complete in either order, and read-modify-write would lose
//! updates.

use sqlx::Row;
use thiserror::Error;
use tracing::instrument;

use crate::db::Database;
use crate::normalize::canonical_hash;
use crate::record::NormalizedRef;

/// Counter name for records entering the project's candidate pool.
pub const COUNTER_RECORDS_IDENTIFIED: &str = "records_identified";

/// Counter name for duplicates removed before screening.
pub const COUNTER_DUPLICATES_REMOVED: &str = "duplicates_removed";

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Candidate record could not be (de)serialized.
    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// SQLite-backed store for unique candidates, counters, and audit entries.
#[derive(Debug, Clone)]
pub struct CandidateStore {
    db: Database,
}

impl CandidateStore {
    /// Creates a store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upserts unique records for a project, keyed by canonical hash.
    ///
    /// Insert-or-ignore semantics: a record whose hash is already present
    /// for the project is left untouched. Returns the number of rows
    /// actually inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when serialization or the insert fails.
    #[instrument(skip(self, records), fields(project_id, record_count = records.len()))]
    pub async fn upsert_candidates(
        &self,
        project_id: &str,
        records: &[NormalizedRef],
    ) -> Result<usize> {
        let mut inserted = 0usize;

        for record in records {
            let hash = canonical_hash(record);
            let payload = serde_json::to_string(record)?;

            let result = sqlx::query(
                r"INSERT INTO candidates (project_id, canonical_hash, record)
                  VALUES (?, ?, ?)
                  ON CONFLICT (project_id, canonical_hash) DO NOTHING",
            )
            .bind(project_id)
            .bind(&hash)
            .bind(&payload)
            .execute(self.db.pool())
            .await?;

            inserted += usize::try_from(result.rows_affected()).unwrap_or(0);
        }

        Ok(inserted)
    }

    /// Atomically adds `delta` to a named project counter, creating it at
    /// zero first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn increment_counter(
        &self,
        project_id: &str,
        counter: &str,
        delta: i64,
    ) -> Result<()> {
        sqlx::query(
            r"INSERT INTO project_counters (project_id, counter, value)
              VALUES (?, ?, ?)
              ON CONFLICT (project_id, counter) DO UPDATE SET value = value + excluded.value",
        )
        .bind(project_id)
        .bind(counter)
        .bind(delta)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Reads a named counter; absent counters read as zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn counter_value(&self, project_id: &str, counter: &str) -> Result<i64> {
        let row = sqlx::query(
            r"SELECT value FROM project_counters WHERE project_id = ? AND counter = ?",
        )
        .bind(project_id)
        .bind(counter)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map_or(0, |r| r.get("value")))
    }

    /// Appends one audit entry. Append-only by construction: there is no
    /// update or delete path for this table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self, details), fields(action))]
    pub async fn append_audit(&self, action: &str, details: &serde_json::Value) -> Result<i64> {
        let result = sqlx::query(
            r"INSERT INTO audit_log (action, details) VALUES (?, ?) RETURNING id",
        )
        .bind(action)
        .bind(details.to_string())
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get("id"))
    }

    /// Counts stored candidates for a project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn candidate_count(&self, project_id: &str) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) AS n FROM candidates WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("n"))
    }

    /// Loads all stored candidates for a project in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query or record deserialization fails.
    #[instrument(skip(self))]
    pub async fn list_candidates(&self, project_id: &str) -> Result<Vec<NormalizedRef>> {
        let rows = sqlx::query(
            r"SELECT record FROM candidates WHERE project_id = ? ORDER BY id ASC",
        )
        .bind(project_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row.get("record");
            records.push(serde_json::from_str(&payload)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::RefSource;
    use serde_json::json;

    async fn store() -> CandidateStore {
        let db = Database::open_in_memory().await.unwrap();
        CandidateStore::new(db)
    }

    fn record(doi: &str, title: &str) -> NormalizedRef {
        let mut r = NormalizedRef::new(title, RefSource::Pubmed);
        r.doi = Some(doi.to_string());
        r
    }

    // ==================== Candidates ====================

    #[tokio::test]
    async fn test_upsert_inserts_new_records() {
        let store = store().await;
        let inserted = store
            .upsert_candidates("p1", &[record("10.1/a", "A"), record("10.1/b", "B")])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.candidate_count("p1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_ignores_existing_hash() {
        let store = store().await;
        store
            .upsert_candidates("p1", &[record("10.1/a", "A")])
            .await
            .unwrap();
        // Same DOI, different title: same canonical hash, ignored.
        let inserted = store
            .upsert_candidates("p1", &[record("10.1/a", "Different Rendering")])
            .await
            .unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(store.candidate_count("p1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_is_scoped_per_project() {
        let store = store().await;
        store
            .upsert_candidates("p1", &[record("10.1/a", "A")])
            .await
            .unwrap();
        let inserted = store
            .upsert_candidates("p2", &[record("10.1/a", "A")])
            .await
            .unwrap();
        assert_eq!(inserted, 1, "same hash in another project is a new row");
    }

    #[tokio::test]
    async fn test_list_candidates_roundtrips_records() {
        let store = store().await;
        let original = record("10.1/a", "A Title");
        store.upsert_candidates("p1", &[original.clone()]).await.unwrap();

        let loaded = store.list_candidates("p1").await.unwrap();
        assert_eq!(loaded, vec![original]);
    }

    // ==================== Counters ====================

    #[tokio::test]
    async fn test_counter_absent_reads_zero() {
        let store = store().await;
        assert_eq!(
            store
                .counter_value("p1", COUNTER_RECORDS_IDENTIFIED)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_counter_increments_accumulate() {
        let store = store().await;
        store
            .increment_counter("p1", COUNTER_RECORDS_IDENTIFIED, 5)
            .await
            .unwrap();
        store
            .increment_counter("p1", COUNTER_RECORDS_IDENTIFIED, 3)
            .await
            .unwrap();
        assert_eq!(
            store
                .counter_value("p1", COUNTER_RECORDS_IDENTIFIED)
                .await
                .unwrap(),
            8
        );
    }

    #[tokio::test]
    async fn test_counters_are_independent_per_name_and_project() {
        let store = store().await;
        store
            .increment_counter("p1", COUNTER_RECORDS_IDENTIFIED, 2)
            .await
            .unwrap();
        store
            .increment_counter("p1", COUNTER_DUPLICATES_REMOVED, 1)
            .await
            .unwrap();
        store
            .increment_counter("p2", COUNTER_RECORDS_IDENTIFIED, 7)
            .await
            .unwrap();

        assert_eq!(
            store
                .counter_value("p1", COUNTER_DUPLICATES_REMOVED)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .counter_value("p2", COUNTER_RECORDS_IDENTIFIED)
                .await
                .unwrap(),
            7
        );
    }

    // ==================== Audit ====================

    #[tokio::test]
    async fn test_append_audit_returns_monotonic_ids() {
        let store = store().await;
        let first = store
            .append_audit("search_completed", &json!({"imported": 3}))
            .await
            .unwrap();
        let second = store
            .append_audit("import_completed", &json!({"imported": 1, "duplicates": 2}))
            .await
            .unwrap();
        assert!(second > first);
    }
}
