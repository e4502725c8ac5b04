//! Batch deduplication of bibliographic records.
//!
//! Two-phase grouping: identifiers first (two records can share a DOI while
//! carrying divergent titles that would never hash to the same bucket), then
//! canonical-hash bucketing of the survivors to catch records with no shared
//! identifier but matching normalized title+year. Within every group the
//! richest member is kept as canonical; equal-richness ties keep the
//! first-encountered record, and callers rely on that ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IngestError;
use crate::normalize::{canonical_hash, is_exact_duplicate, normalize_title, richness_score};
use crate::record::NormalizedRef;

/// Source of process-unique synthetic keys for records with no DOI, no PMID,
/// and no title. Such records must never merge with anything.
static SYNTHETIC_KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A cluster of records judged to represent one publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeGroup {
    /// The richest member, kept as the group's representative.
    pub canonical: NormalizedRef,
    /// The remaining members; never contains the canonical.
    pub duplicates: Vec<NormalizedRef>,
}

/// Counts describing one dedup invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupeStats {
    /// Number of input records.
    pub total: usize,
    /// Number of unique records kept.
    pub unique: usize,
    /// Number of records absorbed as duplicates.
    pub duplicates: usize,
    /// Number of groups that absorbed at least one duplicate.
    pub duplicate_groups: usize,
}

/// The full outcome of one dedup invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeResult {
    /// One canonical record per group, in first-encounter order.
    pub unique: Vec<NormalizedRef>,
    /// All groups, one per unique record; singleton groups have no
    /// duplicates.
    pub groups: Vec<DedupeGroup>,
    /// Aggregate counts.
    pub stats: DedupeStats,
}

impl DedupeResult {
    /// Returns a zero-valued result for empty input.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            unique: Vec::new(),
            groups: Vec::new(),
            stats: DedupeStats {
                total: 0,
                unique: 0,
                duplicates: 0,
                duplicate_groups: 0,
            },
        }
    }
}

/// Deduplicates a batch of records.
///
/// Deterministic given identical input order. Phase 1 walks records in input
/// order and greedily absorbs every later record sharing a DOI or PMID
/// (O(n²) pairwise scan — batch sizes are bounded by provider page limits,
/// typically ≤1000). Phase 2 re-keys the phase-1 canonicals by canonical
/// hash. Duplicates absorbed in phase 1 stay attached to their original
/// canonical and follow it if the hash pass merges that canonical into a
/// richer group, so no record is double-reported.
///
/// Empty input returns a zero-valued result, never an error.
#[tracing::instrument(skip(records), fields(record_count = records.len()))]
#[must_use]
pub fn dedupe(records: Vec<NormalizedRef>) -> DedupeResult {
    if records.is_empty() {
        return DedupeResult::empty();
    }

    let total = records.len();

    // Phase 1: identifier-pass grouping in input order.
    let mut id_groups: Vec<Vec<NormalizedRef>> = Vec::new();
    let mut remaining: Vec<Option<NormalizedRef>> = records.into_iter().map(Some).collect();

    for i in 0..remaining.len() {
        let Some(anchor) = remaining[i].take() else {
            continue;
        };

        let mut group = vec![anchor];
        for slot in remaining.iter_mut().skip(i + 1) {
            let absorb = slot
                .as_ref()
                .is_some_and(|candidate| is_exact_duplicate(&group[0], candidate));
            if absorb && let Some(candidate) = slot.take() {
                group.push(candidate);
            }
        }
        id_groups.push(group);
    }

    // Phase 2: per-group canonical selection, then hash-pass bucketing of
    // the canonicals. Bucket order follows first encounter.
    let mut bucket_index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<DedupeGroup> = Vec::new();

    for group in id_groups {
        let (canonical, mut duplicates) = split_canonical(group);
        let key = bucket_key(&canonical);

        match bucket_index.get(&key) {
            Some(&idx) => {
                let existing = &mut merged[idx];
                if richness_score(&canonical) > richness_score(&existing.canonical) {
                    let demoted = std::mem::replace(&mut existing.canonical, canonical);
                    existing.duplicates.push(demoted);
                } else {
                    existing.duplicates.push(canonical);
                }
                existing.duplicates.append(&mut duplicates);
            }
            None => {
                bucket_index.insert(key, merged.len());
                merged.push(DedupeGroup {
                    canonical,
                    duplicates,
                });
            }
        }
    }

    let unique: Vec<NormalizedRef> = merged.iter().map(|g| g.canonical.clone()).collect();
    let duplicates = total - unique.len();
    let duplicate_groups = merged.iter().filter(|g| !g.duplicates.is_empty()).count();

    debug!(
        total,
        unique = unique.len(),
        duplicates,
        duplicate_groups,
        "Dedup pass complete"
    );

    DedupeResult {
        stats: DedupeStats {
            total,
            unique: unique.len(),
            duplicates,
            duplicate_groups,
        },
        unique,
        groups: merged,
    }
}

/// Validates the internal consistency of a dedup result.
///
/// Any violation indicates a dedup-engine bug, not caller misuse, and is
/// reported as [`IngestError::InvariantViolation`].
///
/// # Errors
///
/// Returns `InvariantViolation` when the stats don't reconcile, the group
/// count diverges from the unique count, or two unique records share a
/// canonical hash.
pub fn validate_dedupe_result(result: &DedupeResult) -> Result<(), IngestError> {
    let stats = result.stats;
    if stats.total != stats.unique + stats.duplicates {
        return Err(IngestError::invariant(format!(
            "dedupe stats mismatch: total {} != unique {} + duplicates {}",
            stats.total, stats.unique, stats.duplicates
        )));
    }

    if stats.unique != result.unique.len() || result.groups.len() != result.unique.len() {
        return Err(IngestError::invariant(format!(
            "dedupe group/unique count mismatch: stats.unique {}, unique {}, groups {}",
            stats.unique,
            result.unique.len(),
            result.groups.len()
        )));
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    for (idx, record) in result.unique.iter().enumerate() {
        if !has_key_basis(record) {
            // Synthetic-keyed records have no meaningful canonical hash and
            // can never collide by construction.
            continue;
        }
        let hash = canonical_hash(record);
        if let Some(&prior) = seen.get(&hash) {
            return Err(IngestError::invariant(format!(
                "unique records {prior} and {idx} share canonical hash {hash}"
            )));
        }
        seen.insert(hash, idx);
    }

    Ok(())
}

/// Picks the max-richness member as canonical; equal scores keep the
/// first-encountered record.
fn split_canonical(group: Vec<NormalizedRef>) -> (NormalizedRef, Vec<NormalizedRef>) {
    let mut best_idx = 0;
    let mut best_score = richness_score(&group[0]);

    for (idx, record) in group.iter().enumerate().skip(1) {
        let score = richness_score(record);
        if score > best_score {
            best_idx = idx;
            best_score = score;
        }
    }

    let mut duplicates = group;
    let canonical = duplicates.remove(best_idx);
    (canonical, duplicates)
}

/// Returns the hash-pass bucket key for a phase-1 canonical.
///
/// Records with no DOI, no PMID, and no title get a process-unique synthetic
/// key so they are never accidentally merged with unrelated records.
fn bucket_key(record: &NormalizedRef) -> String {
    if has_key_basis(record) {
        canonical_hash(record)
    } else {
        let n = SYNTHETIC_KEY_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("synthetic:{n}")
    }
}

/// Returns true when the record carries anything the canonical key can be
/// built from.
fn has_key_basis(record: &NormalizedRef) -> bool {
    record.has_identifier() || !normalize_title(&record.title).is_empty()
}
