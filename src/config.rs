//! Recognized configuration constants: scoring weights, confidence
//! thresholds, provider batching, and size/time limits.
//!
//! The richness weights and idRatio thresholds are empirically chosen tuning
//! constants. Changing any of them is a behavior-affecting decision — the
//! dedupe and extraction test suites assert on the exact values.

use std::time::Duration;

/// Richness points for a present title.
pub const RICHNESS_TITLE: u32 = 10;

/// Richness points for a present DOI.
pub const RICHNESS_DOI: u32 = 20;

/// Richness points for a present PMID.
pub const RICHNESS_PMID: u32 = 15;

/// Richness points for a present PMC id.
pub const RICHNESS_PMCID: u32 = 10;

/// Richness points for a present abstract.
pub const RICHNESS_ABSTRACT: u32 = 15;

/// Richness points for at least one author.
pub const RICHNESS_AUTHORS: u32 = 10;

/// Richness points for a present journal.
pub const RICHNESS_JOURNAL: u32 = 5;

/// Richness points for a present year.
pub const RICHNESS_YEAR: u32 = 5;

/// Richness points for at least one MeSH term.
pub const RICHNESS_MESH: u32 = 5;

/// Batch idRatio at or above this is high extraction confidence.
pub const CONFIDENCE_HIGH_ID_RATIO: f64 = 0.7;

/// Batch idRatio at or above this (but below high) is medium confidence.
pub const CONFIDENCE_MEDIUM_ID_RATIO: f64 = 0.3;

/// Per-record confidence for DOI-backed extractions.
pub const CONFIDENCE_DOI_PASS: f64 = 1.0;

/// Per-record confidence for labeled-PMID extractions.
pub const CONFIDENCE_PMID_PASS: f64 = 0.9;

/// Per-record confidence for structural-pattern extractions.
pub const CONFIDENCE_STRUCTURAL_PASS: f64 = 0.4;

/// Minimum DOI matches in the document tail for the density fallback.
pub const SECTION_DENSITY_MIN_DOIS: usize = 3;

/// Fraction of trailing lines scanned by the density fallback.
pub const SECTION_DENSITY_TAIL_FRACTION: f64 = 0.3;

/// Maximum ids per provider detail-fetch call (upstream batch limit).
pub const PROVIDER_DETAIL_BATCH_SIZE: usize = 200;

/// Maximum results a single search submission may request.
pub const MAX_SEARCH_LIMIT: usize = 200;

/// Per-call provider HTTP timeout.
pub const PROVIDER_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum politeness delay between calls to the same provider host.
pub const PROVIDER_MIN_DELAY: Duration = Duration::from_millis(350);

/// Maximum Retry-After header value honored before capping.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Time-to-live for cached provider detail records.
pub const PROVIDER_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Number of concurrent ingestion workers. Tuned to provider rate limits,
/// not CPU count.
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Maximum extracted-text length in characters; excess is truncated, never
/// rejected.
pub const MAX_EXTRACTED_TEXT_CHARS: usize = 2_000_000;

/// Maximum upload size for structured formats (RIS/BibTeX), in bytes.
pub const MAX_STRUCTURED_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Maximum upload size for document formats (PDF/DOCX text), in bytes.
pub const MAX_DOCUMENT_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Wall-clock budget for one whole-document extraction or structured parse.
pub const PARSE_WALL_CLOCK_BUDGET: Duration = Duration::from_secs(30);
