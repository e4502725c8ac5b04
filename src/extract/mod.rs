//! Reference extraction from free-form document text.
//!
//! Citation parsing from running text is inherently lossy. Rather than fail,
//! this module always returns something plus an honest confidence signal:
//! the section finder reports "no references detected" as a normal `None`
//! outcome, the parser grades every candidate it emits, and
//! [`assess_confidence`] summarizes a whole batch so callers can steer users
//! toward structured formats (RIS/BibTeX) when extraction quality is poor.
//!
//! # Architecture
//!
//! - [`find_references_section`] - locates the references region of a document
//! - [`parse_references`] - turns that region into graded [`NormalizedRef`]s
//! - [`assess_confidence`] - batch-level high/medium/low classification

mod parse;
mod section;

pub use parse::parse_references;
pub use section::find_references_section;

use std::fmt;

use crate::config::{CONFIDENCE_HIGH_ID_RATIO, CONFIDENCE_MEDIUM_ID_RATIO};
use crate::record::NormalizedRef;

/// Batch-level extraction confidence, surfaced to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchConfidence {
    /// Most candidates are identifier-backed.
    High,
    /// A useful minority of candidates are identifier-backed.
    Medium,
    /// Few or no identifiers recovered (or nothing extracted at all).
    Low,
}

impl BatchConfidence {
    /// Returns the stable string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for BatchConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies a batch of extracted references by identifier coverage.
///
/// `idRatio` is the fraction of candidates carrying a DOI or PMID. At or
/// above 0.7 the batch is high confidence; at or above 0.3, medium;
/// otherwise low. An empty batch is always low.
#[must_use]
pub fn assess_confidence(refs: &[NormalizedRef]) -> BatchConfidence {
    if refs.is_empty() {
        return BatchConfidence::Low;
    }

    #[allow(clippy::cast_precision_loss)]
    let id_ratio =
        refs.iter().filter(|r| r.has_identifier()).count() as f64 / refs.len() as f64;

    if id_ratio >= CONFIDENCE_HIGH_ID_RATIO {
        BatchConfidence::High
    } else if id_ratio >= CONFIDENCE_MEDIUM_ID_RATIO {
        BatchConfidence::Medium
    } else {
        BatchConfidence::Low
    }
}
