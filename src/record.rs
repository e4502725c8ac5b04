//! Bibliographic record types shared across the ingestion core.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a record entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefSource {
    /// Fetched from the PubMed search provider.
    Pubmed,
    /// Parsed from an uploaded RIS file.
    Ris,
    /// Parsed from an uploaded BibTeX file.
    Bibtex,
    /// Extracted from uploaded PDF text.
    Pdf,
    /// Extracted from uploaded DOCX text.
    Docx,
    /// Extracted from free-form document text.
    Extracted,
}

impl RefSource {
    /// Returns the stable string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pubmed => "pubmed",
            Self::Ris => "ris",
            Self::Bibtex => "bibtex",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Extracted => "extracted",
        }
    }
}

impl fmt::Display for RefSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RefSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pubmed" => Ok(Self::Pubmed),
            "ris" => Ok(Self::Ris),
            "bibtex" => Ok(Self::Bibtex),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "extracted" => Ok(Self::Extracted),
            _ => Err(format!("invalid record source: {s}")),
        }
    }
}

/// A provisional bibliographic record.
///
/// Created by a provider adapter, a format adapter, or the reference
/// extractor; consumed once by the deduplicator. Records are never mutated
/// after creation — enrichment copies into a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRef {
    /// Publication title (may be a placeholder for identifier-only records).
    pub title: String,
    /// Author names in citation order.
    pub authors: Vec<String>,
    /// Journal or venue name.
    pub journal: String,
    /// Four-digit publication year when known.
    pub year: Option<u16>,
    /// Digital Object Identifier as supplied (normalized at comparison time).
    pub doi: Option<String>,
    /// PubMed identifier.
    pub pmid: Option<String>,
    /// PubMed Central identifier.
    pub pmcid: Option<String>,
    /// Abstract text when available.
    pub abstract_text: Option<String>,
    /// MeSH indexing terms.
    pub mesh_terms: Vec<String>,
    /// Origin of this record.
    pub source: RefSource,
    /// True when extraction could not fully structure the entry.
    pub partial: bool,
    /// Extraction reliability estimate in [0, 1].
    pub confidence: f64,
    /// Original matched span, retained for audit/debugging.
    pub raw_text: Option<String>,
}

impl NormalizedRef {
    /// Creates a minimal record with the given title and source.
    ///
    /// The record starts complete (`partial = false`) at full confidence;
    /// adapters lower these as extraction quality degrades.
    #[must_use]
    pub fn new(title: impl Into<String>, source: RefSource) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            journal: String::new(),
            year: None,
            doi: None,
            pmid: None,
            pmcid: None,
            abstract_text: None,
            mesh_terms: Vec::new(),
            source,
            partial: false,
            confidence: 1.0,
            raw_text: None,
        }
    }

    /// Returns true when the record carries a DOI or PMID.
    #[must_use]
    pub fn has_identifier(&self) -> bool {
        self.doi.as_deref().is_some_and(|d| !d.trim().is_empty())
            || self.pmid.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    /// Returns true when title, journal, year, and at least one author are
    /// all present — the structural minimum for a complete record.
    #[must_use]
    pub fn has_core_fields(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.journal.trim().is_empty()
            && self.year.is_some()
            && !self.authors.is_empty()
    }

    /// Returns true when a non-partial record carries the structural minimum.
    ///
    /// Partial records are exempt — their gaps are what `partial` declares.
    #[must_use]
    pub fn is_structurally_valid(&self) -> bool {
        self.partial || self.has_core_fields()
    }
}
