//! Uploaded-file import: format detection, size/time limits, and dispatch
//! to the structured parsers or the reference extractor.
//!
//! Binary parsing is not done here — PDF and DOCX uploads arrive as
//! already-extracted text plus extraction metadata from the host's format
//! collaborators. This module owns everything after that: recognizing the
//! format from the filename, enforcing the configured caps, and producing
//! graded [`NormalizedRef`] candidates.

mod bibtex;
mod ris;

pub use bibtex::parse_bibtex;
pub use ris::parse_ris;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{
    MAX_DOCUMENT_UPLOAD_BYTES, MAX_EXTRACTED_TEXT_CHARS, MAX_STRUCTURED_UPLOAD_BYTES,
};
use crate::error::IngestError;
use crate::extract::{find_references_section, parse_references};
use crate::record::{NormalizedRef, RefSource};

/// Supported upload formats, recognized by filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportFormat {
    /// RIS tagged export.
    Ris,
    /// BibTeX database.
    Bibtex,
    /// Extracted PDF text.
    Pdf,
    /// Extracted DOCX text.
    Docx,
}

impl ImportFormat {
    /// Detects the format from a filename extension (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Validation`] for unsupported extensions —
    /// surfaced immediately, never retried.
    pub fn from_filename(filename: &str) -> Result<Self, IngestError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "ris" => Ok(Self::Ris),
            "bib" | "bibtex" => Ok(Self::Bibtex),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            _ => Err(IngestError::unsupported_extension(filename)),
        }
    }

    /// Returns the record source tag for this format.
    #[must_use]
    pub fn source(self) -> RefSource {
        match self {
            Self::Ris => RefSource::Ris,
            Self::Bibtex => RefSource::Bibtex,
            Self::Pdf => RefSource::Pdf,
            Self::Docx => RefSource::Docx,
        }
    }

    /// Returns the maximum accepted upload size in bytes for this format.
    #[must_use]
    pub fn max_upload_bytes(self) -> usize {
        match self {
            Self::Ris | Self::Bibtex => MAX_STRUCTURED_UPLOAD_BYTES,
            Self::Pdf | Self::Docx => MAX_DOCUMENT_UPLOAD_BYTES,
        }
    }

    /// Returns true for the structured reference formats.
    #[must_use]
    pub fn is_structured(self) -> bool {
        matches!(self, Self::Ris | Self::Bibtex)
    }
}

/// Metadata reported by the host's text-extraction collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionMeta {
    /// Total pages in the source document when known.
    pub total_pages: Option<u32>,
    /// True when the collaborator truncated the text before handing it over.
    pub truncated: bool,
    /// Number of text lines extracted.
    pub extracted_lines: usize,
}

/// An uploaded file after host-side text extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedText {
    /// Original filename, used for format detection.
    pub filename: String,
    /// Extracted text content.
    pub text: String,
    /// Extraction metadata from the format collaborator.
    pub meta: ExtractionMeta,
}

/// Outcome of parsing one upload.
#[derive(Debug, Clone, Default)]
pub struct ImportParse {
    /// Parsed reference candidates.
    pub records: Vec<NormalizedRef>,
    /// Actionable skip messages for entries that could not be parsed.
    pub skipped: Vec<String>,
    /// True when the extracted text was truncated at the configured char cap.
    pub truncated: bool,
}

/// Validates an upload against the per-format size caps.
///
/// # Errors
///
/// Returns [`IngestError::Validation`] for an unsupported extension or
/// [`IngestError::SizeLimit`] when the payload exceeds the format's cap.
pub fn validate_upload(upload: &UploadedText) -> Result<ImportFormat, IngestError> {
    let format = ImportFormat::from_filename(&upload.filename)?;

    let size = upload.text.len();
    if size > format.max_upload_bytes() {
        return Err(IngestError::size_limit(
            "upload bytes",
            size,
            format.max_upload_bytes(),
        ));
    }

    Ok(format)
}

/// Parses an uploaded file into reference candidates.
///
/// Structured formats go through their tag/entry parsers; document formats
/// go through the references-section finder and the multi-pass extractor.
/// Text beyond the configured character cap is truncated, not rejected.
/// Pure CPU work — callers enforce the wall-clock budget around this.
#[tracing::instrument(skip(upload), fields(filename = %upload.filename))]
#[must_use]
pub fn parse_upload(format: ImportFormat, upload: &UploadedText) -> ImportParse {
    let (text, truncated) = truncate_chars(&upload.text, MAX_EXTRACTED_TEXT_CHARS);
    if truncated {
        debug!(
            limit = MAX_EXTRACTED_TEXT_CHARS,
            "Extracted text truncated at the configured character cap"
        );
    }

    let mut parse = match format {
        ImportFormat::Ris => parse_ris(text),
        ImportFormat::Bibtex => parse_bibtex(text),
        ImportFormat::Pdf | ImportFormat::Docx => {
            let records = match find_references_section(text) {
                Some(section) => parse_references(&section, format.source()),
                // No references region detected: a normal outcome, handled
                // by scanning the whole text as a last resort.
                None => parse_references(text, format.source()),
            };
            ImportParse {
                records,
                skipped: Vec::new(),
                truncated: false,
            }
        }
    };

    parse.truncated = truncated;
    parse
}

/// Truncates to a character budget, returning whether truncation happened.
fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn upload(filename: &str, text: &str) -> UploadedText {
        UploadedText {
            filename: filename.to_string(),
            text: text.to_string(),
            meta: ExtractionMeta::default(),
        }
    }

    // ==================== Format Detection ====================

    #[test]
    fn test_format_from_filename_known_extensions() {
        assert_eq!(ImportFormat::from_filename("a.ris").unwrap(), ImportFormat::Ris);
        assert_eq!(ImportFormat::from_filename("a.BIB").unwrap(), ImportFormat::Bibtex);
        assert_eq!(ImportFormat::from_filename("a.pdf").unwrap(), ImportFormat::Pdf);
        assert_eq!(ImportFormat::from_filename("a.docx").unwrap(), ImportFormat::Docx);
    }

    #[test]
    fn test_format_from_filename_unsupported_is_validation_error() {
        let err = ImportFormat::from_filename("notes.txt").unwrap_err();
        assert!(matches!(err, IngestError::Validation { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_format_from_filename_no_extension() {
        assert!(ImportFormat::from_filename("README").is_err());
    }

    // ==================== Validation ====================

    #[test]
    fn test_validate_upload_within_limits() {
        let format = validate_upload(&upload("refs.ris", "TY  - JOUR\nER  -")).unwrap();
        assert_eq!(format, ImportFormat::Ris);
    }

    #[test]
    fn test_validate_upload_oversized_structured_file() {
        let big = "x".repeat(MAX_STRUCTURED_UPLOAD_BYTES + 1);
        let err = validate_upload(&upload("refs.ris", &big)).unwrap_err();
        assert!(matches!(err, IngestError::SizeLimit { .. }));
    }

    // ==================== Truncation ====================

    #[test]
    fn test_truncate_chars_under_limit_untouched() {
        let (text, truncated) = truncate_chars("short", 100);
        assert_eq!(text, "short");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_chars_at_limit() {
        let (text, truncated) = truncate_chars("abcdef", 4);
        assert_eq!(text, "abcd");
        assert!(truncated);
    }

    #[test]
    fn test_truncate_chars_multibyte_boundary() {
        let (text, truncated) = truncate_chars("héllo", 2);
        assert_eq!(text, "hé");
        assert!(truncated);
    }

    // ==================== Dispatch ====================

    #[test]
    fn test_parse_upload_document_with_references_header() {
        let doc = upload(
            "paper.pdf",
            "Body text.\nReferences\n1. Smith J. A study of things. J Med. 2020. doi:10.1000/abc",
        );
        let parse = parse_upload(ImportFormat::Pdf, &doc);
        assert_eq!(parse.records.len(), 1);
        assert_eq!(parse.records[0].doi.as_deref(), Some("10.1000/abc"));
        assert_eq!(parse.records[0].source, RefSource::Pdf);
    }

    #[test]
    fn test_parse_upload_document_without_references_is_empty_not_error() {
        let doc = upload("paper.docx", "Just prose with no citations at all.");
        let parse = parse_upload(ImportFormat::Docx, &doc);
        assert!(parse.records.is_empty());
    }
}
