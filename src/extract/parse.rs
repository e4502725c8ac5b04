//! Multi-pass parsing of a references section into graded records.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::section::DOI_PATTERN;
use crate::config::{CONFIDENCE_DOI_PASS, CONFIDENCE_PMID_PASS, CONFIDENCE_STRUCTURAL_PASS};
use crate::normalize::{normalize_doi, normalize_pmid, normalize_title};
use crate::record::{NormalizedRef, RefSource};

/// Labeled PMID pattern: `PMID: 12345678` / `pmid:12345678`, 6-9 digits.
#[allow(clippy::expect_used)]
static PMID_LABEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpmid:?\s*(\d{6,9})\b").expect("PMID label regex is valid") // Static pattern, safe to panic
});

/// Numbered-citation entry: `[12] ...`, `3. ...`, `7) ...`.
#[allow(clippy::expect_used)]
static NUMBERED_CITATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\[\d{1,3}\]|\d{1,3}[.)])\s+\S").expect("numbered citation regex is valid") // Static pattern, safe to panic
});

/// Author-year entry: `Smith, J. ... (2020)` / `Smith, John ... 2020`.
#[allow(clippy::expect_used)]
static AUTHOR_YEAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{Lu}][\p{L}'`\-]+,\s*(?:[\p{Lu}]\.|[\p{Lu}][\p{L}]+).*\(?(?:19|20)\d{2}\)?")
        .expect("author-year regex is valid") // Static pattern, safe to panic
});

/// Loose Vancouver author list: `Smith J, Jones KL.` at line start.
#[allow(clippy::expect_used)]
static VANCOUVER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[\p{Lu}][\p{L}'`\-]+\s+[\p{Lu}]{1,3}[.,]\s*)+")
        .expect("vancouver author regex is valid") // Static pattern, safe to panic
});

/// Four-digit publication year, 19xx/20xx.
#[allow(clippy::expect_used)]
static YEAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:19|20)\d{2})\b").expect("year regex is valid") // Static pattern, safe to panic
});

/// Capitalized word run, candidate journal name.
#[allow(clippy::expect_used)]
static CAPITALIZED_RUN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[\p{Lu}][\p{L}]*\.?(?:\s+[\p{Lu}][\p{L}]*\.?)*")
        .expect("capitalized run regex is valid") // Static pattern, safe to panic
});

/// Tokens that make a capitalized run look like a journal name.
const JOURNAL_TOKENS: &[&str] = &["J", "Journal", "Rev", "Res", "Med"];

/// Minimum line length considered by the structural pass.
const MIN_STRUCTURAL_LINE_LEN: usize = 20;

/// Title candidates must fall in this length range.
const TITLE_LEN_RANGE: std::ops::RangeInclusive<usize> = 10..=160;

/// Parses a references section into partially-structured records.
///
/// Three passes, highest confidence first, each adding only entries whose
/// dedup key has not been seen yet:
///
/// 1. every DOI occurrence → confidence 1.0;
/// 2. every labeled PMID on a line with no DOI extraction → confidence 0.9;
/// 3. structural patterns (numbered citation, author-year, loose Vancouver)
///    over the remaining lines, carving year/journal/title heuristically →
///    confidence 0.4, kept only when at least one field was recovered.
///
/// Within-document duplicate keys (DOI, PMID, title+year, raw prefix) are
/// silently dropped — extraction-time noise suppression, distinct from the
/// project-level deduplicator.
#[tracing::instrument(skip(section), fields(input_len = section.len()))]
#[must_use]
pub fn parse_references(section: &str, source: RefSource) -> Vec<NormalizedRef> {
    let mut results = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let lines: Vec<&str> = section.lines().collect();
    let mut covered: Vec<bool> = vec![false; lines.len()];

    // Pass 1: DOIs.
    for (idx, line) in lines.iter().enumerate() {
        for m in DOI_PATTERN.find_iter(line) {
            let doi = clean_trailing(m.as_str());
            if doi.is_empty() {
                continue;
            }
            covered[idx] = true;

            if !seen.insert(format!("doi:{}", normalize_doi(doi))) {
                continue;
            }

            let mut record = NormalizedRef::new(doi, source);
            record.doi = Some(doi.to_string());
            record.year = extract_year(line);
            record.confidence = CONFIDENCE_DOI_PASS;
            record.raw_text = Some(line.trim().to_string());
            results.push(record);
        }
    }

    // Pass 2: labeled PMIDs on lines without a DOI extraction.
    for (idx, line) in lines.iter().enumerate() {
        if covered[idx] {
            continue;
        }
        for cap in PMID_LABEL_PATTERN.captures_iter(line) {
            let Some(pmid) = cap.get(1) else { continue };
            covered[idx] = true;

            if !seen.insert(format!("pmid:{}", normalize_pmid(pmid.as_str()))) {
                continue;
            }

            let mut record = NormalizedRef::new(format!("PMID:{}", pmid.as_str()), source);
            record.pmid = Some(pmid.as_str().to_string());
            record.year = extract_year(line);
            record.partial = true;
            record.confidence = CONFIDENCE_PMID_PASS;
            record.raw_text = Some(line.trim().to_string());
            results.push(record);
        }
    }

    // Pass 3: structural patterns over the remaining lines.
    for (idx, line) in lines.iter().enumerate() {
        if covered[idx] {
            continue;
        }
        let trimmed = line.trim();
        if trimmed.len() < MIN_STRUCTURAL_LINE_LEN || !matches_structural_pattern(trimmed) {
            continue;
        }

        let year = extract_year(trimmed);
        let journal = extract_journal(trimmed);
        let title = extract_title(trimmed);

        // Pure noise: nothing recovered.
        if year.is_none() && journal.is_none() && title.is_none() {
            continue;
        }

        let key = match (&title, year) {
            (Some(t), Some(y)) => format!("ty:{}|{y}", normalize_title(t)),
            _ => format!("raw:{}", raw_prefix(trimmed)),
        };
        if !seen.insert(key) {
            continue;
        }

        let mut record = NormalizedRef::new(title.unwrap_or_default(), source);
        record.journal = journal.unwrap_or_default();
        record.year = year;
        record.partial = true;
        record.confidence = CONFIDENCE_STRUCTURAL_PASS;
        record.raw_text = Some(trimmed.to_string());
        results.push(record);
    }

    debug!(
        extracted = results.len(),
        "Reference parsing passes complete"
    );
    results
}

/// Returns true when a line matches any of the three structural patterns.
fn matches_structural_pattern(line: &str) -> bool {
    NUMBERED_CITATION_PATTERN.is_match(line)
        || AUTHOR_YEAR_PATTERN.is_match(line)
        || VANCOUVER_PATTERN.is_match(line)
}

/// Carves a 4-digit 19xx/20xx year out of a line.
fn extract_year(line: &str) -> Option<u16> {
    YEAR_PATTERN
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Carves a journal-looking substring: the first capitalized word run
/// containing one of the journal marker tokens.
fn extract_journal(line: &str) -> Option<String> {
    for m in CAPITALIZED_RUN_PATTERN.find_iter(line) {
        let run = m.as_str().trim().trim_end_matches('.');
        let looks_like_journal = run
            .split_whitespace()
            .map(|token| token.trim_end_matches('.'))
            .any(|token| JOURNAL_TOKENS.contains(&token));
        if looks_like_journal {
            return Some(run.to_string());
        }
    }
    None
}

/// Carves a title: the text between the second and third sentence-terminal
/// periods, accepted at 10-160 characters.
fn extract_title(line: &str) -> Option<String> {
    let bytes = line.as_bytes();
    let mut terminals = Vec::new();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'.' && (i + 1 == bytes.len() || bytes[i + 1].is_ascii_whitespace()) {
            terminals.push(i);
        }
    }

    if terminals.len() < 3 {
        return None;
    }

    let candidate = line.get(terminals[1] + 1..terminals[2])?.trim();
    if TITLE_LEN_RANGE.contains(&candidate.chars().count()) {
        Some(candidate.to_string())
    } else {
        None
    }
}

/// Strips trailing sentence punctuation picked up by the DOI pattern.
fn clean_trailing(doi: &str) -> &str {
    doi.trim_end_matches(['.', ',', ';', ':'])
}

/// First 80 characters of a line, used as the noise-suppression key when no
/// better key exists.
fn raw_prefix(line: &str) -> String {
    line.chars().take(80).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Pass 1: DOIs ====================

    #[test]
    fn test_parse_extracts_dois_at_full_confidence() {
        let section = "\
1. Smith J, Jones K. A study. J Med. 2020. doi:10.1000/aaa
2. Brown L. Another study. J Res. 2021. doi:10.1000/bbb";
        let refs = parse_references(section, RefSource::Pdf);
        let dois: Vec<_> = refs.iter().filter(|r| r.doi.is_some()).collect();
        assert_eq!(dois.len(), 2);
        for r in &dois {
            assert!((r.confidence - 1.0).abs() < f64::EPSILON);
            assert!(!r.partial);
            assert_eq!(r.source, RefSource::Pdf);
        }
    }

    #[test]
    fn test_parse_doi_trailing_period_cleaned() {
        let refs = parse_references("See 10.1000/abc.", RefSource::Extracted);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].doi.as_deref(), Some("10.1000/abc"));
    }

    #[test]
    fn test_parse_duplicate_dois_suppressed() {
        let section = "Entry 10.1000/same\nRepeat 10.1000/same";
        let refs = parse_references(section, RefSource::Extracted);
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn test_parse_doi_record_retains_raw_text() {
        let section = "17. Smith J. Title here. 10.1000/xyz";
        let refs = parse_references(section, RefSource::Extracted);
        assert_eq!(refs[0].raw_text.as_deref(), Some(section));
    }

    // ==================== Pass 2: PMIDs ====================

    #[test]
    fn test_parse_labeled_pmid() {
        let refs = parse_references("Smith J. A paper. PMID: 12345678", RefSource::Extracted);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].pmid.as_deref(), Some("12345678"));
        assert!((refs[0].confidence - 0.9).abs() < f64::EPSILON);
        assert!(refs[0].partial);
    }

    #[test]
    fn test_parse_pmid_skipped_when_doi_on_same_line() {
        let refs = parse_references(
            "Smith J. A paper. 10.1000/abc PMID: 12345678",
            RefSource::Extracted,
        );
        assert_eq!(refs.len(), 1);
        assert!(refs[0].doi.is_some());
        assert!(refs[0].pmid.is_none());
    }

    #[test]
    fn test_parse_pmid_requires_label() {
        // A bare 8-digit number is not a PMID extraction.
        let refs = parse_references("Report number 12345678 from the archive", RefSource::Extracted);
        assert!(refs.iter().all(|r| r.pmid.is_none()));
    }

    #[test]
    fn test_parse_pmid_lowercase_label() {
        let refs = parse_references("A paper. pmid:987654 more text", RefSource::Extracted);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].pmid.as_deref(), Some("987654"));
    }

    // ==================== Pass 3: Structural ====================

    #[test]
    fn test_parse_structural_numbered_citation() {
        let line = "3. Miller T, Davis R. Outcomes of long-term therapy in adults. J Clin Med. 2019;12(3):45-67.";
        let refs = parse_references(line, RefSource::Extracted);
        assert_eq!(refs.len(), 1);
        let r = &refs[0];
        assert!(r.partial);
        assert!((r.confidence - 0.4).abs() < f64::EPSILON);
        assert_eq!(r.year, Some(2019));
        assert!(r.journal.contains("Med"));
    }

    #[test]
    fn test_parse_structural_author_year() {
        let line = "Garcia, M. (2018). Urban heat islands and public health responses. Environmental Res Letters, 13(2).";
        let refs = parse_references(line, RefSource::Extracted);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].year, Some(2018));
    }

    #[test]
    fn test_parse_structural_title_between_second_and_third_periods() {
        let line = "5. Chen W, Park S. Genomic drivers of rare disease phenotypes. Nature Rev Genetics. 2022.";
        let refs = parse_references(line, RefSource::Extracted);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].title, "Genomic drivers of rare disease phenotypes");
    }

    #[test]
    fn test_parse_structural_pure_noise_dropped() {
        // Matches the numbered pattern but yields no year/journal/title.
        let refs = parse_references("1. asdf qwer zxcv uiop hjkl", RefSource::Extracted);
        assert!(refs.is_empty());
    }

    #[test]
    fn test_parse_structural_short_lines_ignored() {
        let refs = parse_references("1. Too short", RefSource::Extracted);
        assert!(refs.is_empty());
    }

    #[test]
    fn test_parse_plain_prose_yields_nothing() {
        let text = "this study considered many factors over several decades of measurement";
        let refs = parse_references(text, RefSource::Extracted);
        assert!(refs.is_empty());
    }

    #[test]
    fn test_parse_structural_duplicate_title_year_suppressed() {
        let line_a = "1. Chen W, Park S. Genomic drivers of rare disease phenotypes. Nature Rev Genetics. 2022.";
        let line_b = "2. Chen W, Park S. Genomic drivers of rare disease phenotypes. Nature Rev Genetics. 2022.";
        let refs = parse_references(&format!("{line_a}\n{line_b}"), RefSource::Extracted);
        assert_eq!(refs.len(), 1);
    }

    // ==================== Field Carving ====================

    #[test]
    fn test_extract_year_in_range() {
        assert_eq!(extract_year("published 2019 in print"), Some(2019));
        assert_eq!(extract_year("volume 3001 page 12"), None);
    }

    #[test]
    fn test_extract_journal_requires_marker_token() {
        assert_eq!(
            extract_journal("appeared in J Clin Invest last year"),
            Some("J Clin Invest".to_string())
        );
        assert_eq!(extract_journal("appeared in Proceedings last year"), None);
    }

    #[test]
    fn test_extract_title_rejects_out_of_range_lengths() {
        // Middle segment is 3 chars, below the 10-char floor.
        assert_eq!(extract_title("One. Two. Abc. Four."), None);
    }

    #[test]
    fn test_empty_section_yields_empty() {
        assert!(parse_references("", RefSource::Extracted).is_empty());
    }
}
