//! Canonical-form helpers for bibliographic records.
//!
//! Pure, stateless functions with no I/O. Everything here exists to answer
//! one question — "do these two records describe the same publication?" —
//! by turning titles and identifiers into stable comparable forms and a
//! fixed-length grouping hash.

use sha2::{Digest, Sha256};

use crate::config::{
    RICHNESS_ABSTRACT, RICHNESS_AUTHORS, RICHNESS_DOI, RICHNESS_JOURNAL, RICHNESS_MESH,
    RICHNESS_PMCID, RICHNESS_PMID, RICHNESS_TITLE, RICHNESS_YEAR,
};
use crate::record::NormalizedRef;

/// Normalizes a title for comparison: lowercase, punctuation stripped
/// (Unicode character classes, not just ASCII), internal whitespace
/// collapsed to single spaces, trimmed.
///
/// Empty input yields empty output — never an error.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let stripped: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else {
                // Punctuation and symbols become separators so "state-of-the-art"
                // and "state of the art" compare equal.
                ' '
            }
        })
        .collect();

    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalizes a DOI: strips a leading `doi:` or `https://doi.org/` prefix
/// (case-insensitive, `dx.` and plain-http variants included), percent-decodes,
/// lowercases, trims.
#[must_use]
pub fn normalize_doi(doi: &str) -> String {
    let mut value = doi.trim();

    for prefix in &[
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
    ] {
        if value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix) {
            value = &value[prefix.len()..];
            break;
        }
    }

    if value.len() >= 4 && value[..4].eq_ignore_ascii_case("doi:") {
        value = value[4..].trim_start();
    }

    match urlencoding::decode(value) {
        Ok(decoded) => decoded.trim().to_lowercase(),
        Err(_) => value.trim().to_lowercase(),
    }
}

/// Normalizes a PMID: trim only. PMIDs are numeric strings; there is no
/// case to fold.
#[must_use]
pub fn normalize_pmid(pmid: &str) -> String {
    pmid.trim().to_string()
}

/// Builds the pipe-delimited canonical key for a record.
///
/// Exactly one identifier segment is used, chosen by priority
/// DOI > PMID > normalized title — a record carrying both a DOI and a PMID
/// keys on the DOI alone. A `|year:<year>` segment is appended when the
/// year is present.
#[must_use]
pub fn canonical_key(record: &NormalizedRef) -> String {
    let mut key = if let Some(doi) = present(record.doi.as_deref()) {
        format!("doi:{}", normalize_doi(doi))
    } else if let Some(pmid) = present(record.pmid.as_deref()) {
        format!("pmid:{}", normalize_pmid(pmid))
    } else {
        format!("title:{}", normalize_title(&record.title))
    };

    if let Some(year) = record.year {
        key.push_str(&format!("|year:{year}"));
    }

    key
}

/// Returns the SHA-256 digest of the canonical key, lowercase hex.
///
/// This is the dedup bucket key: colliding hashes are grouped as duplicates
/// by design. Hashing-for-grouping, not a security primitive.
#[must_use]
pub fn canonical_hash(record: &NormalizedRef) -> String {
    let digest = Sha256::digest(canonical_key(record).as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Returns true iff both records share a DOI or both share a PMID after
/// normalization.
///
/// Records lacking both identifiers are never exact duplicates by this
/// check; they fall through to hash-based grouping.
#[must_use]
pub fn is_exact_duplicate(a: &NormalizedRef, b: &NormalizedRef) -> bool {
    if let (Some(doi_a), Some(doi_b)) = (present(a.doi.as_deref()), present(b.doi.as_deref()))
        && normalize_doi(doi_a) == normalize_doi(doi_b)
    {
        return true;
    }

    if let (Some(pmid_a), Some(pmid_b)) = (present(a.pmid.as_deref()), present(b.pmid.as_deref()))
        && normalize_pmid(pmid_a) == normalize_pmid(pmid_b)
    {
        return true;
    }

    false
}

/// Additive completeness score used to pick a duplicate group's canonical
/// representative. A tie-break, not a quality score exposed to users.
#[must_use]
pub fn richness_score(record: &NormalizedRef) -> u32 {
    let mut score = 0;

    if !record.title.trim().is_empty() {
        score += RICHNESS_TITLE;
    }
    if present(record.doi.as_deref()).is_some() {
        score += RICHNESS_DOI;
    }
    if present(record.pmid.as_deref()).is_some() {
        score += RICHNESS_PMID;
    }
    if present(record.pmcid.as_deref()).is_some() {
        score += RICHNESS_PMCID;
    }
    if present(record.abstract_text.as_deref()).is_some() {
        score += RICHNESS_ABSTRACT;
    }
    if !record.authors.is_empty() {
        score += RICHNESS_AUTHORS;
    }
    if !record.journal.trim().is_empty() {
        score += RICHNESS_JOURNAL;
    }
    if record.year.is_some() {
        score += RICHNESS_YEAR;
    }
    if !record.mesh_terms.is_empty() {
        score += RICHNESS_MESH;
    }

    score
}

/// Treats empty and whitespace-only optional fields as absent.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::RefSource;

    fn record_with(doi: Option<&str>, pmid: Option<&str>, title: &str) -> NormalizedRef {
        let mut record = NormalizedRef::new(title, RefSource::Pubmed);
        record.doi = doi.map(ToString::to_string);
        record.pmid = pmid.map(ToString::to_string);
        record
    }

    // ==================== Title Normalization ====================

    #[test]
    fn test_normalize_title_lowercases_and_strips_punctuation() {
        assert_eq!(
            normalize_title("The Quick, Brown Fox: A Review!"),
            "the quick brown fox a review"
        );
    }

    #[test]
    fn test_normalize_title_collapses_whitespace() {
        assert_eq!(normalize_title("  spaced \t out\n title  "), "spaced out title");
    }

    #[test]
    fn test_normalize_title_hyphenated_equals_spaced() {
        assert_eq!(
            normalize_title("State-of-the-Art Methods"),
            normalize_title("State of the Art Methods")
        );
    }

    #[test]
    fn test_normalize_title_unicode_punctuation() {
        // Em-dash, curly quotes, and CJK punctuation are not ASCII but must strip.
        assert_eq!(
            normalize_title("“Results” — 参考文献。"),
            "results 参考文献"
        );
    }

    #[test]
    fn test_normalize_title_empty_yields_empty() {
        assert_eq!(normalize_title(""), "");
        assert_eq!(normalize_title("  ...  "), "");
    }

    // ==================== DOI / PMID Normalization ====================

    #[test]
    fn test_normalize_doi_equivalent_forms() {
        assert_eq!(normalize_doi("DOI:10.1000/182"), "10.1000/182");
        assert_eq!(normalize_doi("https://doi.org/10.1000/182"), "10.1000/182");
        assert_eq!(normalize_doi("10.1000/182"), "10.1000/182");
    }

    #[test]
    fn test_normalize_doi_dx_variant_and_case() {
        assert_eq!(
            normalize_doi("HTTPS://DX.DOI.ORG/10.1038/NATURE12373"),
            "10.1038/nature12373"
        );
    }

    #[test]
    fn test_normalize_doi_percent_decodes() {
        assert_eq!(
            normalize_doi("https://doi.org/10.1002%2Fexample"),
            "10.1002/example"
        );
    }

    #[test]
    fn test_normalize_pmid_trims_only() {
        assert_eq!(normalize_pmid("  12345678 "), "12345678");
    }

    // ==================== Canonical Key / Hash ====================

    #[test]
    fn test_canonical_key_doi_wins_over_pmid_and_title() {
        let record = record_with(Some("DOI:10.1/X"), Some("999"), "Some Title");
        assert_eq!(canonical_key(&record), "doi:10.1/x");
    }

    #[test]
    fn test_canonical_key_pmid_wins_over_title() {
        let record = record_with(None, Some(" 12345 "), "Some Title");
        assert_eq!(canonical_key(&record), "pmid:12345");
    }

    #[test]
    fn test_canonical_key_title_fallback_with_year() {
        let mut record = record_with(None, None, "A Grand Title");
        record.year = Some(2021);
        assert_eq!(canonical_key(&record), "title:a grand title|year:2021");
    }

    #[test]
    fn test_canonical_key_blank_doi_treated_as_absent() {
        let record = record_with(Some("   "), Some("42"), "T");
        assert_eq!(canonical_key(&record), "pmid:42");
    }

    #[test]
    fn test_canonical_hash_is_64_hex_chars() {
        let record = record_with(Some("10.1/x"), None, "T");
        let hash = canonical_hash(&record);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_canonical_hash_stable_across_doi_forms() {
        let a = record_with(Some("doi:10.1000/182"), None, "Title A");
        let b = record_with(Some("https://doi.org/10.1000/182"), None, "Title B");
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    // ==================== Exact Duplicate ====================

    #[test]
    fn test_is_exact_duplicate_doi_match() {
        let a = record_with(Some("10.1/x"), None, "A");
        let b = record_with(Some("DOI:10.1/X"), None, "Completely Different");
        assert!(is_exact_duplicate(&a, &b));
    }

    #[test]
    fn test_is_exact_duplicate_pmid_match() {
        let a = record_with(None, Some("123456"), "A");
        let b = record_with(None, Some(" 123456 "), "B");
        assert!(is_exact_duplicate(&a, &b));
    }

    #[test]
    fn test_is_exact_duplicate_requires_shared_identifier_kind() {
        let a = record_with(Some("10.1/x"), None, "A");
        let b = record_with(None, Some("123456"), "A");
        assert!(!is_exact_duplicate(&a, &b));
    }

    #[test]
    fn test_is_exact_duplicate_never_for_identifierless_records() {
        let a = record_with(None, None, "Same Title");
        let b = record_with(None, None, "Same Title");
        assert!(!is_exact_duplicate(&a, &b));
    }

    // ==================== Richness ====================

    #[test]
    fn test_richness_score_sums_documented_weights() {
        let mut record = record_with(Some("10.1/x"), Some("1"), "Title");
        record.pmcid = Some("PMC1".to_string());
        record.abstract_text = Some("An abstract.".to_string());
        record.authors = vec!["Smith, J.".to_string()];
        record.journal = "J Test".to_string();
        record.year = Some(2020);
        record.mesh_terms = vec!["Humans".to_string()];
        assert_eq!(richness_score(&record), 10 + 20 + 15 + 10 + 15 + 10 + 5 + 5 + 5);
    }

    #[test]
    fn test_richness_score_monotonic_in_optional_fields() {
        let base = record_with(None, None, "Title");
        let base_score = richness_score(&base);

        let mut with_doi = base.clone();
        with_doi.doi = Some("10.1/x".to_string());
        assert!(richness_score(&with_doi) > base_score);

        let mut with_abstract = with_doi.clone();
        with_abstract.abstract_text = Some("text".to_string());
        assert!(richness_score(&with_abstract) > richness_score(&with_doi));

        let mut with_mesh = with_abstract.clone();
        with_mesh.mesh_terms = vec!["Humans".to_string()];
        assert!(richness_score(&with_mesh) > richness_score(&with_abstract));
    }

    #[test]
    fn test_richness_score_empty_record_scores_zero() {
        let record = record_with(None, None, "");
        assert_eq!(richness_score(&record), 0);
    }
}
