//! Property-level tests for the deduplication engine through the public API.

use refharvest_core::normalize::{canonical_hash, normalize_doi, richness_score};
use refharvest_core::{NormalizedRef, RefSource, dedupe, validate_dedupe_result};

fn record(doi: Option<&str>, pmid: Option<&str>, title: &str) -> NormalizedRef {
    let mut r = NormalizedRef::new(title, RefSource::Pubmed);
    r.doi = doi.map(ToString::to_string);
    r.pmid = pmid.map(ToString::to_string);
    r
}

fn mixed_batch() -> Vec<NormalizedRef> {
    let mut with_year = record(None, None, "Shared Hash Title");
    with_year.year = Some(2020);
    let mut with_year_dup = record(None, None, "shared hash title");
    with_year_dup.year = Some(2020);

    vec![
        record(Some("10.1/a"), None, "Alpha"),
        record(Some("10.1/a"), Some("1"), "Alpha Variant"),
        record(None, Some("2"), "Beta"),
        record(None, Some("2"), "Beta Again"),
        with_year,
        with_year_dup,
        record(None, None, "Unique Standalone"),
        record(None, None, ""),
    ]
}

#[test]
fn stats_total_always_equals_input_length() {
    for batch in [Vec::new(), mixed_batch(), vec![record(None, None, "x")]] {
        let len = batch.len();
        let result = dedupe(batch);
        assert_eq!(result.stats.total, len);
        assert_eq!(result.stats.total, result.stats.unique + result.stats.duplicates);
    }
}

#[test]
fn unique_count_matches_group_count_and_stats() {
    let result = dedupe(mixed_batch());
    assert_eq!(result.stats.unique, result.unique.len());
    assert_eq!(result.groups.len(), result.unique.len());
    validate_dedupe_result(&result).expect("engine output must self-validate");
}

#[test]
fn every_input_record_appears_in_exactly_one_group() {
    let batch = mixed_batch();
    let len = batch.len();
    let result = dedupe(batch);

    let spread: usize = result
        .groups
        .iter()
        .map(|g| 1 + g.duplicates.len())
        .sum();
    assert_eq!(spread, len);
}

#[test]
fn no_two_unique_records_share_a_canonical_hash() {
    let result = dedupe(mixed_batch());
    let mut hashes: Vec<String> = result
        .unique
        .iter()
        .filter(|r| r.has_identifier() || !r.title.trim().is_empty())
        .map(canonical_hash)
        .collect();
    let before = hashes.len();
    hashes.sort();
    hashes.dedup();
    assert_eq!(hashes.len(), before);
}

#[test]
fn dedupe_is_idempotent_on_its_own_output() {
    let first = dedupe(mixed_batch());
    let second = dedupe(first.unique.clone());

    assert_eq!(second.stats.duplicates, 0);
    assert_eq!(second.unique, first.unique);
}

#[test]
fn doi_forms_normalize_identically() {
    assert_eq!(normalize_doi("DOI:10.1000/182"), "10.1000/182");
    assert_eq!(normalize_doi("https://doi.org/10.1000/182"), "10.1000/182");
    assert_eq!(
        normalize_doi("DOI:10.1000/182"),
        normalize_doi("https://doi.org/10.1000/182")
    );
}

#[test]
fn richness_never_decreases_when_fields_are_added() {
    let mut record = record(None, None, "Monotonicity Test");
    let mut last = richness_score(&record);

    record.doi = Some("10.1/m".to_string());
    assert!(richness_score(&record) > last);
    last = richness_score(&record);

    record.pmid = Some("12345".to_string());
    assert!(richness_score(&record) > last);
    last = richness_score(&record);

    record.pmcid = Some("PMC1".to_string());
    assert!(richness_score(&record) > last);
    last = richness_score(&record);

    record.abstract_text = Some("abstract".to_string());
    assert!(richness_score(&record) > last);
    last = richness_score(&record);

    record.authors.push("Smith, J.".to_string());
    assert!(richness_score(&record) > last);
    last = richness_score(&record);

    record.journal = "J Mono".to_string();
    assert!(richness_score(&record) > last);
    last = richness_score(&record);

    record.year = Some(2024);
    assert!(richness_score(&record) > last);
    last = richness_score(&record);

    record.mesh_terms.push("Humans".to_string());
    assert!(richness_score(&record) > last);
}

#[test]
fn shared_doi_keeps_exactly_one_record_preferring_richness() {
    let poor = record(Some("10.1/x"), None, "A");
    let mut rich = record(Some("10.1/x"), None, "B");
    rich.abstract_text = Some("more complete".to_string());

    let result = dedupe(vec![poor.clone(), rich.clone()]);
    assert_eq!(result.unique.len(), 1);
    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.unique[0].title, "B");

    // Equal richness: first in input order wins.
    let tie = dedupe(vec![poor.clone(), record(Some("10.1/x"), None, "Later")]);
    assert_eq!(tie.unique[0].title, "A");
}
