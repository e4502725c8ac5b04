//! RIS tagged-format parsing.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::ImportParse;
use crate::record::{NormalizedRef, RefSource};

/// RIS tag line: `XX  - value` (two uppercase alphanumerics, two spaces,
/// hyphen). The value may be empty (`ER  -`).
#[allow(clippy::expect_used)]
static TAG_LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][A-Z0-9])\s\s-\s?(.*)$").expect("RIS tag line regex is valid") // Static pattern, safe to panic
});

/// Leading 4-digit year in RIS date values like `2020/05//`.
#[allow(clippy::expect_used)]
static YEAR_PREFIX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*((?:18|19|20)\d{2})").expect("RIS year prefix regex is valid") // Static pattern, safe to panic
});

/// Parses RIS text into reference records.
///
/// Entries run from a `TY` tag to the matching `ER` tag. Tag lines that do
/// not match the RIS shape are treated as continuations of the previous
/// value (long abstracts wrap this way in real exports). Entries closed
/// without a `TY` opener, or carrying no usable fields, are reported in
/// `skipped` with an actionable message.
#[tracing::instrument(skip(input), fields(input_len = input.len()))]
#[must_use]
pub fn parse_ris(input: &str) -> ImportParse {
    let mut parse = ImportParse::default();
    let mut current: Option<RisEntry> = None;

    for line in input.lines() {
        let Some(cap) = TAG_LINE_PATTERN.captures(line) else {
            // Continuation of the previous tag's value.
            if let Some(entry) = current.as_mut()
                && let Some(last) = entry.last_tag.clone()
            {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    entry.append(&last, trimmed);
                }
            }
            continue;
        };

        let tag = &cap[1];
        let value = cap[2].trim().to_string();

        match tag {
            "TY" => {
                if let Some(open) = current.take() {
                    // Previous entry was never closed; salvage it anyway.
                    finish_entry(open, &mut parse);
                }
                current = Some(RisEntry::new(value));
            }
            "ER" => {
                if let Some(entry) = current.take() {
                    finish_entry(entry, &mut parse);
                } else {
                    parse
                        .skipped
                        .push("ER tag without a matching TY opener".to_string());
                }
            }
            _ => {
                if let Some(entry) = current.as_mut() {
                    entry.set(tag, &value);
                } else {
                    parse
                        .skipped
                        .push(format!("{tag} tag outside of a TY/ER entry"));
                }
            }
        }
    }

    if let Some(open) = current.take() {
        finish_entry(open, &mut parse);
    }

    debug!(
        parsed = parse.records.len(),
        skipped = parse.skipped.len(),
        "RIS parsing complete"
    );
    parse
}

/// Accumulator for one TY..ER entry.
#[derive(Debug, Default)]
struct RisEntry {
    entry_type: String,
    title: Option<String>,
    authors: Vec<String>,
    journal: Option<String>,
    year: Option<u16>,
    doi: Option<String>,
    abstract_text: Option<String>,
    accession: Option<String>,
    last_tag: Option<String>,
}

impl RisEntry {
    fn new(entry_type: String) -> Self {
        Self {
            entry_type,
            ..Self::default()
        }
    }

    fn set(&mut self, tag: &str, value: &str) {
        self.last_tag = Some(tag.to_string());
        if value.is_empty() {
            return;
        }

        match tag {
            // Primary title wins over alternates already seen.
            "TI" => self.title = Some(value.to_string()),
            "T1" => {
                if self.title.is_none() {
                    self.title = Some(value.to_string());
                }
            }
            "AU" | "A1" => self.authors.push(value.to_string()),
            "JO" | "JF" => self.journal = Some(value.to_string()),
            "T2" => {
                if self.journal.is_none() {
                    self.journal = Some(value.to_string());
                }
            }
            "PY" | "Y1" => {
                if self.year.is_none() {
                    self.year = YEAR_PREFIX_PATTERN
                        .captures(value)
                        .and_then(|cap| cap.get(1))
                        .and_then(|m| m.as_str().parse().ok());
                }
            }
            "DO" => self.doi = Some(value.to_string()),
            "AB" | "N2" => {
                if self.abstract_text.is_none() {
                    self.abstract_text = Some(value.to_string());
                }
            }
            "AN" => self.accession = Some(value.to_string()),
            _ => {}
        }
    }

    fn append(&mut self, tag: &str, value: &str) {
        let target = match tag {
            "TI" | "T1" => self.title.as_mut(),
            "AB" | "N2" => self.abstract_text.as_mut(),
            "JO" | "JF" | "T2" => self.journal.as_mut(),
            _ => None,
        };
        if let Some(existing) = target {
            existing.push(' ');
            existing.push_str(value);
        }
    }

    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.authors.is_empty()
            && self.doi.is_none()
            && self.accession.is_none()
    }
}

fn finish_entry(entry: RisEntry, parse: &mut ImportParse) {
    if entry.is_empty() {
        parse.skipped.push(format!(
            "empty {} entry with no title, authors, or identifiers",
            if entry.entry_type.is_empty() {
                "RIS".to_string()
            } else {
                entry.entry_type.clone()
            }
        ));
        return;
    }

    let mut record = NormalizedRef::new(entry.title.unwrap_or_default(), RefSource::Ris);
    record.authors = entry.authors;
    record.journal = entry.journal.unwrap_or_default();
    record.year = entry.year;
    record.doi = entry.doi;
    // RIS accession numbers from PubMed exports are the PMID.
    record.pmid = entry.accession.filter(|a| a.chars().all(|c| c.is_ascii_digit()));
    record.abstract_text = entry.abstract_text;
    record.partial = !record.has_core_fields();
    parse.records.push(record);
}
