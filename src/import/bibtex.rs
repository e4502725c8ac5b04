//! BibTeX parsing for supported entry types.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::ImportParse;
use crate::normalize::normalize_doi;
use crate::record::{NormalizedRef, RefSource};

#[allow(clippy::expect_used)]
static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:18|19|20)\d{2}\b").expect("bibtex year regex is valid"));
#[allow(clippy::expect_used)]
static AUTHOR_SPLIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").expect("bibtex author split regex is valid"));

const SUPPORTED_TYPES: [&str; 4] = ["article", "book", "inproceedings", "incollection"];
const IGNORED_BLOCK_TYPES: [&str; 3] = ["comment", "preamble", "string"];

/// Parses BibTeX text into reference records.
///
/// Entries are segmented with brace/quote awareness so nested braces and
/// escaped quotes inside field values survive. Unsupported entry types and
/// malformed entries are reported in `skipped` with an actionable message;
/// a malformed entry never swallows the following valid one.
#[tracing::instrument(skip(input), fields(input_len = input.len()))]
#[must_use]
pub fn parse_bibtex(input: &str) -> ImportParse {
    let mut parse = ImportParse::default();

    for raw_entry in segment_entries(input) {
        match parse_entry(&raw_entry) {
            EntryOutcome::Parsed(record) => parse.records.push(record),
            EntryOutcome::Ignore => {}
            EntryOutcome::Skip(message) => parse.skipped.push(message),
        }
    }

    debug!(
        parsed = parse.records.len(),
        skipped = parse.skipped.len(),
        "BibTeX parsing complete"
    );
    parse
}

#[derive(Debug)]
enum EntryOutcome {
    Parsed(NormalizedRef),
    Ignore,
    Skip(String),
}

/// Splits input into `@type{...}` candidate segments.
///
/// Each `@` that opens a plausible entry is measured for a balanced body;
/// an entry whose braces never close is captured up to the next
/// line-leading `@`, so one malformed entry cannot swallow the rest of the
/// file.
fn segment_entries(input: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(at) = rest.find('@') {
        let candidate = &rest[at..];
        if !looks_like_entry_start(candidate) {
            // Stray `@` (an email address, say) - keep scanning.
            rest = &rest[at + 1..];
            continue;
        }

        match balanced_entry_len(candidate) {
            Some(len) => {
                segments.push(candidate[..len].trim().to_string());
                rest = &candidate[len..];
            }
            None => {
                let cut = next_entry_start(candidate);
                segments.push(candidate[..cut].trim().to_string());
                if cut == candidate.len() {
                    break;
                }
                rest = &candidate[cut..];
            }
        }
    }

    segments
}

/// True when text starting at an `@` reads `@type{` (whitespace allowed
/// between the type name and the brace).
fn looks_like_entry_start(candidate: &str) -> bool {
    candidate[1..]
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .trim_start()
        .starts_with('{')
}

/// Byte length of a balanced `@type{...}` entry, or `None` when its braces
/// never close. Braces inside quoted strings and backslash-escaped
/// characters do not count toward the depth.
fn balanced_entry_len(candidate: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, ch) in candidate.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '{' if !in_quotes => depth += 1,
            '}' if !in_quotes => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
                if depth == 0 {
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// Offset of the next line-leading `@` after the current one, or the
/// candidate's full length when no later entry start exists.
fn next_entry_start(candidate: &str) -> usize {
    let mut offset = 1;
    while let Some(found) = candidate[offset..].find('@') {
        let at = offset + found;
        if candidate[..at].ends_with(['\n', '\r']) {
            return at;
        }
        offset = at + 1;
    }
    candidate.len()
}

fn parse_entry(raw_entry: &str) -> EntryOutcome {
    let trimmed = raw_entry.trim();
    let Some(at_pos) = trimmed.find('@') else {
        return EntryOutcome::Skip(
            "malformed BibTeX entry: missing '@type{...}' prefix".to_string(),
        );
    };
    let after_at = &trimmed[at_pos + 1..];
    let Some(brace_pos) = after_at.find('{') else {
        return EntryOutcome::Skip(format!(
            "malformed BibTeX entry `{}`: missing opening '{{' after entry type",
            preview(trimmed)
        ));
    };

    let entry_type = after_at[..brace_pos].trim().to_ascii_lowercase();
    if IGNORED_BLOCK_TYPES.contains(&entry_type.as_str()) {
        return EntryOutcome::Ignore;
    }
    if !SUPPORTED_TYPES.contains(&entry_type.as_str()) {
        return EntryOutcome::Skip(format!(
            "unsupported BibTeX entry type `@{entry_type}`: export article/book/inproceedings entries or use RIS"
        ));
    }

    let body = &after_at[brace_pos + 1..];
    if !trimmed.ends_with('}') {
        return EntryOutcome::Skip(format!(
            "malformed BibTeX entry `{}`: unbalanced braces (entry never closed)",
            preview(trimmed)
        ));
    }
    let body = &body[..body.len().saturating_sub(1)];
    let Some((key_raw, fields_raw)) = body.split_once(',') else {
        return EntryOutcome::Skip(format!(
            "malformed BibTeX entry `{}`: missing citation key or field list",
            preview(trimmed)
        ));
    };

    if key_raw.trim().is_empty() {
        return EntryOutcome::Skip(format!(
            "malformed BibTeX entry `{}`: empty citation key",
            preview(trimmed)
        ));
    }

    let fields = match parse_fields(fields_raw) {
        Ok(fields) => fields,
        Err(reason) => {
            return EntryOutcome::Skip(format!(
                "malformed BibTeX field assignment in `{}`: {reason}",
                preview(trimmed)
            ));
        }
    };

    let mut record = NormalizedRef::new(
        fields.get("title").cloned().unwrap_or_default(),
        RefSource::Bibtex,
    );
    record.authors = fields
        .get("author")
        .map(|value| split_authors(value))
        .unwrap_or_default();
    // @inproceedings/@incollection carry their venue in booktitle.
    record.journal = fields
        .get("journal")
        .or_else(|| fields.get("booktitle"))
        .cloned()
        .unwrap_or_default();
    record.year = fields
        .get("year")
        .and_then(|value| YEAR_PATTERN.find(value))
        .and_then(|m| m.as_str().parse().ok());
    record.doi = fields
        .get("doi")
        .map(|value| normalize_doi(value))
        .filter(|value| !value.is_empty());
    record.pmid = fields
        .get("pmid")
        .cloned()
        .filter(|value| value.chars().all(|c| c.is_ascii_digit()));
    record.abstract_text = fields.get("abstract").cloned();
    record.raw_text = Some(trimmed.to_string());
    record.partial = !record.has_core_fields();

    EntryOutcome::Parsed(record)
}

/// Folds the field list into a name → value map. First value wins for a
/// repeated name, per standard BibTeX convention.
fn parse_fields(body: &str) -> Result<HashMap<String, String>, String> {
    let mut fields = HashMap::new();

    for segment in split_on_top_level_commas(body)? {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (name, raw_value) = segment
            .split_once('=')
            .ok_or_else(|| format!("missing '=' in field segment `{segment}`"))?;
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err("empty field name".to_string());
        }
        let value = strip_delimiters(raw_value.trim())
            .ok_or_else(|| format!("invalid value in field `{name}`"))?;
        fields.entry(name).or_insert(value);
    }

    Ok(fields)
}

/// Splits a field list on the commas that sit outside braces and quoted
/// strings, validating balance along the way.
fn split_on_top_level_commas(body: &str) -> Result<Vec<&str>, String> {
    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, ch) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '{' if !in_quotes => depth += 1,
            '}' if !in_quotes => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "closing brace without matching opening brace".to_string())?;
            }
            ',' if !in_quotes && depth == 0 => {
                segments.push(&body[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    if in_quotes {
        return Err("unterminated quoted value".to_string());
    }
    if depth != 0 {
        return Err("unbalanced braces in field values".to_string());
    }

    segments.push(&body[start..]);
    Ok(segments)
}

fn strip_delimiters(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_end_matches(',').trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') && trimmed.len() >= 2 {
        return Some(collapse_whitespace(&trimmed[1..trimmed.len() - 1]));
    }
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        let inner = trimmed[1..trimmed.len() - 1].replace("\\\"", "\"");
        return Some(collapse_whitespace(&inner));
    }

    Some(collapse_whitespace(trimmed))
}

/// Field values may wrap across lines in real exports.
fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_authors(value: &str) -> Vec<String> {
    AUTHOR_SPLIT_PATTERN
        .split(value)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn preview(input: &str) -> String {
    const MAX: usize = 80;
    if input.chars().count() <= MAX {
        return input.to_string();
    }
    let shortened: String = input.chars().take(MAX).collect();
    format!("{shortened}...")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bibtex_supported_entry_types() {
        let input = r"
@article{a1, title={A}, author={Smith, J.}, year={2024}}
@book{b1, title={B}, author={Jones, K.}, year={2023}}
@inproceedings{c1, title={C}, author={Lee, M.}, year={2022}}
";
        let parse = parse_bibtex(input);
        assert_eq!(parse.records.len(), 3);
        assert!(parse.skipped.is_empty());
    }

    #[test]
    fn test_parse_bibtex_full_article_fields() {
        let input = r"@article{k, title={Paper Title That Works}, author={Smith, J. and Doe, R.}, journal={J Test Res}, year={2024}, doi={https://doi.org/10.1234/example}, abstract={Short abstract.}}";
        let parse = parse_bibtex(input);
        assert_eq!(parse.records.len(), 1);
        let r = &parse.records[0];
        assert_eq!(r.title, "Paper Title That Works");
        assert_eq!(r.authors, vec!["Smith, J.", "Doe, R."]);
        assert_eq!(r.journal, "J Test Res");
        assert_eq!(r.year, Some(2024));
        assert_eq!(r.doi.as_deref(), Some("10.1234/example"));
        assert_eq!(r.abstract_text.as_deref(), Some("Short abstract."));
        assert_eq!(r.source, RefSource::Bibtex);
        assert!(!r.partial);
    }

    #[test]
    fn test_parse_bibtex_incomplete_entry_marked_partial() {
        let input = r"@article{k, title={Title Only}, year={2024}}";
        let parse = parse_bibtex(input);
        assert_eq!(parse.records.len(), 1);
        assert!(parse.records[0].partial, "no authors/journal means partial");
    }

    #[test]
    fn test_parse_bibtex_booktitle_used_as_venue() {
        let input = r"@inproceedings{k, title={Conf Paper}, author={Kim, S.}, booktitle={Proc Intl Conf Testing}, year={2022}}";
        let parse = parse_bibtex(input);
        assert_eq!(parse.records[0].journal, "Proc Intl Conf Testing");
    }

    #[test]
    fn test_parse_bibtex_quoted_values_and_trailing_comma() {
        let input = r#"@article{k, title="Quoted Title", author={Smith, J.}, year="2024",}"#;
        let parse = parse_bibtex(input);
        assert_eq!(parse.records.len(), 1);
        assert_eq!(parse.records[0].title, "Quoted Title");
        assert_eq!(parse.records[0].year, Some(2024));
    }

    #[test]
    fn test_parse_bibtex_nested_braces_and_escaped_quotes() {
        let input = r#"@article{k, title={A {Nested} Title with \"quote\"}, author={Smith, J.}, year={2024}}"#;
        let parse = parse_bibtex(input);
        assert_eq!(parse.records.len(), 1);
        assert!(parse.records[0].title.contains("Nested"));
    }

    #[test]
    fn test_parse_bibtex_multiline_field_values_collapsed() {
        let input = "@article{key1,\n  title = {A very long\n           multiline title},\n  author = {Smith, J.},\n  year = {2024}\n}";
        let parse = parse_bibtex(input);
        assert_eq!(parse.records.len(), 1);
        assert_eq!(parse.records[0].title, "A very long multiline title");
    }

    #[test]
    fn test_parse_bibtex_ignores_comment_preamble_string() {
        let input = r#"
@comment{this is ignored}
@preamble{"\newcommand{\noop}{}"}
@string{foo = "bar"}
@article{k, title={A}, author={Smith, J.}, year={2024}}
"#;
        let parse = parse_bibtex(input);
        assert_eq!(parse.records.len(), 1);
        assert!(parse.skipped.is_empty());
    }

    #[test]
    fn test_parse_bibtex_unsupported_type_skipped_with_message() {
        let input = r"@misc{k, title={A}, year={2024}}";
        let parse = parse_bibtex(input);
        assert!(parse.records.is_empty());
        assert_eq!(parse.skipped.len(), 1);
        assert!(parse.skipped[0].contains("unsupported BibTeX entry type"));
    }

    #[test]
    fn test_parse_bibtex_unbalanced_entry_does_not_swallow_next() {
        let input = "\n@article{bad, title={Broken}, year={2024}\n@article{ok, title={Good Title}, author={Smith, J.}, journal={J Ok}, year={2024}, doi={10.1234/good}}\n";
        let parse = parse_bibtex(input);
        assert_eq!(parse.records.len(), 1);
        assert_eq!(parse.records[0].doi.as_deref(), Some("10.1234/good"));
        assert!(parse.skipped.iter().any(|m| m.contains("malformed")));
    }

    #[test]
    fn test_parse_bibtex_author_split_handles_and_variants() {
        let input = "@article{k, title={A}, author={Smith, J. AND   Doe, R.\nand Lee, M.}, year={2024}}";
        let parse = parse_bibtex(input);
        assert_eq!(
            parse.records[0].authors,
            vec!["Smith, J.", "Doe, R.", "Lee, M."]
        );
    }

    #[test]
    fn test_parse_bibtex_duplicate_field_first_value_wins() {
        let input = r"@article{k, title={First Title}, title={Second Title}, author={Smith, J.}, year={2024}}";
        let parse = parse_bibtex(input);
        assert_eq!(parse.records[0].title, "First Title");
    }

    #[test]
    fn test_parse_bibtex_pmid_field_numeric_only() {
        let input = r"@article{k, title={A}, author={Smith, J.}, year={2024}, pmid={12345678}}";
        let parse = parse_bibtex(input);
        assert_eq!(parse.records[0].pmid.as_deref(), Some("12345678"));

        let input = r"@article{k, title={A}, author={Smith, J.}, year={2024}, pmid={PMC999}}";
        let parse = parse_bibtex(input);
        assert!(parse.records[0].pmid.is_none());
    }

    #[test]
    fn test_parse_bibtex_empty_input() {
        let parse = parse_bibtex("");
        assert!(parse.records.is_empty());
        assert!(parse.skipped.is_empty());
    }
}
