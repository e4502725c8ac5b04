//! Locating the references region inside raw document text.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::{SECTION_DENSITY_MIN_DOIS, SECTION_DENSITY_TAIL_FRACTION};

/// Recognized section headers, compared after trim/lowercase/whitespace
/// collapse. A trailing `:` on the document line is also accepted.
pub const SECTION_HEADERS: &[&str] = &[
    "references",
    "bibliography",
    "works cited",
    "reference list",
    "literature cited",
    "cited works",
    "références",
    "bibliographie",
    "literaturverzeichnis",
    "referencias",
    "bibliografía",
    "参考文献",
    "文献",
];

/// Bare DOI pattern used by the density fallback (and the parsing passes).
#[allow(clippy::expect_used)]
pub(crate) static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"10\.\d{4,9}(?:\.\d+)*/[^\s<>"'\]]+"#).expect("DOI regex is valid") // Static pattern, safe to panic
});

/// Locates the references region of a document.
///
/// Scans line-by-line for a header line that, after normalization, exactly
/// equals one of [`SECTION_HEADERS`]; everything after that line is the
/// section. When no header is found, falls back to a density heuristic: the
/// last 30% of the document's lines are treated as the references region if
/// they contain at least 3 DOI-pattern matches.
///
/// Returns `None` when neither strategy fires — a normal "no references
/// detected" outcome, not an error.
#[tracing::instrument(skip(text), fields(input_len = text.len()))]
#[must_use]
pub fn find_references_section(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        if is_section_header(line) {
            debug!(line_number = idx + 1, "References header matched");
            return Some(lines[idx + 1..].join("\n"));
        }
    }

    // Density fallback: a DOI-rich tail is almost certainly a reference
    // list even without a recognizable heading.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let tail_start = (lines.len() as f64 * (1.0 - SECTION_DENSITY_TAIL_FRACTION)).floor() as usize;
    let tail = lines[tail_start.min(lines.len())..].join("\n");
    let doi_count = DOI_PATTERN.find_iter(&tail).count();

    if doi_count >= SECTION_DENSITY_MIN_DOIS {
        debug!(doi_count, tail_start, "Density fallback matched document tail");
        return Some(tail);
    }

    debug!(doi_count, "No references section detected");
    None
}

/// Returns true when a document line is a recognized section heading.
fn is_section_header(line: &str) -> bool {
    let normalized = line
        .trim()
        .trim_end_matches(':')
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    SECTION_HEADERS.contains(&normalized.as_str())
}
