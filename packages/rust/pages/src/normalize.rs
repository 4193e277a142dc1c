//! Text normalization passes applied while buffering and emitting pages.

use std::sync::LazyLock;

use regex::Regex;

/// Collapse every whitespace run (including NBSP) to one space and trim.
pub(crate) fn collapse_inline(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join text fragments with `sep` after trimming, dropping empty ones.
pub(crate) fn join_trimmed(segments: &[String], sep: &str) -> String {
    segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Normalize a page's buffered text.
///
/// NBSP → space, runs of spaces/tabs → one space, 3+ newlines → 2, trim.
pub(crate) fn normalize_page_text(s: &str) -> String {
    static SPACE_RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
    static NEWLINE_RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let s = s.replace('\u{00a0}', " ");
    let s = SPACE_RUN_RE.replace_all(&s, " ");
    let s = NEWLINE_RUN_RE.replace_all(&s, "\n\n");
    s.trim().to_string()
}

/// Deduplicate while keeping the first occurrence of each item.
pub(crate) fn dedup_keep_order(items: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}
