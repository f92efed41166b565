use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::html;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<.*?>").unwrap());
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n+").unwrap());
static WELL_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"well_id=([0-9]+)").unwrap());

/// Locate the report panel (`<div id="pro_{well_id}">`) for one well.
pub fn panel_fragment<'a>(page: &'a str, well_id: &str) -> Option<&'a str> {
    html::element_by_id(page, "div", &format!("pro_{}", well_id))
}

/// Numeric `well_id` query parameter of a well-report link.
pub fn well_id_from_link(link: &str) -> Option<String> {
    let query = link.rsplit(".php?").next()?;
    WELL_ID_RE
        .captures(query)
        .map(|c| c[1].to_string())
}

/// Reduce a markup fragment to its text tokens: whitespace deleted, every tag
/// turned into a separator, separators collapsed. Empty tokens are dropped.
pub fn flatten(fragment: &str) -> Vec<String> {
    let dense = WHITESPACE_RE.replace_all(fragment, "");
    let untagged = TAG_RE.replace_all(&dense, "\n");
    SEPARATOR_RE
        .split(&untagged)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Raw page bytes → token stream for one well. Never fails: an undecodable
/// page or an absent panel yields no tokens.
pub fn flatten_page(page: &[u8], well_id: &str) -> Vec<String> {
    let text = match std::str::from_utf8(page) {
        Ok(t) => t,
        Err(e) => {
            warn!(well_id, error = %e, "Report page is not valid UTF-8, skipping");
            return Vec::new();
        }
    };
    match panel_fragment(text, well_id) {
        Some(fragment) => flatten(fragment),
        None => Vec::new(),
    }
}

// ── Tests ──
