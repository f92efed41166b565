use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<.*?>").unwrap());
static OPEN_OR_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/?)([a-z][a-z0-9]*)\b[^>]*>").unwrap());
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)([a-z_:][a-z0-9_:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// Slice out the full element (`<tag id=…>` through its matching close tag)
/// whose `id` attribute equals `id`. Either quote style is accepted and nested
/// elements of the same tag are balanced.
pub fn element_by_id<'a>(html: &'a str, tag: &str, id: &str) -> Option<&'a str> {
    let start = find_open_tag(html, tag, id)?;
    let mut depth = 0usize;
    for caps in OPEN_OR_CLOSE_RE.captures_iter(&html[start..]) {
        if !caps[2].eq_ignore_ascii_case(tag) {
            continue;
        }
        let m = caps.get(0)?;
        if caps[1].is_empty() {
            depth += 1;
        } else {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(&html[start..start + m.end()]);
            }
        }
    }
    None
}

fn find_open_tag(html: &str, tag: &str, id: &str) -> Option<usize> {
    OPEN_OR_CLOSE_RE
        .captures_iter(html)
        .filter(|caps| caps[1].is_empty() && caps[2].eq_ignore_ascii_case(tag))
        .filter_map(|caps| caps.get(0))
        .find(|m| attr(m.as_str(), "id") == Some(id))
        .map(|m| m.start())
}

/// Everything between the end of the opening tag and the start of the last
/// closing tag. Nested markup is kept.
pub fn inner(element: &str) -> &str {
    match (element.find('>'), element.rfind('<')) {
        (Some(open_end), Some(close_start)) if close_start > open_end => {
            &element[open_end + 1..close_start]
        }
        _ => "",
    }
}

/// Drop every tag and collapse the remaining text to single-spaced, trimmed form.
pub fn text_of(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Value of `attr` on the first tag in `fragment`.
pub fn attr<'a>(fragment: &'a str, attr: &str) -> Option<&'a str> {
    let open_end = fragment.find('>').unwrap_or(fragment.len());
    ATTR_RE
        .captures_iter(&fragment[..open_end])
        .find(|caps| caps[1].eq_ignore_ascii_case(attr))
        .and_then(|caps| caps.get(2).or_else(|| caps.get(3)))
        .map(|m| m.as_str())
}

// ── Tests ──
