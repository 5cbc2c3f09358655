//! Channel handle normalization.
//!
//! Accepts the forms people paste into config: `name`, `@name`,
//! `t.me/name`, `https://t.me/name` and `https://t.me/s/name`.

use newsdigest_shared::{NewsDigestError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Public username rules: letter first, then letters, digits or `_`, 5..=32 chars.
static HANDLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]{4,31}$").expect("handle regex")
});

const LINK_PREFIXES: &[&str] = &[
    "https://t.me/",
    "http://t.me/",
    "https://telegram.me/",
    "http://telegram.me/",
    "t.me/",
];

/// Normalize a raw channel reference to a bare handle.
pub fn normalize_handle(raw: &str) -> Result<String> {
    let mut handle = raw.trim();

    for prefix in LINK_PREFIXES {
        if let Some(rest) = handle.strip_prefix(prefix) {
            handle = rest;
            break;
        }
    }
    handle = handle.strip_prefix("s/").unwrap_or(handle);
    handle = handle.strip_prefix('@').unwrap_or(handle);

    // Drop a trailing slash, query, or message id: `name/123?single`
    let handle = handle
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();

    if !HANDLE_RE.is_match(handle) {
        return Err(NewsDigestError::validation(format!(
            "invalid channel handle: {raw:?}"
        )));
    }
    Ok(handle.to_string())
}
