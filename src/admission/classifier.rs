//! Public/protected path classification.

use std::borrow::Cow;

/// Whether a path may skip identity and rate checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    /// On the allow-list: forwarded without any check
    Public,
    /// Everything else
    Protected,
}

/// Paths that are public only as an exact match.
const PUBLIC_EXACT: &[&str] = &["/", "/favicon.ico", "/login", "/signup"];

/// Directory-like public prefixes, matched on whole path segments.
const PUBLIC_PREFIXES: &[&str] = &[
    "/_next/static",
    "/_next/image",
    "/static",
    "/images",
    "/api/auth/callback",
];

/// Classify a request path. Unknown paths are protected.
pub fn classify(path: &str) -> PathClass {
    let normalized = normalize_path(path);
    let path: &str = &normalized;

    let public = PUBLIC_EXACT.contains(&path)
        || PUBLIC_PREFIXES
            .iter()
            .any(|prefix| has_segment_prefix(path, prefix));

    if public {
        PathClass::Public
    } else {
        PathClass::Protected
    }
}

/// Strip query and fragment, collapse repeated slashes, drop trailing
/// slashes and resolve `.`/`..` segments (including their `%2e` spellings).
/// The root stays `/` and `..` never climbs above it.
pub fn normalize_path(raw: &str) -> Cow<'_, str> {
    let path = raw
        .split(&['?', '#'][..])
        .next()
        .unwrap_or_default();

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match dot_segment(segment) {
            Some(1) => {}
            Some(_) => {
                segments.pop();
            }
            None if segment.is_empty() => {}
            None => segments.push(segment),
        }
    }

    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }

    if normalized == path {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(normalized)
    }
}

/// Number of dots (1 or 2) if `segment` is a dot segment, with `%2e` and
/// `%2E` counted as dots.
fn dot_segment(segment: &str) -> Option<usize> {
    let mut rest = segment;
    let mut dots = 0;
    loop {
        if let Some(tail) = rest.strip_prefix('.') {
            rest = tail;
        } else if rest.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("%2e")) {
            rest = &rest[3..];
        } else {
            break;
        }
        dots += 1;
        if dots > 2 {
            return None;
        }
    }

    (rest.is_empty() && dots > 0).then_some(dots)
}

/// `path` equals `prefix` or continues it with a new segment.
///
/// Both arguments are expected to be normalized.
pub fn has_segment_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
