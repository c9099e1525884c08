//! Utility functions and helpers.

pub mod http;

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(|u| u.to_string())
}

/// Last path segment of a URL, used as a fallback display name.
pub fn last_path_segment(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())?;
    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}

/// Lowercase extension of a URL path, including the leading dot.
pub fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path();
    let idx = path.rfind('.')?;
    // Dot inside a directory segment is not an extension
    if path[idx..].contains('/') {
        return None;
    }
    Some(path[idx..].to_lowercase())
}

/// Strip characters that are unsafe in filenames.
pub fn sanitize_filename(name: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());
    pattern.replace_all(name, "").to_string()
}
