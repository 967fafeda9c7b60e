//! Utility functions for names, URLs and lenient number parsing

use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;

/// Maximum length (in characters) of a sanitized path component
pub const MAX_FILENAME_LEN: usize = 200;

/// Characters that are not allowed in file names on common filesystems
const ILLEGAL_FILENAME_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

#[allow(clippy::expect_used)]
static NUMBERED_PARENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\d[^)]*\)").expect("valid regex"));

#[allow(clippy::expect_used)]
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Make `text` safe to use as a single path component
///
/// Trims surrounding whitespace, replaces every character illegal in file
/// names with `_` and truncates to [`MAX_FILENAME_LEN`] characters.
pub fn sanitize_filename(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| if ILLEGAL_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .take(MAX_FILENAME_LEN)
        .collect()
}

/// Turn a page path from the API into an absolute image URL
///
/// - absolute `http(s)` URLs pass through unchanged
/// - protocol-relative paths (`//cdn/x.jpg`) get the scheme of `image_host`
/// - anything else is joined to `image_host` with exactly one slash
///
/// Returns `None` for an empty path.
pub fn build_image_url(path: &str, image_host: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    if path.starts_with("http://") || path.starts_with("https://") {
        return Some(path.to_string());
    }

    if path.starts_with("//") {
        let scheme = url::Url::parse(image_host)
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "https".to_string());
        return Some(format!("{}:{}", scheme, path));
    }

    let host = image_host.trim_end_matches('/');
    if path.starts_with('/') {
        Some(format!("{}{}", host, path))
    } else {
        Some(format!("{}/{}", host, path))
    }
}

/// Strip numbering noise from a chapter title
///
/// Parenthesised segments containing a digit are dropped first, then any
/// remaining digit runs.
pub fn clean_chapter_name(name: &str) -> String {
    let without_parens = NUMBERED_PARENS.replace_all(name, "");
    let without_digits = DIGITS.replace_all(without_parens.trim(), "");
    without_digits.trim().to_string()
}

/// Parse a chapter number, accepting comma as decimal separator
///
/// Never fails: anything unparsable (or non-finite) yields `None`.
pub fn parse_chapter_number(text: &str) -> Option<f64> {
    let text = text.trim();
    text.parse::<f64>()
        .ok()
        .or_else(|| text.replace(',', ".").parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Chapter number held by a JSON value (number or numeric string)
pub fn chapter_number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) => parse_chapter_number(s),
        _ => None,
    }
}

/// Volume held by a JSON value
///
/// Integer numbers and integer strings are accepted; fractional numbers are
/// truncated toward zero. Everything else yields `None`.
pub fn volume_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Render a JSON scalar as plain text (strings unquoted)
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// File name for the page at 1-based `index`, keeping the URL's extension
pub fn page_file_name(index: usize, image_url: &str) -> String {
    let extension = url::Url::parse(image_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .and_then(|segment| {
            Path::new(&segment)
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
        })
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "jpg".to_string());

    format!("{:03}.{}", index, extension)
}

/// Current UNIX timestamp in seconds
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
