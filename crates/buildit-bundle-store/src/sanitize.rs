//! Path-segment sanitization for bundle storage keys. Slugs and versions come from
//! user-controlled job definitions and must never be used to build a storage path verbatim.

use regex::Regex;
use std::sync::LazyLock;

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9._-]+").unwrap());
static REPEAT_DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());
static EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\.[a-zA-Z0-9]{1,10}$").unwrap());

/// Sanitize a slug or version into a single safe path segment. Falls back to
/// `fallback` if nothing safe survives (e.g. an all-symbol version string).
pub fn sanitize_segment(raw: &str, fallback: &str) -> String {
    let lowered = raw.to_lowercase();
    let replaced = UNSAFE_CHARS.replace_all(&lowered, "-");
    let collapsed = REPEAT_DASH.replace_all(&replaced, "-");
    let trimmed = collapsed.trim_matches(|c: char| c == '-' || c == '.');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sanitize a client-supplied filename, preserving a short alphanumeric extension
/// and falling back to `.bin` for anything else (no extension, or an unsafe one).
pub fn sanitize_filename(original: &str) -> String {
    let (stem, ext) = match original.rfind('.') {
        Some(idx) if idx > 0 => (&original[..idx], &original[idx..]),
        _ => (original, ""),
    };
    let stem = sanitize_segment(stem, "bundle");
    let ext = if EXTENSION.is_match(ext) {
        ext.to_lowercase()
    } else {
        ".bin".to_string()
    };
    format!("{stem}{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_slug_segment() {
        assert_eq!(sanitize_segment("My Job!!", "bundle"), "my-job");
        assert_eq!(sanitize_segment("1.2.3", "v"), "1.2.3");
    }

    #[test]
    fn falls_back_when_nothing_survives() {
        assert_eq!(sanitize_segment("///", "bundle"), "bundle");
        assert_eq!(sanitize_segment("...", "v"), "v");
    }

    #[test]
    fn collapses_repeated_dashes() {
        assert_eq!(sanitize_segment("a   b", "bundle"), "a-b");
    }

    #[test]
    fn preserves_safe_extension() {
        assert_eq!(sanitize_filename("My Bundle.TAR.GZ"), "my-bundle.tar.gz");
        assert_eq!(sanitize_filename("payload.js"), "payload.js");
    }

    #[test]
    fn falls_back_to_bin_extension() {
        assert_eq!(sanitize_filename("payload"), "payload.bin");
        assert_eq!(sanitize_filename("payload.reallylongext"), "payload.bin");
    }
}
