// ABOUTME: Utility functions for slugging, truncation, and timestamps
// ABOUTME: Provides consistent filename generation and log previews

use chrono::{DateTime, NaiveDateTime, Utc};

const MAX_SLUG_LEN: usize = 50;

pub fn slugify(text: &str) -> String {
    slug::slugify(text)
}

/// Filename-safe title, capped at 50 characters.
pub fn sanitize_title(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        return "untitled".into();
    }
    // slugify output is ASCII, so byte slicing is safe
    slug[..slug.len().min(MAX_SLUG_LEN)]
        .trim_end_matches('-')
        .to_string()
}

pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        return s.to_string();
    }

    // Find a valid UTF-8 boundary at or before max_chars
    let mut boundary = max_chars;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    if boundary == 0 {
        return String::new();
    }

    format!("{}...", &s[..boundary])
}

/// Parse an API timestamp into UTC. Accepts any RFC 3339 offset; a value
/// without an offset is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}


#[cfg(test)]
mod truncate_tests {
    use super::*;

    #[test]
    fn test_truncate_str_short() {
        assert_eq!(truncate_str("hello", 100), "hello");
    }

    #[test]
    fn test_truncate_str_long() {
        let result = truncate_str("hello world", 7);
        assert!(result.starts_with("hello"));
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_str_utf8() {
        // Multi-byte characters must not cause a panic
        let text = "Tagebuch äöü 日記 entry";
        let result = truncate_str(text, 14);
        assert!(!result.is_empty());
        assert!(result.len() <= 17);
    }
}
