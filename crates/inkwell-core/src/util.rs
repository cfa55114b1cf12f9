//! Small helpers shared by the config, remote, and CLI layers.

/// Trim optional text, treating blank values as absent.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// First line of `text` with whitespace collapsed, cut to `max_chars`.
///
/// Truncated output ends in `...` and still fits within `max_chars`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text
        .lines()
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut truncated = collapsed
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect::<String>();
    truncated.push_str("...");
    truncated
}

/// Current Unix timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_absent() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(" \t ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" https://api.example.com ".to_string())),
            Some("https://api.example.com".to_string())
        );
    }

    #[test]
    fn only_http_schemes_are_urls() {
        assert!(is_http_url("http://localhost:8080"));
        assert!(is_http_url("https://api.example.com"));
        assert!(!is_http_url("ftp://api.example.com"));
        assert!(!is_http_url("api.example.com"));
    }

    #[test]
    fn excerpt_keeps_first_line() {
        assert_eq!(excerpt("  It   was a dark\nand stormy night", 40), "It was a dark");
        assert_eq!(excerpt("", 10), "");
    }

    #[test]
    fn excerpt_truncates_with_ellipsis() {
        let cut = excerpt("The chapter opens on a quiet harbour town", 20);
        assert_eq!(cut, "The chapter opens...");
        assert_eq!(cut.chars().count(), 20);
    }
}
