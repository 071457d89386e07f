//! Utility functions.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Works on character boundaries, so multi-byte UTF-8 input never panics.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Strip a trailing slash from a base URL so paths can be appended.
pub fn trim_base_url(url: &str) -> &str {
    url.trim_end_matches('/')
}
