//! Utility functions for Cosmic Watch.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Works on character boundaries, so emoji and other multi-byte text are safe.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Redact credentials that end up in URLs or error bodies before logging.
pub fn sanitize_for_log(s: &str) -> String {
    let patterns: &[(&str, &str)] = &[
        (r"(?i)(api_key=)[^&\s]+", "${1}***REDACTED***"),
        (r"bot\d+:[A-Za-z0-9_-]+", "bot***REDACTED***"),
        (r"(?i)(token|secret)\s*[=:]\s*\S{10,}", "$1=***REDACTED***"),
    ];

    let mut result = s.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, *replacement).to_string();
        }
    }
    result
}
