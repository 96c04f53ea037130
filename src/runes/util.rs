use chrono::Local;
use std::env;

/// Date format embedded in assistant-start markers.
pub const MARKER_DATE_FORMAT: &str = "%d/%m/%y";

pub fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

pub fn today_stamp() -> String {
    Local::now().format(MARKER_DATE_FORMAT).to_string()
}

/// Truncate `input` to at most `max_chars` Unicode characters, appending `…`
/// when truncated.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    if input.chars().count() > max_chars {
        let mut s: String = input.chars().take(max_chars).collect();
        s.push('…');
        s
    } else {
        input.to_string()
    }
}
