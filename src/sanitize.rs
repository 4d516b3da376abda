//! Payload and log hygiene.
//!
//! Clinical note text is untrusted free-form input. Before it crosses a
//! service boundary every string is stripped of control characters so no
//! internal protocol characters leak into a downstream request body, and
//! upstream response bodies are redacted before they can reach an error
//! message or a log line.

use serde_json::Value;

/// Maximum length of an upstream body fragment kept in an error message.
pub const REDACTED_MESSAGE_LIMIT: usize = 200;

/// Strip control characters from untrusted text, preserving newlines and tabs.
pub fn clean_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Recursively sanitize every string value in a JSON payload in place.
pub fn sanitize_json(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
                *s = clean_text(s);
            }
        }
        Value::Array(items) => {
            for item in items {
                sanitize_json(item);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                sanitize_json(item);
            }
        }
        _ => {}
    }
}

/// Reduce an upstream body to something safe to carry in an error message:
/// control characters removed, truncated to a fixed limit. Request payloads
/// are never echoed into errors at all, so patient content cannot leak this
/// way.
pub fn redact_for_log(body: &str) -> String {
    let cleaned = clean_text(body);
    if cleaned.len() <= REDACTED_MESSAGE_LIMIT {
        return cleaned;
    }
    let mut cut = REDACTED_MESSAGE_LIMIT;
    while !cleaned.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... [truncated]", &cleaned[..cut])
}
