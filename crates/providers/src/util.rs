//! Lenient JSON traversal helpers.
//!
//! Provider payloads are inconsistent about number-vs-string fields; these
//! accept either form.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static EM_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?em[^>]*>").unwrap());

#[inline]
pub fn json_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

#[inline]
pub fn json_f64(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(|v| {
        if let Some(n) = v.as_f64() {
            Some(n)
        } else {
            v.as_str().and_then(|s| s.parse().ok())
        }
    })
}

#[inline]
pub fn json_u64(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(|v| {
        if let Some(n) = v.as_u64() {
            Some(n)
        } else {
            v.as_str().and_then(|s| s.parse().ok())
        }
    })
}

/// Strip search-result highlight markup (`<em>...</em>`) from a title.
pub fn strip_em_tags(title: &str) -> String {
    EM_TAGS.replace_all(title, "").into_owned()
}

/// Parse a 24-bit RGB hex string ("ffffff", "#ffffff"), defaulting to white.
pub fn parse_rgb(hex_str: &str) -> u32 {
    let trimmed = hex_str.trim_start_matches('#');
    u32::from_str_radix(trimmed, 16).unwrap_or(0xFFFFFF) & 0xFF_FFFF
}

/// Parse a clock-style duration ("44:00", "01:23:45") into seconds.
pub fn parse_clock_duration(clock: &str) -> Option<f64> {
    let parts: Vec<&str> = clock.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut seconds = 0.0;
    for part in &parts {
        seconds = seconds * 60.0 + part.trim().parse::<f64>().ok()?;
    }
    Some(seconds)
}
