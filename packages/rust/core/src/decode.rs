//! Best-effort structured decode of free-form model output.
//!
//! Models wrap JSON in prose, fence it in code blocks, use single quotes and
//! leave trailing commas. [`parse_llm_json`] repairs the common cases and
//! returns `None` for everything else. It never fails loudly.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Extract and parse the JSON object or array embedded in `output`.
///
/// Ladder:
/// 1. A fenced ```` ```json ```` block, else the outermost `{..}` / `[..]` span
/// 2. Single-quoted keys → double-quoted, trailing commas removed
/// 3. Strict parse, then a second parse with every `'` replaced by `"`
pub fn parse_llm_json(output: &str) -> Option<Value> {
    let candidate = locate_json(output)?;
    let repaired = repair(candidate);

    serde_json::from_str(&repaired)
        .or_else(|_| serde_json::from_str(&repaired.replace('\'', "\"")))
        .ok()
}

/// Like [`parse_llm_json`] but only accepts a JSON object.
pub fn parse_llm_object(output: &str) -> Option<serde_json::Map<String, Value>> {
    match parse_llm_json(output)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Lenient field readers
// ---------------------------------------------------------------------------

/// Read a number that may be encoded as an integer, a float or a numeric
/// string (`"20"`, `"20.5"`, `"$20M"` is rejected).
pub fn lenient_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Read a boolean that may be encoded as `true`/`false` or as the strings
/// `"true"`/`"false"`/`"yes"`/`"no"`.
pub fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Non-blank string field, trimmed.
pub fn non_blank_str<'a>(map: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Ladder steps
// ---------------------------------------------------------------------------

fn locate_json(output: &str) -> Option<&str> {
    static FENCED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```json\s*(\{.*\}|\[.*\])\s*```").expect("valid regex")
    });

    if let Some(caps) = FENCED_RE.captures(output) {
        return caps.get(1).map(|m| m.as_str());
    }

    // First opener that has a matching closer somewhere after it, spanning
    // to the last such closer.
    for (start, ch) in output.char_indices() {
        let closer = match ch {
            '{' => '}',
            '[' => ']',
            _ => continue,
        };
        if let Some(end) = output.rfind(closer).filter(|&end| end > start) {
            return Some(&output[start..=end]);
        }
    }
    None
}

fn repair(json: &str) -> String {
    static SINGLE_QUOTED_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"([{\[,])\s*'([A-Za-z_][A-Za-z0-9_]*)'\s*:").expect("valid regex")
    });
    static TRAILING_COMMA_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

    let keys_fixed = SINGLE_QUOTED_KEY_RE.replace_all(json, "$1\"$2\":");
    TRAILING_COMMA_RE.replace_all(&keys_fixed, "$1").into_owned()
}
