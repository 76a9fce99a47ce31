//! Response parsing: strip formatting fences and decode the JSON payload.
//!
//! Even well-prompted VLMs routinely wrap their JSON in markdown fences
//! despite being told not to. The extraction rule, in priority order:
//!
//! 1. a ```` ```json ```` fence exists → the content strictly between the
//!    first such fence pair;
//! 2. any fence exists → the content between the first generic fence pair,
//!    tolerating a language tag on the opening line;
//! 3. no fence → the raw text verbatim.
//!
//! This module is purely syntactic: no semantic validation happens here.
//! The decoded [`serde_json::Value`] is untrusted and must not travel past
//! the schema validator.

use crate::error::ChartError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// How much of the offending text a parse error carries for diagnostics.
const SNIPPET_CHARS: usize = 200;

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)```").unwrap());

static RE_ANY_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());

static RE_LANGUAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_+-]*$").unwrap());

/// Decode raw model output into a generic JSON value.
///
/// Failure carries the first ~200 characters of the text that failed to
/// decode.
pub fn parse_response(raw: &str) -> Result<Value, ChartError> {
    let payload = extract_payload(raw);
    let payload = payload.trim();

    serde_json::from_str(payload).map_err(|e| ChartError::ParseFailed {
        detail: e.to_string(),
        snippet: snippet(payload),
    })
}

/// Apply the fence-extraction rule, returning the candidate JSON text.
fn extract_payload(raw: &str) -> &str {
    if let Some(caps) = RE_JSON_FENCE.captures(raw) {
        return caps.get(1).map_or("", |m| m.as_str());
    }

    if let Some(caps) = RE_ANY_FENCE.captures(raw) {
        let inner = caps.get(1).map_or("", |m| m.as_str());
        return strip_language_tag(inner);
    }

    raw
}

/// Drop a language tag (`python`, `jsonc`, …) from the opening fence line.
fn strip_language_tag(inner: &str) -> &str {
    if let Some((first_line, rest)) = inner.split_once('\n') {
        if RE_LANGUAGE_TAG.is_match(first_line.trim_end()) {
            return rest;
        }
    }
    inner
}

/// First ~200 characters of `text`, char-boundary safe, with an ellipsis
/// marker when truncated.
pub fn snippet(text: &str) -> String {
    let mut head: String = text.chars().take(SNIPPET_CHARS).collect();
    if text.chars().nth(SNIPPET_CHARS).is_some() {
        head.push('…');
    }
    head
}
