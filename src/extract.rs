//! JSON recovery from free-text model output.
//! Gemini is asked for strict JSON but still wraps answers in markdown
//! fences or chatty prefixes often enough that we can't rely on it.
//! Extraction is an ordered chain of strategies tried in sequence:
//! direct parse of the raw text, then direct parse and
//! first-`{`-to-last-`}` slice of the fence-stripped text.

use serde_json::Value;

/// Strategies in precedence order. Each returns `None` on failure so the
/// chain falls through to the next.
const STRATEGIES: &[fn(&str) -> Option<Value>] = &[parse_direct, parse_brace_slice];

/// Recovers a JSON object from raw model text, or `None` if no strategy
/// succeeds. Text that already parses as-is is taken verbatim; the fence
/// strip only runs afterwards, so backticks inside valid JSON string
/// values survive.
pub fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Some(value) = parse_direct(trimmed) {
        return Some(value);
    }
    let text = strip_code_fence(trimmed);
    STRATEGIES.iter().find_map(|strategy| strategy(text))
}

/// Removes a wrapping markdown code fence (``` or ```json) if the text is
/// enclosed in one. Text without a fence passes through untouched.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[open + 3..];
    // Skip the language tag on the opening fence line, e.g. "json".
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    match body.rfind("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

fn parse_direct(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

fn parse_brace_slice(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
