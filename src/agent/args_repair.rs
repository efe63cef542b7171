//! Repair ladder for malformed tool-call arguments.
//!
//! Models (DeepSeek in particular) routinely emit arguments that are
//! almost-JSON: trailing commas, single quotes, fenced code blocks, prose
//! around the object.  Each rung of the ladder is tried in order; when
//! everything fails the caller substitutes `{}` and lets the executor
//! report its own missing-argument error.

use serde_json::{Map, Value};

/// Parse `raw` into an arguments object, repairing common damage.
/// Returns `None` only when no rung produced valid JSON.
pub fn repair_arguments(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Value::Object(Map::new()));
    }

    // As-is.
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    // Trailing commas before `}` / `]`, then single→double quotes when the
    // text contains no double quotes at all.
    if let Ok(re) = regex::Regex::new(r",\s*([}\]])") {
        let mut fixed = re.replace_all(trimmed, "$1").into_owned();
        if fixed.contains('\'') && !fixed.contains('"') {
            fixed = fixed.replace('\'', "\"");
        }
        if let Ok(value) = serde_json::from_str::<Value>(&fixed) {
            return Some(value);
        }
    }

    // Fenced code block.
    if let Ok(re) = regex::Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```") {
        if let Some(caps) = re.captures(trimmed) {
            if let Ok(value) = serde_json::from_str::<Value>(&caps[1]) {
                return Some(value);
            }
        }
    }

    // Substring from the first `{` to the last `}`.
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Some(value);
            }
        }
    }

    // Last resort: scrape `key: value` pairs into a string-valued object.
    if let Ok(re) = regex::Regex::new(r#"["']?(\w+)["']?\s*:\s*["']([^"']+)["']"#) {
        let mut map = Map::new();
        for caps in re.captures_iter(trimmed) {
            map.insert(caps[1].to_owned(), Value::String(caps[2].to_owned()));
        }
        if !map.is_empty() {
            return Some(Value::Object(map));
        }
    }

    None
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_json_passes_through() {
        let value = repair_arguments(r#"{"path": "a.txt"}"#).unwrap();
        assert_eq!(value, json!({"path": "a.txt"}));
    }

    #[test]
    fn empty_input_is_empty_object() {
        assert_eq!(repair_arguments("").unwrap(), json!({}));
        assert_eq!(repair_arguments("   ").unwrap(), json!({}));
    }

    #[test]
    fn trailing_comma_and_single_quotes_are_fixed() {
        // The scenario from DeepSeek-style emitters.
        let value = repair_arguments("{'path': 'a.txt',}").unwrap();
        assert_eq!(value, json!({"path": "a.txt"}));
    }

    #[test]
    fn trailing_comma_alone_is_fixed() {
        let value = repair_arguments(r#"{"a": 1, "b": [1, 2,],}"#).unwrap();
        assert_eq!(value, json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn single_quotes_preserved_when_doubles_present() {
        // Apostrophes inside a valid double-quoted string must survive.
        let value = repair_arguments(r#"{"text": "it's fine"}"#).unwrap();
        assert_eq!(value, json!({"text": "it's fine"}));
    }

    #[test]
    fn fenced_block_is_extracted() {
        let raw = "Here are the args:\n```json\n{\"query\": \"rust\"}\n```";
        let value = repair_arguments(raw).unwrap();
        assert_eq!(value, json!({"query": "rust"}));
    }

    #[test]
    fn brace_substring_is_extracted() {
        let raw = r#"I'll call it with {"limit": 5} as requested."#;
        let value = repair_arguments(raw).unwrap();
        assert_eq!(value, json!({"limit": 5}));
    }

    #[test]
    fn key_value_scrape_as_last_resort() {
        let value = repair_arguments(r#"path: "a.txt" content: "hello""#).unwrap();
        assert_eq!(value, json!({"path": "a.txt", "content": "hello"}));
    }

    #[test]
    fn hopeless_input_is_none() {
        assert!(repair_arguments("complete garbage with no structure").is_none());
    }
}
