//! Lenient decoding of JSON carried in model responses.
//!
//! Models wrap JSON in code fences, prefix it with prose, or both. Every
//! caller that expects structured output goes through this one decoder
//! instead of doing its own string surgery.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response contains no JSON value")]
    NoJson,

    #[error("JSON did not match the expected shape: {0}")]
    Shape(String),
}

/// Strip surrounding code-fence markers, if present.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Best-effort extraction of the first JSON object in the text.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode a typed value from a model response: strip fences, then parse
/// the whole text, then fall back to the first balanced JSON object.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, DecodeError> {
    let unfenced = strip_fences(raw);

    if let Ok(value) = serde_json::from_str::<T>(unfenced) {
        return Ok(value);
    }

    let candidate = extract_object(unfenced).ok_or(DecodeError::NoJson)?;
    serde_json::from_str::<T>(candidate).map_err(|e| DecodeError::Shape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        name: String,
        count: u32,
    }

    #[test]
    fn decodes_bare_json() {
        let probe: Probe = decode(r#"{"name": "a", "count": 2}"#).expect("decode");
        assert_eq!(probe.count, 2);
    }

    #[test]
    fn strips_code_fences_with_language_tag() {
        let raw = "```json\n{\"name\": \"a\", \"count\": 2}\n```";
        let probe: Probe = decode(raw).expect("decode");
        assert_eq!(probe.name, "a");
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let raw = "Sure! Here is the plan:\n{\"name\": \"b\", \"count\": 7}\nHope that helps.";
        let probe: Probe = decode(raw).expect("decode");
        assert_eq!(probe.count, 7);
    }

    #[test]
    fn nested_braces_in_strings_do_not_break_extraction() {
        let raw = r#"note {"name": "br{ace}", "count": 1} end"#;
        let probe: Probe = decode(raw).expect("decode");
        assert_eq!(probe.name, "br{ace}");
    }

    #[test]
    fn prose_without_json_is_no_json() {
        let err = decode::<Probe>("I cannot answer that.").expect_err("should fail");
        assert!(matches!(err, DecodeError::NoJson));
    }

    #[test]
    fn wrong_shape_is_reported() {
        let err = decode::<Probe>(r#"{"name": "a"}"#).expect_err("should fail");
        assert!(matches!(err, DecodeError::Shape(_)));
    }
}
