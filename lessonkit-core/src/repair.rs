//! Recovery of structured payloads from model output.
//!
//! Models often wrap JSON in a fenced code block, sometimes followed by a
//! closing remark. [`repair_and_parse`] keeps only the body of a leading
//! fence and parses it. It never fails: text that does not parse comes back
//! as [`StructuredResponse::Unparsed`] carrying the raw text verbatim. Any
//! valid JSON is accepted; the expected shape only decides how the failure
//! sentinel is rendered.

use serde_json::{json, Value};
use tracing::{debug, warn};

/// Top-level JSON shape a caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    Object,
    Array,
}

impl ExpectedShape {
    fn matches(self, value: &Value) -> bool {
        match self {
            ExpectedShape::Object => value.is_object(),
            ExpectedShape::Array => value.is_array(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StructuredResponse {
    Parsed(Value),
    Unparsed { raw: String },
}

impl StructuredResponse {
    pub fn is_parsed(&self) -> bool {
        matches!(self, StructuredResponse::Parsed(_))
    }

    /// Renders the response as plain JSON. `Unparsed` becomes the
    /// `{"error": "parse failed", "raw": ...}` sentinel, wrapped in an array
    /// when an array was expected.
    pub fn into_json(self, shape: ExpectedShape) -> Value {
        match self {
            StructuredResponse::Parsed(value) => value,
            StructuredResponse::Unparsed { raw } => {
                let sentinel = json!({ "error": "parse failed", "raw": raw });
                match shape {
                    ExpectedShape::Object => sentinel,
                    ExpectedShape::Array => Value::Array(vec![sentinel]),
                }
            }
        }
    }
}

pub fn repair_and_parse(raw: &str, shape: ExpectedShape) -> StructuredResponse {
    let candidate = strip_fence(raw);
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => {
            if !shape.matches(&value) {
                debug!(?shape, "Model output has an unexpected top-level shape");
            }
            StructuredResponse::Parsed(value)
        }
        Err(e) => {
            warn!(error = %e, chars = raw.len(), "Failed to parse model output");
            StructuredResponse::Unparsed {
                raw: raw.to_string(),
            }
        }
    }
}

/// Keeps the body of a leading ``` fence, dropping its optional language tag
/// and anything after the closing fence.
fn strip_fence(raw: &str) -> &str {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // The language tag, if any, runs to the end of the opening line.
    let body = match rest.find('\n') {
        Some(newline) if is_language_tag(rest[..newline].trim()) => &rest[newline + 1..],
        Some(_) => rest,
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn is_language_tag(token: &str) -> bool {
    token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
}
