//! Verdict normalization.
//!
//! The analyzer is asked for a JSON object but nothing guarantees it sends
//! one. [`normalize`] turns whatever text came back into a well-formed
//! [`Verdict`], falling back to keyword inference when the text is not a
//! JSON object. It never fails.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured result of one schema comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_breaking: bool,
    pub summary: String,
    pub changes: Vec<String>,
}

/// Which path produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// The analyzer returned a JSON object
    Parsed,
    /// The analyzer returned something else; the verdict was inferred
    Fallback,
}

/// Normalize raw analyzer text into a verdict.
pub fn normalize(raw_text: &str) -> Verdict {
    normalize_with_path(raw_text).0
}

/// Normalize raw analyzer text, also reporting which path was taken.
pub fn normalize_with_path(raw_text: &str) -> (Verdict, Normalization) {
    match serde_json::from_str::<Value>(&strip_code_fences(raw_text)) {
        Ok(Value::Object(fields)) => (from_fields(&fields), Normalization::Parsed),
        _ => (infer_from_text(raw_text), Normalization::Fallback),
    }
}

/// Remove markdown code-fence markup around a JSON payload.
fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Read verdict fields, defaulting anything missing or wrongly typed.
fn from_fields(fields: &Map<String, Value>) -> Verdict {
    let is_breaking = fields
        .get("is_breaking")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let summary = fields
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let changes = match fields.get("changes") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    };

    Verdict {
        is_breaking,
        summary,
        changes,
    }
}

fn infer_from_text(raw_text: &str) -> Verdict {
    Verdict {
        is_breaking: raw_text.to_lowercase().contains("breaking"),
        summary: raw_text.to_string(),
        changes: Vec::new(),
    }
}
