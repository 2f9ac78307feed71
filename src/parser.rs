//! Reasoning output parser with deterministic fallback.
//!
//! The backend is told to emit a JSON object but frequently wraps it in prose
//! or code fences. The outermost `{ ... }` span is decoded strictly; when that
//! fails the raw text itself becomes the solution.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::schema::Difficulty;

/// Confidence reported when the backend answered but not in JSON.
pub const UNSTRUCTURED_CONFIDENCE: f64 = 0.7;

pub const FALLBACK_FINAL_ANSWER: &str = "See solution steps";

/// Typed view of a reasoning response.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredFields {
    pub problem_type: String,
    pub difficulty: Difficulty,
    pub solution_steps: Vec<String>,
    pub final_answer: String,
    pub explanation: String,
    pub verification: String,
    /// Study tips followed by any exam tips.
    pub study_tips: Vec<String>,
    pub related_concepts: Vec<String>,
    /// Backend-reported confidence, clamped to [0, 1].
    pub confidence: Option<f64>,
    /// Problem statement as read by a vision-capable backend.
    pub extracted_problem: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub fields: StructuredFields,
    /// False when the fallback path produced `fields`.
    pub structured: bool,
}

/// Parse raw reasoning output. Never fails.
pub fn parse(raw: &str) -> ParsedResponse {
    match extract_object(raw) {
        Some(object) => {
            debug!("Parsed structured reasoning response ({} keys)", object.len());
            ParsedResponse {
                fields: coerce(&object),
                structured: true,
            }
        }
        None => {
            warn!(
                "Reasoning output is not valid JSON, using raw text ({} chars)",
                raw.len()
            );
            ParsedResponse {
                fields: fallback(raw),
                structured: false,
            }
        }
    }
}

/// Strict-decode the span from the first `{` to the last `}`.
fn extract_object(raw: &str) -> Option<Map<String, Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }

    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            debug!("JSON decode failed: {}", e);
            None
        }
    }
}

fn fallback(raw: &str) -> StructuredFields {
    StructuredFields {
        problem_type: "general".to_string(),
        difficulty: Difficulty::default(),
        solution_steps: vec![raw.to_string()],
        final_answer: FALLBACK_FINAL_ANSWER.to_string(),
        explanation: raw.to_string(),
        verification: "Please verify the solution manually".to_string(),
        study_tips: vec!["Review the complete solution provided".to_string()],
        related_concepts: Vec::new(),
        confidence: Some(UNSTRUCTURED_CONFIDENCE),
        extracted_problem: None,
    }
}

fn coerce(object: &Map<String, Value>) -> StructuredFields {
    let mut study_tips = string_list(object.get("study_tips"));
    study_tips.extend(string_list(object.get("exam_tips")));

    StructuredFields {
        problem_type: string(object.get("problem_type")).unwrap_or_else(|| "unknown".to_string()),
        difficulty: string(object.get("difficulty"))
            .map(|d| Difficulty::from_label(&d))
            .unwrap_or_default(),
        solution_steps: string_list(object.get("solution_steps")),
        final_answer: string(object.get("final_answer")).unwrap_or_default(),
        explanation: string(object.get("explanation")).unwrap_or_default(),
        verification: string(object.get("verification")).unwrap_or_default(),
        study_tips,
        related_concepts: string_list(object.get("related_concepts")),
        confidence: number(object.get("confidence")).map(|c| c.clamp(0.0, 1.0)),
        extracted_problem: string(object.get("extracted_problem")).filter(|p| !p.is_empty()),
    }
}

/// Scalars become strings; null, arrays and objects are absent.
fn string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Arrays keep their scalar items; a lone scalar becomes a one-item list.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| string(Some(v))).collect(),
        Some(other) => string(Some(other)).into_iter().collect(),
        None => Vec::new(),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}
