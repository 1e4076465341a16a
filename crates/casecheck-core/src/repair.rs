//! Parsing and repair of analysis backend responses.
//!
//! Backends are generative and drift from the requested format. Before a
//! response is deserialized:
//!
//! 1. The JSON object is cut out of surrounding prose or markdown fences
//!    (first `{` through last `}`).
//! 2. Every `location.currentValue` that is an array is flattened to a
//!    comma-joined string; other non-string scalars are stringified.
//!    A top-level shape the repair does not recognize is left unchanged.
//! 3. Issues are deserialized one by one. An entry that does not fit the
//!    issue shape is dropped with a warning instead of discarding the
//!    whole response.
//!
//! Empty or unparseable text yields `None`; callers treat that as a
//! zero-issue result.

use serde_json::Value;

use crate::models::{Analysis, Issue, PriorityCounts};

/// Extract the outermost JSON object from free text.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn flatten_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(flatten_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Normalize `location.currentValue` on every issue in place.
///
/// Returns the number of values rewritten.
pub fn repair_current_values(response: &mut Value) -> usize {
    let Some(issues) = response.get_mut("issues").and_then(Value::as_array_mut) else {
        return 0;
    };

    let mut repaired = 0;
    for issue in issues.iter_mut() {
        let Some(location) = issue.get_mut("location").and_then(Value::as_object_mut) else {
            continue;
        };
        for key in ["currentValue", "current_value"] {
            if let Some(value) = location.get_mut(key) {
                if !value.is_string() && !value.is_null() {
                    *value = Value::String(flatten_value(value));
                    repaired += 1;
                }
            }
        }
    }
    repaired
}

/// Parse a backend response into an [`Analysis`].
///
/// Counts are recomputed from the surviving issues; the counts the backend
/// reported are ignored.
pub fn parse_analysis(text: &str) -> Option<Analysis> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let json = extract_json_object(trimmed)?;
    let mut value: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "analysis response is not valid JSON");
            return None;
        }
    };

    let repaired = repair_current_values(&mut value);
    if repaired > 0 {
        tracing::debug!(repaired, "normalized currentValue fields");
    }

    let object = value.as_object()?;
    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut issues = Vec::new();
    if let Some(entries) = object.get("issues").and_then(Value::as_array) {
        for (position, entry) in entries.iter().enumerate() {
            match serde_json::from_value::<Issue>(entry.clone()) {
                Ok(issue) => issues.push(issue),
                Err(e) => {
                    tracing::warn!(position, error = %e, "dropping malformed issue");
                }
            }
        }
    }

    let counts = PriorityCounts::from_issues(&issues);
    Some(Analysis {
        issues,
        summary,
        counts,
    })
}
