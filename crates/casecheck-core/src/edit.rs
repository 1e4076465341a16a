//! Precision editor.
//!
//! Applies merged issues back into the document, touching only the record
//! and field each issue names. Issues are applied strictly in priority
//! order (`High`, then `Medium`, then `Low`; discovery order within a
//! priority). A fix that cannot be applied is recorded as unresolved and
//! the batch continues.
//!
//! # Fix actions
//!
//! | Action | Field path given | No field path |
//! |--------|------------------|---------------|
//! | `UpdateTimestamp` | overwrite the field with `newValue` | replace `oldText` with `newText` in the content field |
//! | `ReplaceText` | replace `oldText` with `newText` in the field | same, in the content field |
//! | `MoveToAddendum` | replace the span with [`ADDENDUM_PLACEHOLDER`] | same, in the content field |
//! | `RemoveReference` | delete the span, collapse repeated spaces | same, in the content field |
//!
//! Text replacements substitute the first occurrence only. When `oldText`
//! is absent the issue's `location.currentValue` is used as the span.
//!
//! # Atomicity
//!
//! Fixes are applied one by one to a working copy. Afterwards the copy is
//! re-serialized, re-parsed and compared structurally with the original:
//! both collections must still hold the same records under the same
//! identifiers. If that check fails every change is discarded and the
//! original document is returned.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::FixError;
use crate::index::record_id;
use crate::models::{DocumentSchema, FixAction, Issue, Location, RecordKind};
use crate::path::FieldPath;

/// Text left behind where a span was moved out of the record.
///
/// The addendum the span is moved to is not produced yet; only the
/// placeholder is written.
pub const ADDENDUM_PLACEHOLDER: &str = "[Moved to addendum]";

/// An issue whose fix was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unresolved {
    pub issue_id: String,
    pub reason: String,
}

/// Result of one editing pass.
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub document: Value,
    /// Ids of issues whose fix was applied, in application order.
    pub applied: Vec<String>,
    pub unresolved: Vec<Unresolved>,
    /// Issues addressed at the skeleton, filtered before editing.
    pub skipped_skeleton: usize,
    /// True when structural validation failed and all fixes were discarded.
    pub rolled_back: bool,
}

/// Addressable issues in application order.
pub fn order_issues(issues: &[Issue]) -> Vec<&Issue> {
    let mut ordered: Vec<&Issue> = issues.iter().filter(|i| !i.targets_skeleton()).collect();
    ordered.sort_by_key(|i| i.priority);
    ordered
}

/// Apply every issue's fix to a copy of `document`.
pub fn apply_fixes(document: &Value, issues: &[Issue], schema: &DocumentSchema) -> EditOutcome {
    let ordered = order_issues(issues);
    let skipped_skeleton = issues.len() - ordered.len();
    if skipped_skeleton > 0 {
        tracing::debug!(skipped_skeleton, "filtered issues addressed at the skeleton");
    }

    let mut working = document.clone();
    let mut applied = Vec::new();
    let mut unresolved = Vec::new();

    for issue in ordered {
        match apply_fix(&mut working, issue, schema) {
            Ok(()) => applied.push(issue.id.clone()),
            Err(e) => {
                tracing::warn!(
                    issue = %issue.id,
                    record = %issue.location.record_id,
                    reason = %e,
                    "fix not applied"
                );
                unresolved.push(Unresolved {
                    issue_id: issue.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if let Err(reason) = validate_structure(document, &working, schema) {
        tracing::warn!(%reason, applied = applied.len(), "edited document failed validation, discarding all fixes");
        return EditOutcome {
            document: document.clone(),
            applied: Vec::new(),
            unresolved,
            skipped_skeleton,
            rolled_back: true,
        };
    }

    EditOutcome {
        document: working,
        applied,
        unresolved,
        skipped_skeleton,
        rolled_back: false,
    }
}

/// Apply a single issue's fix in place.
pub fn apply_fix(document: &mut Value, issue: &Issue, schema: &DocumentSchema) -> Result<(), FixError> {
    if issue.targets_skeleton() {
        return Err(FixError::PseudoRecord);
    }
    let action = issue.fix.action_kind().map_err(FixError::UnknownAction)?;
    let record = find_record_mut(document, &issue.location, schema)
        .ok_or_else(|| FixError::RecordNotFound(issue.location.record_id.clone()))?;

    let path = match issue.location.field.as_deref().map(str::trim) {
        Some(field) if !field.is_empty() => Some(FieldPath::parse(field)?),
        _ => None,
    };

    match action {
        FixAction::UpdateTimestamp => match &path {
            Some(path) => {
                let new_value = issue
                    .fix
                    .new_value
                    .clone()
                    .or_else(|| issue.fix.new_text.clone().map(Value::String))
                    .ok_or(FixError::MissingValue("newValue"))?;
                *path.resolve_mut(record)? = new_value;
                Ok(())
            }
            None => {
                let old = old_text(issue)?;
                let new = new_text(issue)?;
                let content = FieldPath::parse(&schema.content_field)?;
                replace_first(text_field(record, &content)?, &content, old, &new)
            }
        },
        FixAction::ReplaceText => {
            let old = old_text(issue)?;
            let new = new_text(issue)?;
            let target = target_path(path, schema)?;
            replace_first(text_field(record, &target)?, &target, old, &new)
        }
        FixAction::MoveToAddendum => {
            let span = old_text(issue)?;
            let target = target_path(path, schema)?;
            replace_first(text_field(record, &target)?, &target, span, ADDENDUM_PLACEHOLDER)
        }
        FixAction::RemoveReference => {
            let span = old_text(issue)?;
            let target = target_path(path, schema)?;
            let text = text_field(record, &target)?;
            replace_first(text, &target, span, "")?;
            let collapsed = collapse_spaces(text);
            *text = collapsed;
            Ok(())
        }
    }
}

fn target_path(path: Option<FieldPath>, schema: &DocumentSchema) -> Result<FieldPath, FixError> {
    match path {
        Some(p) => Ok(p),
        None => Ok(FieldPath::parse(&schema.content_field)?),
    }
}

fn old_text(issue: &Issue) -> Result<&str, FixError> {
    fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().filter(|s| !s.is_empty())
    }
    non_empty(&issue.fix.old_text)
        .or_else(|| non_empty(&issue.location.current_value))
        .ok_or(FixError::MissingValue("oldText"))
}

fn new_text(issue: &Issue) -> Result<String, FixError> {
    if let Some(text) = &issue.fix.new_text {
        return Ok(text.clone());
    }
    match &issue.fix.new_value {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(FixError::MissingValue("newText")),
    }
}

fn text_field<'a>(record: &'a mut Value, path: &FieldPath) -> Result<&'a mut String, FixError> {
    match path.resolve_mut(record)? {
        Value::String(s) => Ok(s),
        _ => Err(FixError::NotText(path.to_string())),
    }
}

fn replace_first(text: &mut String, path: &FieldPath, old: &str, new: &str) -> Result<(), FixError> {
    if !text.contains(old) {
        return Err(FixError::NoMatch(path.to_string()));
    }
    *text = text.replacen(old, new, 1);
    Ok(())
}

fn collapse_spaces(text: &str) -> String {
    static RUNS: OnceLock<Regex> = OnceLock::new();
    let runs = RUNS.get_or_init(|| Regex::new(r"[ \t]{2,}").expect("whitespace pattern is valid"));
    runs.replace_all(text, " ").into_owned()
}

/// Locate a record by identifier, in the named collection or both.
fn find_record_mut<'a>(
    document: &'a mut Value,
    location: &Location,
    schema: &DocumentSchema,
) -> Option<&'a mut Value> {
    let id = location.record_id.trim();
    let kinds: &[RecordKind] = match &location.collection {
        Some(RecordKind::Text) => &[RecordKind::Text],
        Some(RecordKind::Media) => &[RecordKind::Media],
        None => &RecordKind::ALL,
    };

    for kind in kinds {
        let key = schema.collection_key(*kind);
        let position = document
            .get(key)
            .and_then(Value::as_array)
            .and_then(|records| {
                records
                    .iter()
                    .position(|r| record_id(r, &schema.id_field).as_deref() == Some(id))
            });
        if let Some(position) = position {
            return document
                .get_mut(key)
                .and_then(Value::as_array_mut)
                .and_then(|records| records.get_mut(position));
        }
    }
    None
}

fn collection_ids(document: &Value, key: &str, id_field: &str) -> Result<Option<Vec<Option<String>>>, String> {
    match document.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(records)) => Ok(Some(
            records.iter().map(|r| record_id(r, id_field)).collect(),
        )),
        Some(_) => Err(format!("collection '{}' is no longer an array", key)),
    }
}

/// Re-serialize `edited` and check it still has the shape of `original`.
pub fn validate_structure(original: &Value, edited: &Value, schema: &DocumentSchema) -> Result<(), String> {
    let serialized = serde_json::to_string(edited).map_err(|e| format!("serialization failed: {}", e))?;
    let reparsed: Value =
        serde_json::from_str(&serialized).map_err(|e| format!("re-parse failed: {}", e))?;

    if !reparsed.is_object() {
        return Err("top-level value is no longer an object".to_string());
    }

    for kind in RecordKind::ALL {
        let key = schema.collection_key(kind);
        let before = collection_ids(original, key, &schema.id_field)?;
        let after = collection_ids(&reparsed, key, &schema.id_field)?;
        if before != after {
            return Err(format!("records in '{}' changed identity", key));
        }
    }
    Ok(())
}
