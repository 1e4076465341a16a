//! Core data types.
//!
//! Records are opaque [`serde_json::Value`] trees; the core only reads
//! their identifier, candidate timestamp fields, and whatever field an
//! issue addresses. Issues use the camelCase wire shape the analysis
//! backend is instructed to produce.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier reserved for issues that point at the skeleton rather than
/// at a real record. Such issues are never handed to the editor.
pub const SKELETON_RECORD_ID: &str = "skeleton";

/// Names of the document fields the core touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSchema {
    /// Top-level key of the textual record collection.
    #[serde(default = "default_text_collection")]
    pub text_collection: String,
    /// Top-level key of the media record collection.
    #[serde(default = "default_media_collection")]
    pub media_collection: String,
    /// Record identifier field.
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Free-text field used when an issue carries no field path.
    #[serde(default = "default_content_field")]
    pub content_field: String,
    /// Candidate timestamp fields sampled into the skeleton.
    #[serde(default = "default_timestamp_fields")]
    pub timestamp_fields: Vec<String>,
}

fn default_text_collection() -> String {
    "documents".to_string()
}
fn default_media_collection() -> String {
    "media".to_string()
}
fn default_id_field() -> String {
    "id".to_string()
}
fn default_content_field() -> String {
    "content".to_string()
}
fn default_timestamp_fields() -> Vec<String> {
    vec!["timestamp".to_string(), "created_at".to_string()]
}

impl Default for DocumentSchema {
    fn default() -> Self {
        Self {
            text_collection: default_text_collection(),
            media_collection: default_media_collection(),
            id_field: default_id_field(),
            content_field: default_content_field(),
            timestamp_fields: default_timestamp_fields(),
        }
    }
}

impl DocumentSchema {
    /// Top-level key holding records of the given kind.
    pub fn collection_key(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Text => &self.text_collection,
            RecordKind::Media => &self.media_collection,
        }
    }
}

/// Which of the two record collections a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Text,
    Media,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Text, RecordKind::Media];
}

/// Issue priority. Ordering is application order: `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The closed set of mutations the editor understands.
///
/// Stored on [`Fix`] as the raw string the backend produced and parsed
/// only at apply time, so an unknown action reaches the editor and is
/// reported there instead of failing the whole response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixAction {
    UpdateTimestamp,
    ReplaceText,
    MoveToAddendum,
    RemoveReference,
}

impl FromStr for FixAction {
    type Err = String;

    /// Case-insensitive; `_` and `-` are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "updatetimestamp" => Ok(FixAction::UpdateTimestamp),
            "replacetext" => Ok(FixAction::ReplaceText),
            "movetoaddendum" => Ok(FixAction::MoveToAddendum),
            "removereference" => Ok(FixAction::RemoveReference),
            _ => Err(s.to_string()),
        }
    }
}

/// Where an issue was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(alias = "record_id")]
    pub record_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<RecordKind>,
    /// Dot/bracket field path into the record, e.g. `sections[2].content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(
        default,
        alias = "current_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_value: Option<String>,
}

/// Proposed correction for an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    /// Raw action name; see [`FixAction`].
    pub action: String,
    #[serde(default, alias = "new_value", skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
    #[serde(default, alias = "old_text", skip_serializing_if = "Option::is_none")]
    pub old_text: Option<String>,
    #[serde(default, alias = "new_text", skip_serializing_if = "Option::is_none")]
    pub new_text: Option<String>,
    #[serde(default)]
    pub rationale: String,
}

impl Fix {
    pub fn action_kind(&self) -> Result<FixAction, String> {
        self.action.parse()
    }
}

/// One detected defect and its proposed fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(default)]
    pub id: String,
    pub priority: Priority,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub problem: String,
    pub location: Location,
    pub fix: Fix,
}

impl Issue {
    /// True when the issue addresses the skeleton (or nothing at all).
    pub fn targets_skeleton(&self) -> bool {
        let id = self.location.record_id.trim();
        id.is_empty() || id.eq_ignore_ascii_case(SKELETON_RECORD_ID)
    }
}

/// Issue counts by priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    #[serde(default)]
    pub high: usize,
    #[serde(default)]
    pub medium: usize,
    #[serde(default)]
    pub low: usize,
}

impl PriorityCounts {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut counts = Self::default();
        for issue in issues {
            match issue.priority {
                Priority::High => counts.high += 1,
                Priority::Medium => counts.medium += 1,
                Priority::Low => counts.low += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

/// An issue list with its summary. Used both for a single chunk's result
/// and for the merged result of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub counts: PriorityCounts,
}

impl Analysis {
    pub fn empty() -> Self {
        Self::default()
    }
}
