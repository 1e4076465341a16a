//! Per-chunk analysis.
//!
//! Builds a scoped view of one [`Chunk`] (skeleton plus only that chunk's
//! records), sends it to an [`AnalysisBackend`] with chunk-scoped
//! instructions, and parses the response. A chunk whose backend call
//! fails or whose response cannot be parsed degrades to an empty
//! analysis; it never aborts the batch.
//!
//! Concurrency and cancellation are the caller's concern: this module
//! only awaits the backend future.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::index::DocumentIndex;
use crate::models::{Analysis, RecordKind, SKELETON_RECORD_ID};
use crate::plan::Chunk;
use crate::repair::parse_analysis;

/// Text-analysis capability: takes instructions and a payload, returns text.
///
/// Implementations may fail (network error, timeout, disabled backend)
/// and may return text that is not the requested JSON.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use casecheck_core::analyze::AnalysisBackend;
///
/// struct Silent;
///
/// #[async_trait]
/// impl AnalysisBackend for Silent {
///     fn name(&self) -> &str { "silent" }
///     async fn analyze(&self, _system: &str, _user: &str) -> Result<String> {
///         Ok(r#"{"issues": [], "summary": "nothing found"}"#.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    async fn analyze(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Run-scoped inputs shared by every chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkContext<'a> {
    pub document_hash: &'a str,
    pub chunk_count: usize,
    /// Earlier coarse-grained analysis whose flagged areas take priority.
    pub prior_analysis: Option<&'a str>,
    pub focus_areas: &'a [String],
}

/// How a chunk's analysis ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    Analyzed,
    /// The backend returned empty or unparseable text.
    Malformed,
    /// The backend call failed.
    BackendFailed(String),
}

impl ChunkStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ChunkStatus::Malformed | ChunkStatus::BackendFailed(_))
    }
}

#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub chunk_index: usize,
    pub status: ChunkStatus,
    pub analysis: Analysis,
}

/// The payload a chunk's call sees: skeleton plus the chunk's records.
pub fn build_scoped_view(chunk: &Chunk, index: &DocumentIndex) -> Value {
    let mut text = Vec::new();
    let mut media = Vec::new();
    for r in &chunk.records {
        let Some(record) = index.records(r.kind).get(&r.id) else {
            continue;
        };
        match r.kind {
            RecordKind::Text => text.push(record.clone()),
            RecordKind::Media => media.push(record.clone()),
        }
    }

    let mut view = Map::new();
    view.insert(
        "skeleton".to_string(),
        serde_json::to_value(&index.skeleton).unwrap_or(Value::Null),
    );
    view.insert("textRecords".to_string(), Value::Array(text));
    view.insert("mediaRecords".to_string(), Value::Array(media));
    Value::Object(view)
}

const ISSUE_SHAPE: &str = r#"{
  "issues": [
    {
      "priority": "High" | "Medium" | "Low",
      "category": "timestamp_conflict" | "broken_reference" | "chronology" | "other",
      "problem": "one sentence describing the defect",
      "location": {
        "recordId": "id of the record that must change",
        "collection": "text" | "media",
        "field": "optional dot/bracket path, e.g. sections[2].content",
        "section": "optional section hint",
        "pattern": "optional pattern hint",
        "currentValue": "the exact current text or value"
      },
      "fix": {
        "action": "UpdateTimestamp" | "ReplaceText" | "MoveToAddendum" | "RemoveReference",
        "newValue": "replacement value when a field path is given",
        "oldText": "exact text to replace or remove",
        "newText": "replacement text",
        "rationale": "why this fix is correct"
      }
    }
  ],
  "summary": "two or three sentences",
  "counts": {"high": 0, "medium": 0, "low": 0}
}"#;

/// Instructions sent with every chunk.
pub fn system_prompt(ctx: &ChunkContext<'_>) -> String {
    let mut prompt = String::from(
        "You are a quality-control reviewer for a generated case file. \
         You receive a skeleton of the whole case (metadata, every record id, \
         sampled timestamps) and the full content of a subset of its records.\n\n\
         Identify only concrete, localized defects in the records you were given: \
         timestamp conflicts, references to record ids that do not exist in the \
         skeleton, and chronology errors. Propose the smallest possible fix for each. \
         Do not rewrite content, do not report style issues, and do not report \
         defects in records you were not shown.\n\n\
         Every issue must name the recordId it changes. Use a field path only when \
         the value lives somewhere other than the record's main content. oldText \
         must be copied exactly from the record.\n\n\
         Respond with a single JSON object and nothing else, in this shape:\n",
    );
    prompt.push_str(ISSUE_SHAPE);
    prompt.push_str(&format!(
        "\n\nNever use \"{}\" as a recordId.",
        SKELETON_RECORD_ID
    ));
    if ctx.prior_analysis.is_some() {
        prompt.push_str(
            "\n\nA previous coarse review of the whole case is included. \
             Check the areas it flagged first.",
        );
    }
    prompt
}

/// Focus and prior-analysis section repeated in every chunk's prompt.
fn request_context(prior_analysis: Option<&str>, focus_areas: &[String]) -> String {
    let mut section = String::new();
    if !focus_areas.is_empty() {
        section.push_str(&format!("Focus areas: {}\n", focus_areas.join(", ")));
    }
    if let Some(prior) = prior_analysis {
        section.push_str("\nPrevious review:\n");
        section.push_str(prior);
        section.push('\n');
    }
    section
}

/// Bytes the request context adds to every chunk's prompt. The planner
/// reserves these alongside the fixed overhead.
pub fn request_context_bytes(prior_analysis: Option<&str>, focus_areas: &[String]) -> usize {
    request_context(prior_analysis, focus_areas).len()
}

/// Payload for one chunk.
pub fn user_prompt(chunk: &Chunk, view: &Value, ctx: &ChunkContext<'_>) -> String {
    let mut prompt = format!(
        "Case {}: part {} of {} ({} records).\n",
        ctx.document_hash.get(..12).unwrap_or(ctx.document_hash),
        chunk.index + 1,
        ctx.chunk_count,
        chunk.records.len()
    );

    prompt.push_str(&request_context(ctx.prior_analysis, ctx.focus_areas));
    prompt.push_str("\nCase data:\n");
    prompt.push_str(&view.to_string());
    prompt
}

/// Analyze one chunk. Never fails: degraded chunks yield an empty analysis.
pub async fn analyze_chunk(
    backend: &dyn AnalysisBackend,
    chunk: &Chunk,
    index: &DocumentIndex,
    ctx: &ChunkContext<'_>,
) -> ChunkOutcome {
    let view = build_scoped_view(chunk, index);
    let system = system_prompt(ctx);
    let user = user_prompt(chunk, &view, ctx);

    tracing::debug!(
        chunk = chunk.index,
        records = chunk.records.len(),
        payload_bytes = user.len(),
        backend = backend.name(),
        "analyzing chunk"
    );

    let text = match backend.analyze(&system, &user).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(chunk = chunk.index, error = %e, "analysis call failed");
            return ChunkOutcome {
                chunk_index: chunk.index,
                status: ChunkStatus::BackendFailed(e.to_string()),
                analysis: Analysis::empty(),
            };
        }
    };

    match parse_analysis(&text) {
        Some(mut analysis) => {
            for (n, issue) in analysis.issues.iter_mut().enumerate() {
                let supplied = issue.id.trim();
                issue.id = if supplied.is_empty() {
                    format!("c{}-i{}", chunk.index, n + 1)
                } else {
                    format!("c{}-{}", chunk.index, supplied)
                };
            }
            ChunkOutcome {
                chunk_index: chunk.index,
                status: ChunkStatus::Analyzed,
                analysis,
            }
        }
        None => {
            tracing::warn!(
                chunk = chunk.index,
                response_bytes = text.len(),
                "unparseable analysis response, treating as zero issues"
            );
            ChunkOutcome {
                chunk_index: chunk.index,
                status: ChunkStatus::Malformed,
                analysis: Analysis::empty(),
            }
        }
    }
}
