//! Merging per-chunk analyses into one run result.
//!
//! Issues are concatenated in chunk order and deduplicated on their
//! location key `(record id, field path, section hint, pattern hint)`.
//! The first issue seen for a key wins. Counts are always recomputed from
//! the surviving issues, since each chunk only saw part of the document.

use std::collections::HashSet;

use crate::models::{Analysis, Issue, PriorityCounts};

/// How many chunk summaries are carried into the merged summary.
pub const SUMMARY_LIMIT: usize = 3;

/// Identity of an issue's location for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationKey {
    pub record_id: String,
    pub field: Option<String>,
    pub section: Option<String>,
    pub pattern: Option<String>,
}

impl LocationKey {
    pub fn of(issue: &Issue) -> Self {
        let loc = &issue.location;
        Self {
            record_id: loc.record_id.trim().to_string(),
            field: loc.field.clone(),
            section: loc.section.clone(),
            pattern: loc.pattern.clone(),
        }
    }
}

/// Merge chunk analyses, in chunk order.
pub fn merge_analyses(analyses: &[Analysis]) -> Analysis {
    let mut seen = HashSet::new();
    let mut issues = Vec::new();

    for analysis in analyses {
        for issue in &analysis.issues {
            if seen.insert(LocationKey::of(issue)) {
                issues.push(issue.clone());
            }
        }
    }

    let dropped = analyses.iter().map(|a| a.issues.len()).sum::<usize>() - issues.len();
    if dropped > 0 {
        tracing::debug!(dropped, kept = issues.len(), "deduplicated issues");
    }

    let summary = analyses
        .iter()
        .map(|a| a.summary.trim())
        .filter(|s| !s.is_empty())
        .take(SUMMARY_LIMIT)
        .collect::<Vec<_>>()
        .join(" ");

    let counts = PriorityCounts::from_issues(&issues);
    Analysis {
        issues,
        summary,
        counts,
    }
}
