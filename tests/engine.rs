//! Engine tests against scripted in-process backends.
//!
//! Cover the bounded fan-out, cancellation, cache short-circuiting,
//! degraded chunks, and the correction path including rollback.

use anyhow::{bail, Result};
use async_trait::async_trait;
use casecheck::{AnalysisRequest, EngineSettings, QualityEngine};
use casecheck_core::analyze::AnalysisBackend;
use casecheck_core::cache::{AnalysisCache, InMemoryCache};
use casecheck_core::repair::parse_analysis;
use casecheck_core::{CheckError, DocumentSchema};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TIMESTAMP_FIX: &str = r#"{
  "issues": [{
    "priority": "high",
    "category": "timeline",
    "problem": "hour disagrees with the capture log",
    "location": {"recordId": "doc_1", "field": "content"},
    "fix": {"action": "ReplaceText", "oldText": "10:00", "newText": "11:00", "rationale": "log says 11:00"}
  }],
  "summary": "One timestamp is off by an hour."
}"#;

/// Returns the same reply for every call, optionally after a delay, while
/// recording how many calls ran and the most that overlapped.
struct Scripted {
    reply: Result<String, String>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Scripted {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::replying("")
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(message) => bail!("{}", message),
        }
    }
}

fn document(records: usize) -> String {
    let documents: Vec<_> = (1..=records)
        .map(|n| {
            json!({
                "id": format!("doc_{}", n),
                "content": format!("Entry {} recorded at 2024-01-01T10:00:00+00:00", n),
                "timestamp": "2024-01-01T10:00:00+00:00"
            })
        })
        .collect();
    json!({
        "case": "harbor-theft",
        "timezone": "UTC",
        "documents": documents,
        "media": [
            {"id": "img_1", "caption": "Dock camera", "timestamp": "2024-01-01T09:55:00+00:00"}
        ]
    })
    .to_string()
}

/// Settings that put every record in its own chunk.
fn one_record_per_chunk() -> EngineSettings {
    EngineSettings {
        max_bytes_per_call: 1,
        max_concurrent_calls: 3,
        chunk_overhead_bytes: 0,
        min_chunk_bytes: 1,
        cache_max_age: Duration::from_secs(3600),
    }
}

fn engine(backend: Arc<Scripted>, settings: EngineSettings) -> QualityEngine {
    QualityEngine::new(
        backend,
        Arc::new(InMemoryCache::new()),
        settings,
        DocumentSchema::default(),
    )
}

#[tokio::test]
async fn test_fan_out_never_exceeds_three_calls() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX).with_delay(Duration::from_millis(30)));
    let engine = engine(backend.clone(), one_record_per_chunk());
    let raw = document(9);

    let run = engine
        .analyze(AnalysisRequest::new(&raw), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.chunk_count, 10);
    assert_eq!(backend.calls(), 10);
    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 3);
    assert_eq!(run.degraded_chunks, 0);
    assert!(!run.cache_hit);
}

#[tokio::test]
async fn test_identical_issues_from_every_chunk_merge_to_one() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let engine = engine(backend, one_record_per_chunk());
    let raw = document(4);

    let run = engine
        .analyze(AnalysisRequest::new(&raw), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.chunk_count, 5);
    assert_eq!(run.analysis.issues.len(), 1);
    assert_eq!(run.analysis.issues[0].id, "c0-i1");
    assert_eq!(run.analysis.counts.high, 1);
    assert_eq!(run.analysis.counts.total(), 1);
}

#[tokio::test]
async fn test_cancellation_discards_partial_results() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX).with_delay(Duration::from_secs(30)));
    let engine = engine(backend.clone(), one_record_per_chunk());
    let raw = document(6);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = engine.analyze(AnalysisRequest::new(&raw), &cancel).await;
    assert!(matches!(result, Err(CheckError::Cancelled)));
    assert!(backend.calls() <= 3);
}

#[tokio::test]
async fn test_pre_cancelled_run_makes_no_calls() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let engine = engine(backend.clone(), one_record_per_chunk());
    let raw = document(3);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = engine.analyze(AnalysisRequest::new(&raw), &cancel).await;
    assert!(matches!(result, Err(CheckError::Cancelled)));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_cache_hit_skips_backend_regardless_of_focus_order() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let engine = engine(backend.clone(), EngineSettings::default());
    let raw = document(3);
    let cancel = CancellationToken::new();

    let focus = vec!["timeline".to_string(), "media".to_string()];
    let first = engine
        .analyze(
            AnalysisRequest {
                document: &raw,
                prior_analysis: None,
                focus_areas: &focus,
            },
            &cancel,
        )
        .await
        .unwrap();
    assert!(!first.cache_hit);
    let calls_after_first = backend.calls();
    assert_eq!(calls_after_first, first.chunk_count);

    let reordered = vec!["media".to_string(), "timeline".to_string()];
    let second = engine
        .analyze(
            AnalysisRequest {
                document: &raw,
                prior_analysis: None,
                focus_areas: &reordered,
            },
            &cancel,
        )
        .await
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.chunk_count, 0);
    assert_eq!(second.analysis, first.analysis);
    assert_eq!(backend.calls(), calls_after_first);

    // A different focus set is a different key.
    let other = vec!["media".to_string()];
    let third = engine
        .analyze(
            AnalysisRequest {
                document: &raw,
                prior_analysis: None,
                focus_areas: &other,
            },
            &cancel,
        )
        .await
        .unwrap();
    assert!(!third.cache_hit);
    assert!(backend.calls() > calls_after_first);
}

#[tokio::test]
async fn test_shared_cache_serves_second_engine() {
    let cache: Arc<dyn AnalysisCache> = Arc::new(InMemoryCache::new());
    let first_backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let second_backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let raw = document(2);
    let cancel = CancellationToken::new();

    let a = QualityEngine::new(
        first_backend.clone(),
        cache.clone(),
        EngineSettings::default(),
        DocumentSchema::default(),
    );
    let b = QualityEngine::new(
        second_backend.clone(),
        cache.clone(),
        EngineSettings::default(),
        DocumentSchema::default(),
    );

    a.analyze(AnalysisRequest::new(&raw), &cancel).await.unwrap();
    let run = b.analyze(AnalysisRequest::new(&raw), &cancel).await.unwrap();

    assert!(run.cache_hit);
    assert_eq!(second_backend.calls(), 0);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_failed_calls_degrade_chunks_and_skip_cache() {
    let backend = Arc::new(Scripted::failing("upstream unavailable"));
    let engine = engine(backend.clone(), one_record_per_chunk());
    let raw = document(2);
    let cancel = CancellationToken::new();

    let run = engine.analyze(AnalysisRequest::new(&raw), &cancel).await.unwrap();
    assert_eq!(run.chunk_count, 3);
    assert_eq!(run.degraded_chunks, 3);
    assert!(run.analysis.issues.is_empty());

    let again = engine.analyze(AnalysisRequest::new(&raw), &cancel).await.unwrap();
    assert!(!again.cache_hit);
    assert_eq!(backend.calls(), 6);
}

#[tokio::test]
async fn test_unparseable_reply_counts_as_degraded() {
    let backend = Arc::new(Scripted::replying("I could not review this case."));
    let engine = engine(backend, EngineSettings::default());
    let raw = document(2);

    let run = engine
        .analyze(AnalysisRequest::new(&raw), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(run.chunk_count, 1);
    assert_eq!(run.degraded_chunks, 1);
    assert!(run.analysis.issues.is_empty());
}

#[tokio::test]
async fn test_malformed_document_is_rejected() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let engine = engine(backend.clone(), EngineSettings::default());
    let cancel = CancellationToken::new();

    for raw in ["not json", "[1, 2, 3]", r#"{"documents": "oops"}"#] {
        let result = engine.analyze(AnalysisRequest::new(raw), &cancel).await;
        assert!(
            matches!(result, Err(CheckError::MalformedDocument(_))),
            "accepted: {}",
            raw
        );
    }
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_check_applies_fix_and_reports() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let engine = engine(backend, EngineSettings::default());
    let raw = document(3);

    let outcome = engine
        .check(AnalysisRequest::new(&raw), &CancellationToken::new())
        .await
        .unwrap();

    let fixed: serde_json::Value = serde_json::from_str(&outcome.document).unwrap();
    assert_eq!(
        fixed["documents"][0]["content"],
        json!("Entry 1 recorded at 2024-01-01T11:00:00+00:00")
    );
    assert_eq!(
        fixed["documents"][1]["content"],
        json!("Entry 2 recorded at 2024-01-01T10:00:00+00:00")
    );
    assert_eq!(fixed["case"], json!("harbor-theft"));

    let report = &outcome.report;
    assert_eq!(report.applied, vec!["c0-i1".to_string()]);
    assert!(report.unresolved.is_empty());
    assert!(!report.rolled_back);
    assert_eq!(report.counts.high, 1);
    assert_eq!(report.summary, "One timestamp is off by an hour.");
    assert!(!report.run_id.is_empty());
}

#[tokio::test]
async fn test_identity_change_rolls_back_to_original_bytes() {
    let reply = r#"{
      "issues": [
        {"priority": "low", "location": {"recordId": "doc_2"},
         "fix": {"action": "ReplaceText", "oldText": "Entry", "newText": "Item"}},
        {"priority": "high", "location": {"recordId": "doc_1", "field": "id"},
         "fix": {"action": "UpdateTimestamp", "newValue": "doc_9"}}
      ],
      "summary": ""
    }"#;
    let backend = Arc::new(Scripted::replying(reply));
    let engine = engine(backend, EngineSettings::default());
    let raw = document(2);

    let outcome = engine
        .check(AnalysisRequest::new(&raw), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.report.rolled_back);
    assert_eq!(outcome.document, raw);
}

#[tokio::test]
async fn test_correct_without_applicable_fixes_returns_input() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let engine = engine(backend, EngineSettings::default());
    let raw = document(1);
    let analysis = parse_analysis(
        r#"{"issues": [{"priority": "medium", "location": {"recordId": "skeleton"},
             "fix": {"action": "ReplaceText", "oldText": "UTC", "newText": "CET"}}]}"#,
    )
    .unwrap();

    let outcome = engine.correct(&raw, &analysis).unwrap();
    assert_eq!(outcome.document, raw);
    assert_eq!(outcome.skipped_skeleton, 1);
    assert!(outcome.applied.is_empty());
    assert!(outcome.unresolved.is_empty());
}

#[tokio::test]
async fn test_sweep_cache_keeps_fresh_entries() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let engine = engine(backend, EngineSettings::default());
    let raw = document(1);

    engine
        .analyze(AnalysisRequest::new(&raw), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(engine.sweep_cache(), 0);
}

#[tokio::test]
async fn test_correct_keeps_key_order() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let engine = engine(backend, EngineSettings::default());
    let raw = r#"{"zeta":1,"documents":[{"id":"doc_1","content":"Seen at 10:00","zz":1,"aa":2}],"alpha":2}"#;
    let analysis = parse_analysis(TIMESTAMP_FIX).unwrap();

    let outcome = engine.correct(raw, &analysis).unwrap();
    assert_eq!(outcome.applied.len(), 1);

    let fixed: serde_json::Value = serde_json::from_str(&outcome.document).unwrap();
    let top: Vec<&str> = fixed.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(top, vec!["zeta", "documents", "alpha"]);

    let record = fixed["documents"][0].as_object().unwrap();
    let fields: Vec<&str> = record.keys().map(String::as_str).collect();
    assert_eq!(fields, vec!["id", "content", "zz", "aa"]);
    assert_eq!(record["content"], json!("Seen at 11:00"));
}

#[tokio::test]
async fn test_zero_concurrency_setting_still_completes() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let settings = EngineSettings {
        max_concurrent_calls: 0,
        ..one_record_per_chunk()
    };
    let engine = engine(backend.clone(), settings);
    let raw = document(2);

    let run = tokio::time::timeout(
        Duration::from_secs(5),
        engine.analyze(AnalysisRequest::new(&raw), &CancellationToken::new()),
    )
    .await
    .expect("analysis stalled")
    .unwrap();

    assert_eq!(run.chunk_count, 3);
    assert_eq!(backend.calls(), 3);
    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_prior_analysis_is_reserved_in_chunk_budget() {
    let backend = Arc::new(Scripted::replying(TIMESTAMP_FIX));
    let settings = EngineSettings {
        max_bytes_per_call: 2_000,
        max_concurrent_calls: 3,
        chunk_overhead_bytes: 0,
        min_chunk_bytes: 1,
        cache_max_age: Duration::from_secs(3600),
    };
    let engine = engine(backend, settings);
    let raw = document(4);
    let prior = "doc_1 and doc_3 disagree on the hour. ".repeat(37);
    let focus = vec!["timeline".to_string()];

    let bare = engine.plan(AnalysisRequest::new(&raw)).unwrap();
    let with_prior = engine
        .plan(AnalysisRequest {
            document: &raw,
            prior_analysis: Some(&prior),
            focus_areas: &focus,
        })
        .unwrap();

    assert_eq!(bare.chunks.len(), 1);
    assert!(with_prior.budget.overhead_bytes > prior.len());
    assert!(with_prior.budget.available() < bare.budget.available());
    assert!(with_prior.chunks.len() > bare.chunks.len());
}
