//! Chunked analysis and correction engine.
//!
//! Wires the core pipeline together:
//!
//! ```text
//! raw ─▶ index ─▶ plan ─▶ hash ─▶ cache? ─hit──────────────▶ AnalysisRun
//!                                   │miss
//!                                   ▼
//!                       fan-out (≤ N in flight) ─▶ merge ─▶ cache
//! ```
//!
//! The fan-out is the only parallel region. Every chunk future is started
//! at once and waits on a semaphore slot before calling the backend, so at
//! most `max_concurrent_calls` calls are in flight regardless of chunk
//! count. A [`CancellationToken`] is raced against both the slot wait and
//! the call; a cancelled run returns [`CheckError::Cancelled`] and no
//! partial merge.

use anyhow::Result;
use casecheck_core::analyze::{
    analyze_chunk, request_context_bytes, AnalysisBackend, ChunkContext, ChunkOutcome,
};
use casecheck_core::cache::{compute_hash, AnalysisCache};
use casecheck_core::edit::{apply_fixes, Unresolved};
use casecheck_core::index::{index_raw, DocumentIndex};
use casecheck_core::merge::merge_analyses;
use casecheck_core::models::{Analysis, DocumentSchema, PriorityCounts};
use casecheck_core::plan::{plan_chunks, Chunk, ChunkBudget};
use casecheck_core::CheckError;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::backend::create_backend;
use crate::config::{Config, EngineConfig};

/// Analysis kind under which chunked results are cached.
pub const ANALYSIS_KIND: &str = "chunked";

/// Scalar knobs of the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_bytes_per_call: usize,
    pub max_concurrent_calls: usize,
    pub chunk_overhead_bytes: usize,
    pub min_chunk_bytes: usize,
    pub cache_max_age: Duration,
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_bytes_per_call: config.max_bytes_per_call,
            max_concurrent_calls: config.max_concurrent_calls.max(1),
            chunk_overhead_bytes: config.chunk_overhead_bytes,
            min_chunk_bytes: config.min_chunk_bytes,
            cache_max_age: Duration::from_secs(config.cache_max_age_secs),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Inputs of one analysis run.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    /// Raw serialized document.
    pub document: &'a str,
    /// Earlier coarse-grained analysis text.
    pub prior_analysis: Option<&'a str>,
    pub focus_areas: &'a [String],
}

impl<'a> AnalysisRequest<'a> {
    pub fn new(document: &'a str) -> Self {
        Self {
            document,
            prior_analysis: None,
            focus_areas: &[],
        }
    }
}

/// Indexed document and its chunk plan.
#[derive(Debug, Clone)]
pub struct DocumentPlan {
    pub index: DocumentIndex,
    pub budget: ChunkBudget,
    pub chunks: Vec<Chunk>,
}

/// Result of [`QualityEngine::analyze`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    pub document_hash: String,
    /// Zero when served from cache.
    pub chunk_count: usize,
    /// Chunks whose call failed or returned unparseable text.
    pub degraded_chunks: usize,
    pub cache_hit: bool,
    pub analysis: Analysis,
}

/// Result of [`QualityEngine::correct`].
#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    /// Corrected document text. Identical to the input when nothing was
    /// applied or the edit was rolled back.
    pub document: String,
    pub applied: Vec<String>,
    pub unresolved: Vec<Unresolved>,
    pub skipped_skeleton: usize,
    pub rolled_back: bool,
}

/// Machine-readable summary of a full check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub run_id: String,
    pub generated_at: String,
    pub document_hash: String,
    pub chunk_count: usize,
    pub degraded_chunks: usize,
    pub cache_hit: bool,
    pub counts: PriorityCounts,
    pub summary: String,
    pub applied: Vec<String>,
    pub unresolved: Vec<Unresolved>,
    pub skipped_skeleton: usize,
    pub rolled_back: bool,
}

/// Corrected document plus its report.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub document: String,
    pub analysis: Analysis,
    pub report: CheckReport,
}

/// The chunked analysis and precision correction engine.
///
/// The backend and cache are injected; one cache instance is meant to be
/// shared by every engine in the process.
pub struct QualityEngine {
    backend: Arc<dyn AnalysisBackend>,
    cache: Arc<dyn AnalysisCache>,
    settings: EngineSettings,
    schema: DocumentSchema,
}

impl QualityEngine {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        cache: Arc<dyn AnalysisCache>,
        settings: EngineSettings,
        schema: DocumentSchema,
    ) -> Self {
        Self {
            backend,
            cache,
            settings,
            schema,
        }
    }

    /// Build an engine with the configured backend.
    pub fn from_config(config: &Config, cache: Arc<dyn AnalysisCache>) -> Result<Self> {
        let backend = create_backend(&config.backend)?;
        Ok(Self::new(
            backend,
            cache,
            EngineSettings::from(&config.engine),
            config.schema.clone(),
        ))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn schema(&self) -> &DocumentSchema {
        &self.schema
    }

    /// Index and partition a document without calling the backend.
    ///
    /// The prior analysis and focus areas are repeated in every chunk's
    /// prompt, so their size is reserved on top of the fixed overhead.
    pub fn plan(&self, request: AnalysisRequest<'_>) -> Result<DocumentPlan, CheckError> {
        let (_, index) = index_raw(request.document, &self.schema)?;
        let budget = ChunkBudget {
            max_bytes_per_call: self.settings.max_bytes_per_call,
            skeleton_bytes: index.skeleton.serialized_len(),
            overhead_bytes: self.settings.chunk_overhead_bytes
                + request_context_bytes(request.prior_analysis, request.focus_areas),
            min_chunk_bytes: self.settings.min_chunk_bytes,
        };
        let chunks = plan_chunks(&index, &budget);
        Ok(DocumentPlan {
            index,
            budget,
            chunks,
        })
    }

    /// Analyze a document, serving identical requests from the cache.
    pub async fn analyze(
        &self,
        request: AnalysisRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisRun, CheckError> {
        let plan = self.plan(request)?;
        let document_hash = compute_hash(request.document);

        if let Some(cached) = self.cache.get(&document_hash, ANALYSIS_KIND, request.focus_areas) {
            match serde_json::from_str::<Analysis>(&cached) {
                Ok(analysis) => {
                    tracing::info!(hash = %document_hash, "analysis served from cache");
                    return Ok(AnalysisRun {
                        document_hash,
                        chunk_count: 0,
                        degraded_chunks: 0,
                        cache_hit: true,
                        analysis,
                    });
                }
                Err(e) => {
                    tracing::warn!(hash = %document_hash, error = %e, "ignoring unreadable cache entry");
                }
            }
        }

        tracing::info!(
            hash = %document_hash,
            records = plan.index.record_count(),
            chunks = plan.chunks.len(),
            skeleton_bytes = plan.budget.skeleton_bytes,
            "starting chunked analysis"
        );

        let ctx = ChunkContext {
            document_hash: &document_hash,
            chunk_count: plan.chunks.len(),
            prior_analysis: request.prior_analysis,
            focus_areas: request.focus_areas,
        };
        let outcomes = self.fan_out(&plan, &ctx, cancel).await?;

        let degraded_chunks = outcomes.iter().filter(|o| o.status.is_degraded()).count();
        let analyses: Vec<Analysis> = outcomes.into_iter().map(|o| o.analysis).collect();
        let analysis = merge_analyses(&analyses);

        if degraded_chunks == 0 {
            let serialized = serde_json::to_string(&analysis)?;
            self.cache
                .put(&document_hash, serialized, ANALYSIS_KIND, request.focus_areas);
        } else {
            tracing::warn!(
                degraded_chunks,
                chunks = plan.chunks.len(),
                "some chunks degraded, result not cached"
            );
        }

        tracing::info!(
            issues = analysis.issues.len(),
            high = analysis.counts.high,
            medium = analysis.counts.medium,
            low = analysis.counts.low,
            "analysis complete"
        );

        Ok(AnalysisRun {
            document_hash,
            chunk_count: plan.chunks.len(),
            degraded_chunks,
            cache_hit: false,
            analysis,
        })
    }

    async fn fan_out(
        &self,
        plan: &DocumentPlan,
        ctx: &ChunkContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChunkOutcome>, CheckError> {
        let limiter = Semaphore::new(self.settings.max_concurrent_calls.max(1));
        let backend = self.backend.as_ref();

        let tasks = plan.chunks.iter().map(|chunk| {
            let limiter = &limiter;
            async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = limiter.acquire() => permit.ok(),
                };
                let _permit = permit?;

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    outcome = analyze_chunk(backend, chunk, &plan.index, ctx) => Some(outcome),
                }
            }
        });

        let results = join_all(tasks).await;
        if cancel.is_cancelled() {
            tracing::warn!("analysis cancelled, discarding chunk results");
            return Err(CheckError::Cancelled);
        }
        results
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(CheckError::Cancelled)
    }

    /// Apply an analysis to the raw document.
    pub fn correct(&self, document: &str, analysis: &Analysis) -> Result<CorrectionOutcome, CheckError> {
        let (parsed, _) = index_raw(document, &self.schema)?;
        let outcome = apply_fixes(&parsed, &analysis.issues, &self.schema);

        let text = if outcome.rolled_back || outcome.applied.is_empty() {
            document.to_string()
        } else {
            serde_json::to_string_pretty(&outcome.document)?
        };

        if !outcome.unresolved.is_empty() {
            tracing::warn!(
                unresolved = outcome.unresolved.len(),
                applied = outcome.applied.len(),
                "some fixes could not be applied"
            );
        }

        Ok(CorrectionOutcome {
            document: text,
            applied: outcome.applied,
            unresolved: outcome.unresolved,
            skipped_skeleton: outcome.skipped_skeleton,
            rolled_back: outcome.rolled_back,
        })
    }

    /// Analyze, then correct.
    pub async fn check(
        &self,
        request: AnalysisRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<CheckOutcome, CheckError> {
        let run = self.analyze(request, cancel).await?;
        let correction = self.correct(request.document, &run.analysis)?;

        let report = CheckReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            document_hash: run.document_hash,
            chunk_count: run.chunk_count,
            degraded_chunks: run.degraded_chunks,
            cache_hit: run.cache_hit,
            counts: run.analysis.counts,
            summary: run.analysis.summary.clone(),
            applied: correction.applied,
            unresolved: correction.unresolved,
            skipped_skeleton: correction.skipped_skeleton,
            rolled_back: correction.rolled_back,
        };

        Ok(CheckOutcome {
            document: correction.document,
            analysis: run.analysis,
            report,
        })
    }

    /// Evict cache entries older than the configured max age.
    pub fn sweep_cache(&self) -> usize {
        let evicted = self.cache.evict_older_than(self.settings.cache_max_age);
        if evicted > 0 {
            tracing::debug!(evicted, "swept analysis cache");
        }
        evicted
    }
}
