//! CLI commands: `plan`, `analyze`, `fix`, and `check`.
//!
//! Each command reads the document from disk, drives a [`QualityEngine`],
//! and writes its document-shaped result to `--output` or stdout. Status
//! lines go to stdout when the result goes to a file, and to stderr
//! otherwise, so piping the result stays clean.

use anyhow::{Context, Result};
use casecheck_core::cache::{AnalysisCache, InMemoryCache};
use casecheck_core::repair::parse_analysis;
use casecheck_core::Analysis;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::backend::DisabledBackend;
use crate::config::Config;
use crate::engine::{AnalysisRequest, EngineSettings, QualityEngine};

/// Arguments shared by `analyze` and `check`.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeArgs {
    pub document: PathBuf,
    pub prior: Option<PathBuf>,
    pub focus: Vec<String>,
    pub output: Option<PathBuf>,
}

/// Print the chunk plan without calling the backend.
pub fn run_plan(config: &Config, document: &Path) -> Result<()> {
    let raw = read_document(document)?;
    let engine = QualityEngine::new(
        Arc::new(DisabledBackend),
        Arc::new(InMemoryCache::new()),
        EngineSettings::from(&config.engine),
        config.schema.clone(),
    );
    let plan = engine.plan(AnalysisRequest::new(&raw))?;
    let index = &plan.index;

    println!("plan");
    println!("  document: {}", document.display());
    println!(
        "  records: {} ({} {}, {} {})",
        index.record_count(),
        index.text.len(),
        config.schema.text_collection,
        index.media.len(),
        config.schema.media_collection
    );
    println!("  skeleton bytes: {}", plan.budget.skeleton_bytes);
    println!(
        "  chunk budget: {} bytes{}",
        plan.budget.available(),
        if plan.budget.is_fallback() {
            " (minimum, skeleton exceeds call budget)"
        } else {
            ""
        }
    );
    println!("  chunks: {}", plan.chunks.len());
    for chunk in &plan.chunks {
        println!(
            "    chunk {}: {} records, {} bytes",
            chunk.index,
            chunk.records.len(),
            chunk.record_bytes
        );
    }
    Ok(())
}

/// Analyze a document and emit the merged analysis as JSON.
pub async fn run_analyze(
    config: &Config,
    args: &AnalyzeArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let raw = read_document(&args.document)?;
    let prior = read_prior(args.prior.as_deref())?;
    let engine = build_engine(config)?;

    let request = AnalysisRequest {
        document: &raw,
        prior_analysis: prior.as_deref(),
        focus_areas: &args.focus,
    };
    let run = engine.analyze(request, cancel).await?;

    let json = serde_json::to_string_pretty(&run.analysis)?;
    let to_file = emit(args.output.as_deref(), &json)?;

    status(to_file, "analyze");
    status(to_file, format!("  hash: {}", &run.document_hash[..12]));
    if run.cache_hit {
        status(to_file, "  cache: hit");
    } else {
        status(to_file, format!("  chunks: {}", run.chunk_count));
        status(to_file, format!("  degraded chunks: {}", run.degraded_chunks));
    }
    print_counts(to_file, &run.analysis);
    Ok(())
}

/// Apply a saved analysis to a document.
pub fn run_fix(
    config: &Config,
    document: &Path,
    analysis_path: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let raw = read_document(document)?;
    let analysis_text = std::fs::read_to_string(analysis_path)
        .with_context(|| format!("Failed to read analysis: {}", analysis_path.display()))?;
    let analysis = parse_analysis(&analysis_text)
        .with_context(|| format!("Not a valid analysis: {}", analysis_path.display()))?;

    let engine = QualityEngine::new(
        Arc::new(DisabledBackend),
        Arc::new(InMemoryCache::new()),
        EngineSettings::from(&config.engine),
        config.schema.clone(),
    );
    let outcome = engine.correct(&raw, &analysis)?;
    let to_file = emit(output, &outcome.document)?;

    status(to_file, "fix");
    status(to_file, format!("  issues: {}", analysis.issues.len()));
    status(to_file, format!("  applied: {}", outcome.applied.len()));
    status(to_file, format!("  skeleton issues skipped: {}", outcome.skipped_skeleton));
    if outcome.rolled_back {
        status(to_file, "  rolled back: structural check failed, document unchanged");
    }
    for unresolved in &outcome.unresolved {
        status(
            to_file,
            format!("  unresolved {}: {}", unresolved.issue_id, unresolved.reason),
        );
    }
    Ok(())
}

/// Analyze then correct, optionally writing a JSON report.
pub async fn run_check(
    config: &Config,
    args: &AnalyzeArgs,
    report_path: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let raw = read_document(&args.document)?;
    let prior = read_prior(args.prior.as_deref())?;
    let engine = build_engine(config)?;

    let request = AnalysisRequest {
        document: &raw,
        prior_analysis: prior.as_deref(),
        focus_areas: &args.focus,
    };
    let outcome = engine.check(request, cancel).await?;
    let report = &outcome.report;

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }

    let to_file = emit(args.output.as_deref(), &outcome.document)?;

    status(to_file, "check");
    status(to_file, format!("  run: {}", report.run_id));
    status(
        to_file,
        format!(
            "  chunks: {} (degraded {}){}",
            report.chunk_count,
            report.degraded_chunks,
            if report.cache_hit { ", cache hit" } else { "" }
        ),
    );
    print_counts(to_file, &outcome.analysis);
    status(to_file, format!("  applied: {}", report.applied.len()));
    status(to_file, format!("  unresolved: {}", report.unresolved.len()));
    if report.rolled_back {
        status(to_file, "  rolled back: structural check failed, document unchanged");
    }
    if !report.summary.is_empty() {
        status(to_file, format!("  summary: {}", report.summary));
    }
    Ok(())
}

fn build_engine(config: &Config) -> Result<QualityEngine> {
    let cache: Arc<dyn AnalysisCache> = Arc::new(InMemoryCache::new());
    let engine = QualityEngine::from_config(config, cache)?;
    engine.sweep_cache();
    Ok(engine)
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))
}

fn read_prior(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read prior analysis: {}", p.display()))
    })
    .transpose()
}

/// Write `text` to `output`, or stdout when unset. Returns true for a file.
fn emit(output: Option<&Path>, text: &str) -> Result<bool> {
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            Ok(true)
        }
        None => {
            println!("{}", text);
            Ok(false)
        }
    }
}

fn status(to_file: bool, line: impl AsRef<str>) {
    if to_file {
        println!("{}", line.as_ref());
    } else {
        eprintln!("{}", line.as_ref());
    }
}

fn print_counts(to_file: bool, analysis: &Analysis) {
    status(
        to_file,
        format!(
            "  issues: {} (high {}, medium {}, low {})",
            analysis.counts.total(),
            analysis.counts.high,
            analysis.counts.medium,
            analysis.counts.low
        ),
    );
}
