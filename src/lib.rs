//! # casecheck
//!
//! Chunked quality analysis and precision correction for large generated
//! case documents.
//!
//! A document too large for one analysis call is split into size-bounded
//! chunks. Each chunk is analyzed alongside a compact skeleton of the whole
//! document, at most N chunks at a time, and the per-chunk results are
//! merged into one deduplicated issue list. The issue list is then applied
//! back to the document as targeted edits, which are rolled back as a unit
//! if the edited document fails a structural check.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌──────────────┐
//! │  Document    │──▶│  QualityEngine   │──▶│  Corrected   │
//! │  (JSON)      │   │ plan/fan-out/    │   │  document +  │
//! └──────────────┘   │ merge/edit       │   │  report      │
//!                    └───┬─────────┬───┘   └──────────────┘
//!                        ▼         ▼
//!                   ┌─────────┐ ┌─────────┐
//!                   │ Backend │ │  Cache  │
//!                   └─────────┘ └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! casecheck plan case.json
//! casecheck analyze case.json --focus timeline --output analysis.json
//! casecheck fix case.json --analysis analysis.json --output fixed.json
//! casecheck check case.json --output fixed.json --report report.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`backend`] | Concrete analysis backends |
//! | [`engine`] | Bounded-concurrency analysis and correction |
//! | [`check_cmd`] | CLI command implementations |
//!
//! Pure logic (indexing, planning, merging, caching, editing) lives in
//! [`casecheck_core`].

pub mod backend;
pub mod check_cmd;
pub mod config;
pub mod engine;

pub use casecheck_core;
pub use engine::{AnalysisRequest, AnalysisRun, CheckReport, EngineSettings, QualityEngine};
