//! # casecheck core
//!
//! Runtime-free logic for the casecheck quality-control stage: document
//! indexing, size-bounded chunk planning, per-chunk analysis against an
//! abstract [`analyze::AnalysisBackend`], result merging, a content-hash
//! keyed analysis cache, and the precision editor that applies fixes back
//! into the document.
//!
//! This crate contains no tokio, network, or filesystem dependencies. The
//! bounded-concurrency fan-out, configuration, and concrete backends live
//! in the `casecheck` app crate.
//!
//! ## Pipeline
//!
//! ```text
//! raw JSON ──▶ index ──▶ plan ──▶ analyze (per chunk) ──▶ merge ──▶ edit
//!                                     ▲                     │
//!                                     └──── cache ◀─────────┘
//! ```

pub mod analyze;
pub mod cache;
pub mod edit;
pub mod error;
pub mod index;
pub mod merge;
pub mod models;
pub mod path;
pub mod plan;
pub mod repair;

pub use error::CheckError;
pub use models::{Analysis, DocumentSchema, Issue, Priority, RecordKind};
