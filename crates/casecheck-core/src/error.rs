//! Error types shared by the core pipeline.
//!
//! Only [`CheckError`] aborts a run. Field-path and fix failures are
//! recorded per issue and surfaced as diagnostics.

use thiserror::Error;

/// Run-level failure.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The input could not be parsed as a structured document.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// The caller cancelled the run before the merge completed.
    #[error("analysis run cancelled")]
    Cancelled,

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A field path that could not be parsed or resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty field path")]
    Empty,

    #[error("invalid field path segment '{0}'")]
    InvalidSegment(String),

    #[error("field path '{path}' not found at segment '{segment}'")]
    NotFound { path: String, segment: String },
}

/// Reason a single fix could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixError {
    #[error("issue targets the skeleton, not a record")]
    PseudoRecord,

    #[error("record '{0}' not found")]
    RecordNotFound(String),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("target field '{0}' is not text")]
    NotText(String),

    #[error("fix is missing {0}")]
    MissingValue(&'static str),

    #[error("text to replace not found in '{0}'")]
    NoMatch(String),

    #[error("unknown fix action '{0}'")]
    UnknownAction(String),
}
