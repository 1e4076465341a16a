//! Greedy bin-packing chunk planner.
//!
//! Partitions indexed records into [`Chunk`]s whose serialized record size
//! plus the skeleton stays within a per-call byte budget. Records are
//! never split; a record larger than the available budget gets a chunk to
//! itself.
//!
//! # Algorithm
//!
//! 1. `available = max_bytes_per_call − skeleton_bytes − overhead_bytes`.
//!    If that is zero or negative, fall back to `min_chunk_bytes`.
//! 2. Walk text records in document order, accumulating into the current
//!    chunk. When the next record would push the chunk past `available`,
//!    close the chunk and open a new one.
//! 3. Continue with media records, filling the chunk left open by step 2.
//! 4. Guarantee at least one chunk (an empty document yields one empty
//!    chunk so the pipeline always produces a result).
//!
//! # Example
//!
//! ```rust
//! use casecheck_core::index::index_document;
//! use casecheck_core::models::DocumentSchema;
//! use casecheck_core::plan::{plan_chunks, ChunkBudget};
//!
//! let doc = serde_json::json!({"documents": [{"id": "a"}, {"id": "b"}]});
//! let index = index_document(&doc, &DocumentSchema::default()).unwrap();
//! let chunks = plan_chunks(&index, &ChunkBudget::new(60_000, index.skeleton.serialized_len()));
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].records.len(), 2);
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::index::DocumentIndex;
use crate::models::RecordKind;

/// Default per-call byte budget.
pub const DEFAULT_MAX_BYTES_PER_CALL: usize = 60_000;
/// Default bytes reserved for prompt text around the scoped view.
pub const DEFAULT_OVERHEAD_BYTES: usize = 2_000;
/// Default budget used when the skeleton alone exhausts the call budget.
pub const DEFAULT_MIN_CHUNK_BYTES: usize = 10_000;

/// Byte budget for one planning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBudget {
    pub max_bytes_per_call: usize,
    pub skeleton_bytes: usize,
    pub overhead_bytes: usize,
    pub min_chunk_bytes: usize,
}

impl ChunkBudget {
    /// Budget with the default overhead and fallback.
    pub fn new(max_bytes_per_call: usize, skeleton_bytes: usize) -> Self {
        Self {
            max_bytes_per_call,
            skeleton_bytes,
            overhead_bytes: DEFAULT_OVERHEAD_BYTES,
            min_chunk_bytes: DEFAULT_MIN_CHUNK_BYTES,
        }
    }

    /// Bytes available for records in each chunk.
    pub fn available(&self) -> usize {
        let reserved = self.skeleton_bytes + self.overhead_bytes;
        if self.max_bytes_per_call > reserved {
            self.max_bytes_per_call - reserved
        } else {
            self.min_chunk_bytes
        }
    }

    /// True when the skeleton leaves no room and the fallback applies.
    pub fn is_fallback(&self) -> bool {
        self.max_bytes_per_call <= self.skeleton_bytes + self.overhead_bytes
    }
}

/// Address of one record inside the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecordRef {
    pub kind: RecordKind,
    pub id: String,
}

/// One partition of the document's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the plan, starting at 0.
    pub index: usize,
    pub records: Vec<RecordRef>,
    /// Serialized size of the records in this chunk.
    pub record_bytes: usize,
}

impl Chunk {
    fn new(index: usize) -> Self {
        Self {
            index,
            records: Vec::new(),
            record_bytes: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Serialized size of a record in bytes.
pub fn record_size(record: &Value) -> usize {
    serde_json::to_string(record).map(|s| s.len()).unwrap_or(0)
}

/// Plan chunks for an indexed document. Never returns an empty list.
pub fn plan_chunks(index: &DocumentIndex, budget: &ChunkBudget) -> Vec<Chunk> {
    let available = budget.available();
    if budget.is_fallback() {
        tracing::warn!(
            skeleton_bytes = budget.skeleton_bytes,
            max_bytes_per_call = budget.max_bytes_per_call,
            fallback = available,
            "skeleton exceeds call budget, using fallback chunk budget"
        );
    }

    let mut chunks = Vec::new();
    let mut current = Chunk::new(0);

    for kind in RecordKind::ALL {
        for (id, record) in index.records(kind).iter() {
            let size = record_size(record);
            if !current.is_empty() && current.record_bytes + size > available {
                let next = Chunk::new(current.index + 1);
                chunks.push(std::mem::replace(&mut current, next));
            }
            current.records.push(RecordRef {
                kind,
                id: id.to_string(),
            });
            current.record_bytes += size;
        }
    }

    // Flush the open chunk; for an empty document this is the one empty chunk.
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }

    chunks
}
