//! Analysis cache abstraction.
//!
//! The [`AnalysisCache`] trait maps `(document hash, analysis kind,
//! focus areas)` to a serialized analysis so repeated runs over identical
//! input skip chunking and backend calls entirely. A miss only costs
//! time; it never changes the result.
//!
//! Focus areas are sorted before they become part of the key, so
//! `["media", "timeline"]` and `["timeline", "media"]` hit the same entry.
//!
//! Implementations must be `Send + Sync`: one cache instance is shared by
//! every concurrent run in the process.

pub mod memory;

use sha2::{Digest, Sha256};
use std::time::Duration;

pub use memory::InMemoryCache;

/// SHA-256 of the content, as lowercase hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache key for a hash, kind, and (unordered) focus-area set.
///
/// The parts are encoded as a JSON array, so no separator inside a kind
/// or area can make two distinct requests share a key.
pub fn cache_key(hash: &str, kind: &str, focus_areas: &[String]) -> String {
    let mut areas: Vec<&str> = focus_areas.iter().map(String::as_str).collect();
    areas.sort_unstable();
    serde_json::json!([hash, kind, areas]).to_string()
}

/// Content-hash keyed store of serialized analyses.
pub trait AnalysisCache: Send + Sync {
    fn get(&self, hash: &str, kind: &str, focus_areas: &[String]) -> Option<String>;

    fn put(&self, hash: &str, result: String, kind: &str, focus_areas: &[String]);

    /// Remove entries older than `max_age`. Returns how many were removed.
    fn evict_older_than(&self, max_age: Duration) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
