//! Storage collaborator contract
//!
//! The search core never talks to RocksDB (or any other backend) directly.
//! It needs a narrow set of read operations: similarity search over name
//! vectors, exact and fulltext metadata matching, tag matching, record
//! materialization and bounded-hop path traversal. [`GraphStore`] is that
//! contract; [`crate::MemoryStore`] is the bundled implementation.
//!
//! Numeric values that a backend may wrap in its own wide-integer
//! representation (hop counts) cross this boundary as raw JSON and are
//! normalized with [`to_plain_int`] before anything above it looks at them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::node::{MemoryId, MemoryRecord};

/// Similarity primitive a backend can evaluate on its side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimilarityPrimitive {
    /// Built-in vector function / index
    Native,
    /// Generic similarity library function
    Library,
}

impl std::fmt::Display for SimilarityPrimitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Library => write!(f, "library"),
        }
    }
}

/// Memory id with a similarity or relevance score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredId {
    pub id: MemoryId,
    pub score: f32,
}

impl ScoredId {
    pub fn new(id: MemoryId, score: f32) -> Self {
        Self { id, score }
    }
}

/// A tag that matched a keyword
#[derive(Debug, Clone, PartialEq)]
pub struct TagMatchRow {
    pub memory_id: MemoryId,
    pub tag: String,
}

/// Similarity between the query and one tag of a memory
#[derive(Debug, Clone, PartialEq)]
pub struct TagSimilarityRow {
    pub memory_id: MemoryId,
    pub tag: String,
    pub similarity: f32,
}

/// Which way a path runs relative to the anchor memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathDirection {
    /// Path ends at the anchor
    Ancestor,
    /// Path starts at the anchor
    Descendant,
}

/// One traversal row as produced by the backend
///
/// Outer-join style traversals may produce rows whose related side is
/// empty; `related_id` is therefore optional.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRow {
    pub anchor: MemoryId,
    pub direction: PathDirection,
    pub related_id: Option<MemoryId>,
    pub related_name: Option<String>,
    pub related_type: Option<String>,
    /// Type of the relation adjacent to the anchor
    pub relation_type: Option<String>,
    /// Hop count in the backend's native integer representation
    pub hops: Value,
    pub strength: Option<f32>,
    pub source: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A parent → child edge with the child materialized
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRow {
    pub parent: MemoryId,
    pub relation_type: String,
    pub child: MemoryRecord,
}

/// Read operations the search core requires from a graph backend
///
/// Every `types` argument is an optional memory-type filter; `None` or an
/// empty slice means "all types".
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Cheap no-op call exercising a similarity primitive.
    ///
    /// Any error means the primitive is unavailable.
    async fn probe(&self, primitive: SimilarityPrimitive) -> Result<()>;

    /// Top-`limit` memories whose name embedding has similarity ≥ `threshold`
    /// to `query`, evaluated with `primitive`, ordered by similarity descending.
    async fn nearest_memories(
        &self,
        primitive: SimilarityPrimitive,
        query: &[f32],
        limit: usize,
        threshold: f32,
        types: Option<&[String]>,
    ) -> Result<Vec<ScoredId>>;

    /// Every stored name embedding
    async fn memory_embeddings(&self, types: Option<&[String]>)
        -> Result<Vec<(MemoryId, Vec<f32>)>>;

    /// Memories with a top-level scalar metadata value equal to `query`
    /// (case-insensitive)
    async fn exact_metadata_matches(
        &self,
        query: &str,
        limit: usize,
        types: Option<&[String]>,
    ) -> Result<Vec<MemoryId>>;

    /// Fulltext index matches, best first. `Ok(None)` when the backend has
    /// no fulltext index.
    async fn fulltext_matches(
        &self,
        query: &str,
        limit: usize,
        types: Option<&[String]>,
    ) -> Result<Option<Vec<ScoredId>>>;

    /// Tags containing any of `tokens` (case-insensitive substring)
    async fn tag_substring_matches(
        &self,
        tokens: &[String],
        types: Option<&[String]>,
    ) -> Result<Vec<TagMatchRow>>;

    /// Similarity between `query` and every stored tag embedding
    async fn tag_similarities(
        &self,
        primitive: SimilarityPrimitive,
        query: &[f32],
        types: Option<&[String]>,
    ) -> Result<Vec<TagSimilarityRow>>;

    /// Materialize records (refreshing their last-accessed time). Unknown
    /// ids are skipped.
    async fn fetch_memories(
        &self,
        ids: &[MemoryId],
        include_observations: bool,
    ) -> Result<Vec<MemoryRecord>>;

    /// Read records without recording an access. Unknown ids are skipped.
    async fn peek_memories(
        &self,
        ids: &[MemoryId],
        include_observations: bool,
    ) -> Result<Vec<MemoryRecord>>;

    /// Directed paths of 1..=`max_hops` edges ending at (ancestors) or
    /// starting at (descendants) each id, in a deterministic order.
    async fn related_paths(&self, ids: &[MemoryId], max_hops: u32) -> Result<Vec<PathRow>>;

    /// First `limit` memories without incoming relations, in a deterministic
    /// order, materialized
    async fn root_memories(
        &self,
        limit: usize,
        types: Option<&[String]>,
    ) -> Result<Vec<MemoryRecord>>;

    /// Outgoing edges of `parents`; children are peeked, not materialized
    async fn child_edges(
        &self,
        parents: &[MemoryId],
        types: Option<&[String]>,
    ) -> Result<Vec<ChildRow>>;
}

/// Normalize a backend integer to a plain `i64`
///
/// Accepts JSON numbers (integral floats included), numeric strings and the
/// `{"low": .., "high": ..}` 64-bit wrapper some drivers emit.
pub fn to_plain_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Object(map) => {
            let low = map.get("low").and_then(Value::as_i64)?;
            let high = map.get("high").and_then(Value::as_i64).unwrap_or(0);
            Some((high << 32) | (low as u32 as i64))
        }
        _ => None,
    }
}
