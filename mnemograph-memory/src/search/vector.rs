//! Vector similarity channel
//!
//! Embeds the query and finds the nearest memory-name vectors, either through
//! the store's similarity primitive or, when the store has none, by scanning
//! every name embedding in process. Both paths apply the same threshold and
//! ordering.

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{MemoryError, Result};
use crate::graph::{GraphStore, ScoredId};
use crate::node::MemoryId;

use super::capability::VectorCapability;

pub(crate) const CHANNEL: &str = "vector";

/// Top-`limit` memories by name similarity ≥ `threshold`
pub async fn search(
    store: &dyn GraphStore,
    embedder: &dyn Embedder,
    capability: VectorCapability,
    query: &str,
    limit: usize,
    threshold: f32,
    types: Option<&[String]>,
) -> Result<Vec<ScoredId>> {
    let embedding = embedder
        .embed(query)
        .map_err(|e| MemoryError::channel(CHANNEL, e.to_string()))?;

    match capability.primitive() {
        Some(primitive) => store
            .nearest_memories(primitive, &embedding, limit, threshold, types)
            .await
            .map_err(|e| MemoryError::channel(CHANNEL, e.to_string())),
        None => {
            let embeddings = store
                .memory_embeddings(types)
                .await
                .map_err(|e| MemoryError::channel(CHANNEL, e.to_string()))?;
            Ok(scan(&embedding, &embeddings, limit, threshold))
        }
    }
}

/// In-process cosine scan
pub fn scan(
    query: &[f32],
    embeddings: &[(MemoryId, Vec<f32>)],
    limit: usize,
    threshold: f32,
) -> Vec<ScoredId> {
    let mut results: Vec<ScoredId> = embeddings
        .iter()
        .map(|(id, vector)| ScoredId::new(*id, cosine_similarity(query, vector)))
        .filter(|scored| scored.score >= threshold)
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(limit);
    results
}
