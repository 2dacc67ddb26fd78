//! Tag channel
//!
//! Branches on the detected capability and never retries the other mode:
//! keyword substring matching when the store has no similarity primitive,
//! tag-embedding similarity otherwise.

use std::collections::{BTreeMap, BTreeSet};

use crate::embedding::Embedder;
use crate::error::{MemoryError, Result};
use crate::graph::{GraphStore, SimilarityPrimitive};
use crate::node::MemoryId;

use super::capability::VectorCapability;

pub(crate) const CHANNEL: &str = "tags";

/// How a tag hit was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatchMode {
    /// Substring match; `score` is the number of distinct matching tags
    Keyword,
    /// Embedding similarity; `score` is the best tag similarity
    Semantic,
}

/// One memory matched through its tags
#[derive(Debug, Clone, PartialEq)]
pub struct TagHit {
    pub id: MemoryId,
    pub mode: TagMatchMode,
    pub score: f32,
    pub matched_tags: Vec<String>,
}

/// Query tokens longer than two characters, lowercased
pub fn keyword_tokens(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
    {
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }
    tokens
}

pub async fn search(
    store: &dyn GraphStore,
    embedder: &dyn Embedder,
    capability: VectorCapability,
    query: &str,
    limit: usize,
    tag_threshold: f32,
    types: Option<&[String]>,
) -> Result<Vec<TagHit>> {
    let hits = match capability.primitive() {
        None => keyword_search(store, query, limit, types).await,
        Some(primitive) => {
            semantic_search(store, embedder, primitive, query, limit, tag_threshold, types).await
        }
    };
    hits.map_err(|e| MemoryError::channel(CHANNEL, e.to_string()))
}

async fn keyword_search(
    store: &dyn GraphStore,
    query: &str,
    limit: usize,
    types: Option<&[String]>,
) -> Result<Vec<TagHit>> {
    let tokens = keyword_tokens(query);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut matched: BTreeMap<MemoryId, BTreeSet<String>> = BTreeMap::new();
    for row in store.tag_substring_matches(&tokens, types).await? {
        matched.entry(row.memory_id).or_default().insert(row.tag);
    }

    let mut hits: Vec<TagHit> = matched
        .into_iter()
        .map(|(id, tags)| TagHit {
            id,
            mode: TagMatchMode::Keyword,
            score: tags.len() as f32,
            matched_tags: tags.into_iter().collect(),
        })
        .collect();
    sort_hits(&mut hits);
    hits.truncate(limit);
    Ok(hits)
}

async fn semantic_search(
    store: &dyn GraphStore,
    embedder: &dyn Embedder,
    primitive: SimilarityPrimitive,
    query: &str,
    limit: usize,
    tag_threshold: f32,
    types: Option<&[String]>,
) -> Result<Vec<TagHit>> {
    let embedding = embedder.embed(query)?;

    let mut best: BTreeMap<MemoryId, (f32, String)> = BTreeMap::new();
    for row in store.tag_similarities(primitive, &embedding, types).await? {
        let entry = best
            .entry(row.memory_id)
            .or_insert((f32::NEG_INFINITY, String::new()));
        if row.similarity > entry.0 {
            *entry = (row.similarity, row.tag);
        }
    }

    let mut hits: Vec<TagHit> = best
        .into_iter()
        .filter(|(_, (similarity, _))| *similarity >= tag_threshold)
        .map(|(id, (similarity, tag))| TagHit {
            id,
            mode: TagMatchMode::Semantic,
            score: similarity,
            matched_tags: vec![tag],
        })
        .collect();
    sort_hits(&mut hits);
    hits.truncate(limit);
    Ok(hits)
}

fn sort_hits(hits: &mut [TagHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MemoryRecord;
    use crate::search::mock::{MockGraphStore, StubEmbedder};

    fn tagged(name: &str, tags: &[&str]) -> MemoryRecord {
        MemoryRecord::builder()
            .name(name)
            .memory_type("note")
            .tags(tags.iter().map(|t| t.to_string()).collect())
            .build()
            .unwrap()
    }

    #[test]
    fn test_keyword_tokens() {
        assert_eq!(keyword_tokens("Deploy to k8s via CI"), vec!["deploy", "k8s", "via"]);
        assert!(keyword_tokens("a b cd").is_empty());
    }

    #[tokio::test]
    async fn test_keyword_ranks_by_distinct_tags() {
        let one = tagged("one", &["docker"]);
        let two = tagged("two", &["docker", "docker-compose", "kubernetes"]);
        let (one_id, two_id) = (one.id, two.id);
        let store = MockGraphStore::new().with_record(one).with_record(two);
        let embedder = StubEmbedder::new(3);

        let hits = search(&store, &embedder, VectorCapability::None, "docker", 10, 0.6, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, two_id);
        assert_eq!(hits[0].score, 2.0);
        assert_eq!(hits[1].id, one_id);
        assert!(hits.iter().all(|h| h.mode == TagMatchMode::Keyword));
        // Keyword mode never embeds
        assert_eq!(embedder.calls(), 0);
        assert_eq!(store.call_count("tag_similarities"), 0);
    }

    #[tokio::test]
    async fn test_short_tokens_match_nothing() {
        let store = MockGraphStore::new().with_record(tagged("one", &["ci"]));
        let embedder = StubEmbedder::new(3);
        let hits = search(&store, &embedder, VectorCapability::None, "ci", 10, 0.6, None)
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(store.call_count("tag_substring_matches"), 0);
    }

    #[tokio::test]
    async fn test_semantic_uses_best_tag_and_threshold() {
        let close = tagged("close", &["pets", "vehicles"]);
        let far = tagged("far", &["vehicles"]);
        let close_id = close.id;
        let store = MockGraphStore::new()
            .with_primitives(true, false)
            .with_record(close)
            .with_record(far)
            .with_tag_vector("pets", vec![1.0, 0.0, 0.0])
            .with_tag_vector("vehicles", vec![0.0, 1.0, 0.0]);
        let embedder = StubEmbedder::new(3).with("animal", vec![0.9, 0.1, 0.0]);

        let hits = search(&store, &embedder, VectorCapability::Full, "animal", 10, 0.6, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, close_id);
        assert_eq!(hits[0].mode, TagMatchMode::Semantic);
        assert_eq!(hits[0].matched_tags, vec!["pets".to_string()]);
        assert_eq!(store.call_count("tag_substring_matches"), 0);
    }

    #[tokio::test]
    async fn test_semantic_failure_does_not_fall_back() {
        let store = MockGraphStore::new()
            .with_primitives(true, false)
            .with_record(tagged("one", &["docker"]))
            .failing("tag_similarities");
        let embedder = StubEmbedder::new(3);
        let err = search(&store, &embedder, VectorCapability::Full, "docker", 10, 0.6, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Channel { channel: "tags", .. }));
        assert_eq!(store.call_count("tag_substring_matches"), 0);
    }
}
