//! In-memory `GraphStore` and embedder doubles for search tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{MemoryError, Result};
use crate::graph::{
    ChildRow, GraphStore, PathDirection, PathRow, ScoredId, SimilarityPrimitive, TagMatchRow,
    TagSimilarityRow,
};
use crate::node::{MemoryId, MemoryRecord, Observation, Relation};

/// Embedder backed by a fixed word → vector table
pub(crate) struct StubEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dimensions: usize,
    fail: bool,
    pub calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimensions,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_lowercase(), vector);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MemoryError::embedding("embedding service unavailable"));
        }
        if text.trim().is_empty() {
            return Err(MemoryError::embedding("cannot embed empty text"));
        }
        Ok(self
            .vectors
            .get(&text.trim().to_lowercase())
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimensions]))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Configurable fake graph backend
#[derive(Default)]
pub(crate) struct MockGraphStore {
    records: Vec<MemoryRecord>,
    observations: HashMap<MemoryId, Vec<Observation>>,
    relations: Vec<Relation>,
    tag_vectors: HashMap<String, Vec<f32>>,
    native: bool,
    library: bool,
    fulltext: bool,
    wide_hops: bool,
    null_rows: bool,
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockGraphStore {
    pub fn new() -> Self {
        Self {
            fulltext: true,
            ..Default::default()
        }
    }

    /// Add a record; `embedding` becomes its name vector
    pub fn with_record(mut self, record: MemoryRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn with_observation(mut self, id: MemoryId, content: &str) -> Self {
        let observation = Observation::new(content).unwrap();
        self.observations.entry(id).or_default().push(observation);
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_tag_vector(mut self, tag: &str, vector: Vec<f32>) -> Self {
        self.tag_vectors.insert(tag.to_string(), vector);
        self
    }

    pub fn with_primitives(mut self, native: bool, library: bool) -> Self {
        self.native = native;
        self.library = library;
        self
    }

    pub fn without_fulltext(mut self) -> Self {
        self.fulltext = false;
        self
    }

    /// Emit hop counts as `{"low": n, "high": 0}`
    pub fn with_wide_hops(mut self) -> Self {
        self.wide_hops = true;
        self
    }

    /// Emit an extra outer-join row with no related id per anchor
    pub fn with_null_rows(mut self) -> Self {
        self.null_rows = true;
        self
    }

    /// Make the named trait method fail
    pub fn failing(mut self, method: &'static str) -> Self {
        self.failing.insert(method);
        self
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|m| **m == method).count()
    }

    fn load(&self, ids: &[MemoryId], include_observations: bool) -> Vec<MemoryRecord> {
        ids.iter()
            .filter_map(|id| self.record(id))
            .map(|r| {
                let mut record = r.clone();
                record.embedding = None;
                if include_observations {
                    record.observations =
                        self.observations.get(&r.id).cloned().unwrap_or_default();
                }
                record
            })
            .collect()
    }

    fn enter(&self, method: &'static str) -> Result<()> {
        self.calls.lock().push(method);
        if self.failing.contains(method) {
            return Err(MemoryError::other(format!("{} failed", method)));
        }
        Ok(())
    }

    fn supports(&self, primitive: SimilarityPrimitive) -> Result<()> {
        let ok = match primitive {
            SimilarityPrimitive::Native => self.native,
            SimilarityPrimitive::Library => self.library,
        };
        if ok {
            Ok(())
        } else {
            Err(MemoryError::probe(format!("no {} primitive", primitive)))
        }
    }

    fn filtered<'a>(
        &'a self,
        types: Option<&'a [String]>,
    ) -> impl Iterator<Item = &'a MemoryRecord> + 'a {
        self.records.iter().filter(move |r| r.matches_types(types))
    }

    fn record(&self, id: &MemoryId) -> Option<&MemoryRecord> {
        self.records.iter().find(|r| r.id == *id)
    }

    fn hop_value(&self, hops: u32) -> Value {
        if self.wide_hops {
            json!({"low": hops, "high": 0})
        } else {
            json!(hops)
        }
    }

    fn row(
        &self,
        anchor: MemoryId,
        direction: PathDirection,
        related: MemoryId,
        first: &Relation,
        hops: u32,
    ) -> PathRow {
        let record = self.record(&related);
        PathRow {
            anchor,
            direction,
            related_id: Some(related),
            related_name: record.map(|r| r.name.clone()),
            related_type: record.map(|r| r.memory_type.clone()),
            relation_type: Some(first.relation_type.clone()),
            hops: self.hop_value(hops),
            strength: first.strength,
            source: first.source.clone(),
            created_at: Some(first.created_at),
        }
    }

    fn edges(&self, id: MemoryId, direction: PathDirection) -> Vec<(MemoryId, &Relation)> {
        self.relations
            .iter()
            .filter_map(|r| match direction {
                PathDirection::Ancestor if r.to == id => Some((r.from, r)),
                PathDirection::Descendant if r.from == id => Some((r.to, r)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn probe(&self, primitive: SimilarityPrimitive) -> Result<()> {
        self.enter("probe")?;
        self.supports(primitive)
    }

    async fn nearest_memories(
        &self,
        primitive: SimilarityPrimitive,
        query: &[f32],
        limit: usize,
        threshold: f32,
        types: Option<&[String]>,
    ) -> Result<Vec<ScoredId>> {
        self.enter("nearest_memories")?;
        self.supports(primitive)?;
        let mut results: Vec<ScoredId> = self
            .filtered(types)
            .filter_map(|r| {
                let vector = r.embedding.as_ref()?;
                Some(ScoredId::new(r.id, cosine_similarity(query, vector)))
            })
            .filter(|s| s.score >= threshold)
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        results.truncate(limit);
        Ok(results)
    }

    async fn memory_embeddings(
        &self,
        types: Option<&[String]>,
    ) -> Result<Vec<(MemoryId, Vec<f32>)>> {
        self.enter("memory_embeddings")?;
        Ok(self
            .filtered(types)
            .filter_map(|r| Some((r.id, r.embedding.clone()?)))
            .collect())
    }

    async fn exact_metadata_matches(
        &self,
        query: &str,
        limit: usize,
        types: Option<&[String]>,
    ) -> Result<Vec<MemoryId>> {
        self.enter("exact_metadata_matches")?;
        let needle = query.to_lowercase();
        Ok(self
            .filtered(types)
            .filter(|r| r.metadata_scalars().any(|v| v.to_lowercase() == needle))
            .map(|r| r.id)
            .take(limit)
            .collect())
    }

    async fn fulltext_matches(
        &self,
        query: &str,
        limit: usize,
        types: Option<&[String]>,
    ) -> Result<Option<Vec<ScoredId>>> {
        self.enter("fulltext_matches")?;
        if !self.fulltext {
            return Ok(None);
        }
        let needle = query.to_lowercase();
        Ok(Some(
            self.filtered(types)
                .filter(|r| {
                    let mut record = (*r).clone();
                    record.observations =
                        self.observations.get(&r.id).cloned().unwrap_or_default();
                    record.fulltext_document().to_lowercase().contains(&needle)
                })
                .map(|r| ScoredId::new(r.id, 1.0))
                .take(limit)
                .collect(),
        ))
    }

    async fn tag_substring_matches(
        &self,
        tokens: &[String],
        types: Option<&[String]>,
    ) -> Result<Vec<TagMatchRow>> {
        self.enter("tag_substring_matches")?;
        let mut rows = Vec::new();
        for record in self.filtered(types) {
            for tag in &record.tags {
                if tokens.iter().any(|t| tag.contains(t.as_str())) {
                    rows.push(TagMatchRow {
                        memory_id: record.id,
                        tag: tag.clone(),
                    });
                }
            }
        }
        Ok(rows)
    }

    async fn tag_similarities(
        &self,
        primitive: SimilarityPrimitive,
        query: &[f32],
        types: Option<&[String]>,
    ) -> Result<Vec<TagSimilarityRow>> {
        self.enter("tag_similarities")?;
        self.supports(primitive)?;
        let mut rows = Vec::new();
        for record in self.filtered(types) {
            for tag in &record.tags {
                if let Some(vector) = self.tag_vectors.get(tag) {
                    rows.push(TagSimilarityRow {
                        memory_id: record.id,
                        tag: tag.clone(),
                        similarity: cosine_similarity(query, vector),
                    });
                }
            }
        }
        Ok(rows)
    }

    async fn fetch_memories(
        &self,
        ids: &[MemoryId],
        include_observations: bool,
    ) -> Result<Vec<MemoryRecord>> {
        self.enter("fetch_memories")?;
        Ok(self.load(ids, include_observations))
    }

    async fn peek_memories(
        &self,
        ids: &[MemoryId],
        include_observations: bool,
    ) -> Result<Vec<MemoryRecord>> {
        self.enter("peek_memories")?;
        Ok(self.load(ids, include_observations))
    }

    async fn related_paths(&self, ids: &[MemoryId], max_hops: u32) -> Result<Vec<PathRow>> {
        self.enter("related_paths")?;
        let mut rows = Vec::new();
        for &anchor in ids {
            for direction in [PathDirection::Ancestor, PathDirection::Descendant] {
                if self.null_rows {
                    rows.push(PathRow {
                        anchor,
                        direction,
                        related_id: None,
                        related_name: None,
                        related_type: None,
                        relation_type: None,
                        hops: Value::Null,
                        strength: None,
                        source: None,
                        created_at: None,
                    });
                }
                let mut frontier: Vec<(MemoryId, &Relation)> = Vec::new();
                for (next, edge) in self.edges(anchor, direction) {
                    rows.push(self.row(anchor, direction, next, edge, 1));
                    frontier.push((next, edge));
                }
                for hop in 2..=max_hops {
                    let mut next_frontier = Vec::new();
                    for (node, first) in &frontier {
                        for (next, _) in self.edges(*node, direction) {
                            rows.push(self.row(anchor, direction, next, first, hop));
                            next_frontier.push((next, *first));
                        }
                    }
                    frontier = next_frontier;
                }
            }
        }
        Ok(rows)
    }

    async fn root_memories(
        &self,
        limit: usize,
        types: Option<&[String]>,
    ) -> Result<Vec<MemoryRecord>> {
        self.enter("root_memories")?;
        Ok(self
            .filtered(types)
            .filter(|r| !self.relations.iter().any(|rel| rel.to == r.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn child_edges(
        &self,
        parents: &[MemoryId],
        types: Option<&[String]>,
    ) -> Result<Vec<ChildRow>> {
        self.enter("child_edges")?;
        Ok(parents
            .iter()
            .flat_map(|parent| self.edges(*parent, PathDirection::Descendant))
            .filter_map(|(child, edge)| {
                let child = self.record(&child)?;
                child.matches_types(types).then(|| ChildRow {
                    parent: edge.from,
                    relation_type: edge.relation_type.clone(),
                    child: child.clone(),
                })
            })
            .collect())
    }
}

/// Record with a fixed name vector
pub(crate) fn memory(name: &str, memory_type: &str, embedding: Vec<f32>) -> MemoryRecord {
    MemoryRecord::builder()
        .name(name)
        .memory_type(memory_type)
        .embedding(embedding)
        .build()
        .unwrap()
}
