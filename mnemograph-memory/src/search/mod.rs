//! Multi-channel search engine
//!
//! A query is classified first. Wildcards get a hierarchical summary; every
//! other query fans out to independent channels (vector similarity,
//! exact/fulltext metadata, tags) that run concurrently. Their outputs are
//! merged into one composite score per memory, thresholded, ranked and
//! optionally enriched with nearby graph context.
//!
//! A failing channel is logged and contributes nothing. Failures after the
//! channels (materialization, scoring) propagate to the caller.

mod capability;
mod context;
mod intent;
mod metadata;
#[cfg(test)]
pub(crate) mod mock;
mod scoring;
mod tags;
mod vector;
mod wildcard;

pub use capability::{CapabilityCache, VectorCapability};
pub use context::{GraphContext, RelatedMemory};
pub use intent::{classify, IntentType, QueryIntent};
pub use metadata::MetadataHits;
pub use scoring::{
    merge, rank, record_bonus, ChannelOutputs, MatchType, ScoringBonuses, ScoringWeights,
    SearchCandidate,
};
pub use tags::{keyword_tokens, TagHit, TagMatchMode};
pub use vector::scan as vector_scan;
pub use wildcard::ChildSummary;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::embedding::Embedder;
use crate::error::{MemoryError, Result};
use crate::graph::GraphStore;
use crate::node::{MemoryId, MemoryRecord};

/// Search configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Results returned when the request gives no limit (default: 10)
    pub default_limit: usize,
    /// Minimum composite score when the request gives none (default: 0.1)
    pub default_threshold: f32,
    /// Channels fetch `limit × candidate_multiplier` candidates (default: 3)
    pub candidate_multiplier: usize,
    /// Minimum best-tag similarity in semantic tag mode (default: 0.6)
    pub tag_threshold: f32,
    /// Wildcard summary size when the request gives no limit (default: 20)
    pub wildcard_target: usize,
    /// Traversal depth for graph context (default: 2)
    pub max_hops: u32,
    /// Ancestors and descendants kept per result (default: 3)
    pub related_per_direction: usize,
    pub weights: ScoringWeights,
    pub bonuses: ScoringBonuses,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            default_threshold: 0.1,
            candidate_multiplier: 3,
            tag_threshold: 0.6,
            wildcard_target: 20,
            max_hops: 2,
            related_per_direction: 3,
            weights: ScoringWeights::default(),
            bonuses: ScoringBonuses::default(),
        }
    }
}

impl SearchConfig {
    /// Reject unusable configurations
    pub fn validate(&self) -> Result<()> {
        if self.default_limit == 0 || self.wildcard_target == 0 {
            return Err(MemoryError::invalid_argument(
                "default limit and wildcard target must be positive",
            ));
        }
        if self.candidate_multiplier == 0 {
            return Err(MemoryError::invalid_argument(
                "candidate multiplier must be positive",
            ));
        }
        for (name, value) in [
            ("default threshold", self.default_threshold),
            ("tag threshold", self.tag_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MemoryError::invalid_argument(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        scoring::validate_weights(&self.weights, &self.bonuses)
    }
}

/// Parameters of one search call
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub include_graph_context: bool,
    /// Restrict to these memory types; empty means all
    pub memory_types: Option<Vec<String>>,
    pub threshold: Option<f32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            include_graph_context: true,
            memory_types: None,
            threshold: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn memory_types(mut self, types: Vec<String>) -> Self {
        self.memory_types = Some(types);
        self
    }

    pub fn graph_context(mut self, include: bool) -> Self {
        self.include_graph_context = include;
        self
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    #[serde(flatten)]
    pub memory: MemoryRecord,
    /// Composite score in [0, 1]
    pub score: f32,
    pub match_type: MatchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<GraphContext>,
    /// Direct children (wildcard summaries only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ChildSummary>>,
}

impl RankedResult {
    pub fn new(memory: MemoryRecord, score: f32, match_type: MatchType) -> Self {
        Self {
            memory,
            score,
            match_type,
            related: None,
            children: None,
        }
    }
}

/// Search façade over a graph store and an embedder
pub struct MemorySearch {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    config: SearchConfig,
    capability: Arc<CapabilityCache>,
}

impl MemorySearch {
    /// Create a search engine with default configuration and the process-wide
    /// capability cache
    pub fn new(store: Arc<dyn GraphStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            config: SearchConfig::default(),
            capability: CapabilityCache::global(),
        }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Use a private capability cache instead of the process-wide one
    pub fn with_capability_cache(mut self, cache: Arc<CapabilityCache>) -> Self {
        self.capability = cache;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Detected (or cached) backend capability
    pub async fn capability(&self) -> VectorCapability {
        self.capability.detect(self.store.as_ref()).await
    }

    /// Forget the cached capability
    pub fn reset_capability(&self) {
        self.capability.reset();
    }

    /// Run a search
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<RankedResult>> {
        let limit = request.limit.unwrap_or(self.config.default_limit);
        let threshold = request.threshold.unwrap_or(self.config.default_threshold);
        if limit == 0 {
            return Err(MemoryError::invalid_argument("limit must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(MemoryError::invalid_argument(format!(
                "threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        let types = request
            .memory_types
            .as_deref()
            .filter(|types| !types.is_empty());
        let intent = classify(&request.query);
        log::debug!(
            "Search {:?}: {:?} (confidence {})",
            intent.normalized_query,
            intent.intent_type,
            intent.confidence
        );

        if intent.intent_type == IntentType::Wildcard {
            let target = request.limit.unwrap_or(self.config.wildcard_target);
            return wildcard::summarize(self.store.as_ref(), target, types).await;
        }

        let outputs = self.run_channels(&intent, limit, threshold, types).await;
        let candidates = merge(&outputs);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<MemoryId> = candidates.iter().map(|c| c.id).collect();
        let peeked: HashMap<MemoryId, MemoryRecord> = self
            .store
            .peek_memories(&ids, true)
            .await
            .map_err(|e| MemoryError::pipeline(format!("failed to load candidates: {}", e)))?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        let ranked = rank(
            candidates,
            &peeked,
            &intent.normalized_query,
            &self.config.weights,
            &self.config.bonuses,
            threshold,
            limit,
        )?;

        // Only returned memories count as accessed
        let returned: Vec<MemoryId> = ranked.iter().map(|c| c.id).collect();
        let mut records: HashMap<MemoryId, MemoryRecord> = self
            .store
            .fetch_memories(&returned, true)
            .await
            .map_err(|e| MemoryError::pipeline(format!("failed to load results: {}", e)))?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        let mut results: Vec<RankedResult> = ranked
            .into_iter()
            .filter_map(|candidate| {
                let record = records.remove(&candidate.id)?;
                Some(RankedResult::new(record, candidate.score, candidate.match_type))
            })
            .collect();

        if request.include_graph_context && !results.is_empty() {
            self.attach_context(&mut results).await;
        }

        log::debug!("Search returned {} results", results.len());
        Ok(results)
    }

    /// Run the channels selected by intent concurrently
    async fn run_channels(
        &self,
        intent: &QueryIntent,
        limit: usize,
        threshold: f32,
        types: Option<&[String]>,
    ) -> ChannelOutputs {
        let capability = self.capability.detect(self.store.as_ref()).await;
        let candidate_limit = limit.saturating_mul(self.config.candidate_multiplier);
        let store = self.store.as_ref();
        let embedder = self.embedder.as_ref();
        let query = intent.normalized_query.as_str();

        let vector_channel = async {
            match intent.intent_type {
                IntentType::SemanticSearch => {
                    vector::search(
                        store,
                        embedder,
                        capability,
                        query,
                        candidate_limit,
                        threshold,
                        types,
                    )
                    .await
                }
                _ => Ok(Vec::new()),
            }
        };

        let (vector_hits, metadata_hits, tag_hits) = tokio::join!(
            vector_channel,
            metadata::search(store, query, candidate_limit, types),
            tags::search(
                store,
                embedder,
                capability,
                query,
                candidate_limit,
                self.config.tag_threshold,
                types,
            ),
        );

        ChannelOutputs {
            vector: settle(vector::CHANNEL, vector_hits),
            metadata: settle(metadata::CHANNEL, metadata_hits),
            tags: settle(tags::CHANNEL, tag_hits),
        }
    }

    /// Attach graph context; on failure results are returned without it
    async fn attach_context(&self, results: &mut [RankedResult]) {
        let ids: Vec<MemoryId> = results.iter().map(|r| r.memory.id).collect();
        match context::enrich(
            self.store.as_ref(),
            &ids,
            self.config.max_hops,
            self.config.related_per_direction,
        )
        .await
        {
            Ok(mut contexts) => {
                for result in results.iter_mut() {
                    result.related = contexts.remove(&result.memory.id);
                }
            }
            Err(e) => log::warn!("Graph context unavailable: {}", e),
        }
    }
}

/// A failed channel contributes nothing
fn settle<T: Default>(channel: &str, result: Result<T>) -> T {
    result.unwrap_or_else(|e| {
        log::warn!("Search channel '{}' failed: {}", channel, e);
        T::default()
    })
}

#[cfg(test)]
mod tests {
    use super::mock::{memory, MockGraphStore, StubEmbedder};
    use super::*;
    use crate::node::Relation;

    fn engine(store: MockGraphStore, embedder: StubEmbedder) -> (MemorySearch, Arc<MockGraphStore>) {
        let store = Arc::new(store);
        let search = MemorySearch::new(store.clone(), Arc::new(embedder))
            .with_capability_cache(Arc::new(CapabilityCache::new()));
        (search, store)
    }

    fn animals() -> (MockGraphStore, StubEmbedder, MemoryId, MemoryId) {
        let dog = memory("Dog", "animal", vec![0.9, 0.1, 0.0]);
        let car = memory("Car", "vehicle", vec![0.0, 0.1, 0.9]);
        let (dog_id, car_id) = (dog.id, car.id);
        let store = MockGraphStore::new()
            .with_primitives(true, false)
            .with_record(dog)
            .with_record(car);
        let embedder = StubEmbedder::new(3).with("animal", vec![1.0, 0.0, 0.0]);
        (store, embedder, dog_id, car_id)
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected_before_channels() {
        let (store, embedder, _, _) = animals();
        let (search, store) = engine(store, embedder);

        let zero = search.search(&SearchRequest::new("animal").limit(0)).await;
        assert!(matches!(zero, Err(MemoryError::InvalidArgument(_))));
        for threshold in [-0.1, 1.5, f32::NAN] {
            let result = search
                .search(&SearchRequest::new("animal").threshold(threshold))
                .await;
            assert!(matches!(result, Err(MemoryError::InvalidArgument(_))));
        }
        assert_eq!(store.call_count("probe"), 0);
        assert_eq!(store.call_count("exact_metadata_matches"), 0);
    }

    #[tokio::test]
    async fn test_semantic_ranks_by_similarity() {
        let (store, embedder, dog_id, _) = animals();
        let (search, _) = engine(store, embedder);

        let results = search.search(&SearchRequest::new("animal")).await.unwrap();
        assert_eq!(results[0].memory.id, dog_id);
        assert_eq!(results[0].match_type, MatchType::Semantic);
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[tokio::test]
    async fn test_exact_intent_bypasses_vector_channel() {
        let server = MemoryRecord::builder()
            .name("API server")
            .memory_type("service")
            .meta("port", 9000)
            .embedding(vec![0.0, 1.0, 0.0])
            .build()
            .unwrap();
        let server_id = server.id;
        let store = MockGraphStore::new().with_record(server);
        let (search, store) = engine(store, StubEmbedder::new(3));

        let results = search.search(&SearchRequest::new("9000")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.id, server_id);
        assert_eq!(results[0].match_type, MatchType::Exact);
        assert_eq!(store.call_count("nearest_memories"), 0);
        assert_eq!(store.call_count("memory_embeddings"), 0);
    }

    #[tokio::test]
    async fn test_failed_channel_contributes_nothing() {
        let (store, embedder, dog_id, _) = animals();
        let store = store.failing("exact_metadata_matches");
        let (search, _) = engine(store, embedder);

        let results = search.search(&SearchRequest::new("animal")).await.unwrap();
        assert_eq!(results[0].memory.id, dog_id);
    }

    #[tokio::test]
    async fn test_every_channel_failing_yields_empty() {
        let (store, _, _, _) = animals();
        let store = store.failing("exact_metadata_matches");
        let (search, _) = engine(store, StubEmbedder::new(3).failing());
        assert!(search
            .search(&SearchRequest::new("animal"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_materialization_failure_propagates() {
        for method in ["peek_memories", "fetch_memories"] {
            let (store, embedder, _, _) = animals();
            let store = store.failing(method);
            let (search, store) = engine(store, embedder);

            let err = search.search(&SearchRequest::new("animal")).await.unwrap_err();
            assert!(matches!(err, MemoryError::Pipeline(_)), "{}", method);
            // No wildcard substitution
            assert_eq!(store.call_count("root_memories"), 0);
        }
    }

    #[tokio::test]
    async fn test_enrichment_attached_and_optional() {
        let (store, embedder, dog_id, car_id) = animals();
        let store = store.with_relation(Relation::new(car_id, dog_id, "chases").unwrap());
        let (search, _) = engine(store, embedder);

        let results = search.search(&SearchRequest::new("animal")).await.unwrap();
        let dog = results.iter().find(|r| r.memory.id == dog_id).unwrap();
        let related = dog.related.as_ref().unwrap();
        assert_eq!(related.ancestors[0].id, car_id);
        assert_eq!(related.ancestors[0].relation_type, "chases");

        let bare = search
            .search(&SearchRequest::new("animal").graph_context(false))
            .await
            .unwrap();
        assert!(bare.iter().all(|r| r.related.is_none()));
    }

    #[tokio::test]
    async fn test_enrichment_failure_omits_related() {
        let (store, embedder, dog_id, _) = animals();
        let store = store.failing("related_paths");
        let (search, _) = engine(store, embedder);

        let results = search.search(&SearchRequest::new("animal")).await.unwrap();
        assert_eq!(results[0].memory.id, dog_id);
        assert!(results.iter().all(|r| r.related.is_none()));
    }

    #[tokio::test]
    async fn test_wildcard_uses_summary() {
        let (store, embedder, _, _) = animals();
        let (search, store) = engine(store, embedder);

        let results = search.search(&SearchRequest::new("*").limit(1)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 1.0);
        assert!(results[0].related.is_none());
        assert_eq!(store.call_count("probe"), 0);

        let all = search.search(&SearchRequest::new("  ")).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_type_filter_applies_to_every_channel() {
        let (store, embedder, _, car_id) = animals();
        let (search, _) = engine(store, embedder);
        let results = search
            .search(
                &SearchRequest::new("animal")
                    .memory_types(vec!["vehicle".into()])
                    .threshold(0.0),
            )
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.memory.id == car_id));
    }

    #[test]
    fn test_config_validation() {
        assert!(SearchConfig::default().validate().is_ok());
        let bad = SearchConfig {
            tag_threshold: 1.2,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = SearchConfig {
            candidate_multiplier: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_ranked_result_serialization() {
        let record = memory("Dog", "animal", vec![1.0]);
        let json = serde_json::to_value(RankedResult::new(record, 0.75, MatchType::Semantic)).unwrap();
        assert_eq!(json["name"], "Dog");
        assert_eq!(json["memoryType"], "animal");
        assert_eq!(json["matchType"], "semantic");
        assert_eq!(json["score"], 0.75);
        assert!(json.get("related").is_none());
        assert!(json.get("embedding").is_none());
    }
}
