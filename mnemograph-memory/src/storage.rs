//! RocksDB storage with HNSW indexing
//!
//! Persistent storage for memories, observations and relations using RocksDB
//! with LZ4 compression. Everything is mirrored into DashMap caches at open;
//! reads never touch disk except to persist last-accessed times.
//!
//! Name vectors are indexed with instant-distance HNSW (the "native" similarity
//! primitive). The "library" primitive is a linear cosine scan over the same
//! vectors. Which primitives exist is decided by [`StoreOptions`], and is what
//! the search core's capability probes observe.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use instant_distance::{Builder, HnswMap, Point, Search};
use parking_lot::{Mutex, RwLock};
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{MemoryError, Result};
use crate::fulltext::FulltextIndex;
use crate::graph::{
    ChildRow, GraphStore, PathDirection, PathRow, ScoredId, SimilarityPrimitive, TagMatchRow,
    TagSimilarityRow,
};
use crate::node::{
    normalize_tags, MemoryId, MemoryRecord, Observation, ObservationId, Relation, RelationKey,
};

const HNSW_EF_SEARCH: usize = 200;
const HNSW_MIN_CANDIDATES: usize = 64;
/// Float slack on the cosine-distance cutoff
const HNSW_DISTANCE_SLACK: f32 = 1e-6;

/// Which optional indexes and similarity primitives the store provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// HNSW index over name embeddings (`SimilarityPrimitive::Native`)
    pub native_vector_index: bool,
    /// Linear cosine function (`SimilarityPrimitive::Library`)
    pub similarity_library: bool,
    /// BM25 index over metadata and observation text
    pub fulltext_index: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            native_vector_index: true,
            similarity_library: false,
            fulltext_index: true,
        }
    }
}

impl StoreOptions {
    /// No similarity primitive at all; search falls back to in-process scans
    pub fn scan_only() -> Self {
        Self {
            native_vector_index: false,
            similarity_library: false,
            fulltext_index: true,
        }
    }
}

/// Partial update for [`MemoryStore::update_memory`]
///
/// `metadata` is merged key by key; a `null` value removes the key.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub name: Option<String>,
    pub memory_type: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub tags: Option<Vec<String>>,
}

/// HNSW point wrapper for semantic search
#[derive(Clone)]
struct MemoryPoint {
    vector: Vec<f32>,
}

impl Point for MemoryPoint {
    fn distance(&self, other: &Self) -> f32 {
        // Cosine distance = 1 - similarity (HNSW finds minimum)
        1.0 - cosine_similarity(&self.vector, &other.vector)
    }
}

/// HNSW index wrapper
struct HnswIndex {
    hnsw: HnswMap<MemoryPoint, MemoryId>,
}

fn mem_key(id: &MemoryId) -> String {
    format!("mem:{}", id)
}

fn vec_key(id: &MemoryId) -> String {
    format!("vec:{}", id)
}

fn obs_key(memory: &MemoryId, observation: &ObservationId) -> String {
    format!("obs:{}:{}", memory, observation)
}

fn tag_key(tag: &str) -> String {
    format!("tag:{}", tag)
}

/// Deterministic edge order: oldest first, then endpoints, then type
fn sort_edges(edges: &mut [Relation]) {
    edges.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.from.cmp(&b.from))
            .then_with(|| a.to.cmp(&b.to))
            .then_with(|| a.relation_type.cmp(&b.relation_type))
    });
}

fn sort_scored(results: &mut [ScoredId]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn far_end(edge: &Relation, direction: PathDirection) -> MemoryId {
    match direction {
        PathDirection::Ancestor => edge.from,
        PathDirection::Descendant => edge.to,
    }
}

/// RocksDB-based memory graph with HNSW and BM25 indexes
pub struct MemoryStore {
    db: Arc<DB>,
    options: StoreOptions,
    memory_cache: Arc<DashMap<MemoryId, MemoryRecord>>,
    observation_cache: Arc<DashMap<MemoryId, Vec<Observation>>>,
    vector_cache: Arc<DashMap<MemoryId, Vec<f32>>>,
    tag_vectors: Arc<DashMap<String, Vec<f32>>>,
    outgoing: Arc<DashMap<MemoryId, Vec<Relation>>>,
    incoming: Arc<DashMap<MemoryId, Vec<Relation>>>,
    fulltext: Arc<RwLock<FulltextIndex>>,
    hnsw_index: Arc<RwLock<Option<HnswIndex>>>,
    hnsw_dirty: AtomicBool,
    /// Serializes compound writes (and access-time persistence)
    write_lock: Mutex<()>,
    engine: Arc<dyn Embedder>,
}

impl MemoryStore {
    /// Open a store with default options
    pub fn new(path: impl AsRef<Path>, engine: Arc<dyn Embedder>) -> Result<Self> {
        Self::open(path, engine, StoreOptions::default())
    }

    /// Open (or create) a MemoryStore at the given path
    pub fn open(
        path: impl AsRef<Path>,
        engine: Arc<dyn Embedder>,
        options: StoreOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_background_jobs(2);
        opts.set_bytes_per_sync(1048576); // 1MB
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        crate::migration::ensure_version(&db)?;

        log::info!("MemoryStore opened at: {} ({:?})", path.display(), options);

        let store = Self {
            db: Arc::new(db),
            options,
            memory_cache: Arc::new(DashMap::new()),
            observation_cache: Arc::new(DashMap::new()),
            vector_cache: Arc::new(DashMap::new()),
            tag_vectors: Arc::new(DashMap::new()),
            outgoing: Arc::new(DashMap::new()),
            incoming: Arc::new(DashMap::new()),
            fulltext: Arc::new(RwLock::new(FulltextIndex::new())),
            hnsw_index: Arc::new(RwLock::new(None)),
            hnsw_dirty: AtomicBool::new(true),
            write_lock: Mutex::new(()),
            engine,
        };

        store.load_cache()?;
        Ok(store)
    }

    /// Load everything into the caches on startup
    ///
    /// Keys iterate in byte order, so `mem:` records are loaded before the
    /// `obs:`, `rel:` and `vec:` entries that reference them. Entries that
    /// fail to deserialize or point at a missing memory are skipped.
    fn load_cache(&self) -> Result<()> {
        let mut skipped = 0;

        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item?;
            let key_str = String::from_utf8_lossy(&key);

            if key_str.starts_with("mem:") {
                match serde_json::from_slice::<MemoryRecord>(&value) {
                    Ok(record) => {
                        self.memory_cache.insert(record.id, record);
                    }
                    Err(e) => {
                        log::warn!("Failed to deserialize {}: {}. Skipping.", key_str, e);
                        skipped += 1;
                    }
                }
            } else if let Some(rest) = key_str.strip_prefix("obs:") {
                let memory_id = rest
                    .split_once(':')
                    .and_then(|(memory, _)| memory.parse::<MemoryId>().ok());
                match (memory_id, serde_json::from_slice::<Observation>(&value)) {
                    (Some(memory_id), Ok(observation))
                        if self.memory_cache.contains_key(&memory_id) =>
                    {
                        self.observation_cache
                            .entry(memory_id)
                            .or_default()
                            .push(observation);
                    }
                    _ => skipped += 1,
                }
            } else if key_str.starts_with("rel:") {
                match serde_json::from_slice::<Relation>(&value) {
                    Ok(relation)
                        if self.memory_cache.contains_key(&relation.from)
                            && self.memory_cache.contains_key(&relation.to) =>
                    {
                        self.incoming
                            .entry(relation.to)
                            .or_default()
                            .push(relation.clone());
                        self.outgoing.entry(relation.from).or_default().push(relation);
                    }
                    _ => skipped += 1,
                }
            } else if let Some(tag) = key_str.strip_prefix("tag:") {
                match bincode::deserialize::<Vec<f32>>(&value) {
                    Ok(vector) => {
                        self.tag_vectors.insert(tag.to_string(), vector);
                    }
                    Err(_) => skipped += 1,
                }
            } else if let Some(id) = key_str.strip_prefix("vec:") {
                let id = id.parse::<MemoryId>().ok();
                match (id, bincode::deserialize::<Vec<f32>>(&value)) {
                    (Some(id), Ok(vector)) if self.memory_cache.contains_key(&id) => {
                        self.vector_cache.insert(id, vector);
                    }
                    _ => skipped += 1,
                }
            }
        }

        for mut entry in self.observation_cache.iter_mut() {
            entry.value_mut().sort_by_key(|o| (o.created_at, o.id));
        }
        for mut entry in self.outgoing.iter_mut() {
            sort_edges(entry.value_mut());
        }
        for mut entry in self.incoming.iter_mut() {
            sort_edges(entry.value_mut());
        }

        let ids: Vec<MemoryId> = self.memory_cache.iter().map(|e| *e.key()).collect();
        for id in &ids {
            self.reindex_fulltext(id);
        }

        if !ids.is_empty() {
            log::info!("Loaded {} memories from disk", ids.len());
        }
        if skipped > 0 {
            log::warn!("Skipped {} unreadable or dangling entries", skipped);
        }

        Ok(())
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.db.put(key.as_bytes(), serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn put_vector(&self, key: &str, vector: &[f32]) -> Result<()> {
        self.db.put(key.as_bytes(), bincode::serialize(vector)?)?;
        Ok(())
    }

    /// Embed and persist a tag vector the first time a tag is seen
    fn ensure_tag_vector(&self, tag: &str) -> Result<()> {
        if self.tag_vectors.contains_key(tag) {
            return Ok(());
        }
        let vector = self.engine.embed(tag)?;
        self.put_vector(&tag_key(tag), &vector)?;
        self.tag_vectors.insert(tag.to_string(), vector);
        Ok(())
    }

    fn observations_of(&self, id: &MemoryId) -> Vec<Observation> {
        self.observation_cache
            .get(id)
            .map(|obs| obs.clone())
            .unwrap_or_default()
    }

    fn reindex_fulltext(&self, id: &MemoryId) {
        if !self.options.fulltext_index {
            return;
        }
        let record = self.memory_cache.get(id).map(|r| r.clone());
        let mut index = self.fulltext.write();
        match record {
            Some(mut record) => {
                record.observations = self.observations_of(id);
                index.upsert(*id, &record.fulltext_document());
            }
            None => index.remove(id),
        }
    }

    fn validate_observations(observations: &[Observation]) -> Result<()> {
        if observations.iter().any(|o| o.content.trim().is_empty()) {
            return Err(MemoryError::invalid_argument(
                "observation content must not be empty",
            ));
        }
        Ok(())
    }

    /// Store a new memory, embedding its name and tags
    ///
    /// Observations already attached to `record` are stored with it.
    pub fn create_memory(&self, mut record: MemoryRecord) -> Result<MemoryRecord> {
        let _guard = self.write_lock.lock();
        let id = record.id;

        if self.memory_cache.contains_key(&id) {
            return Err(MemoryError::conflict(format!("memory {} already exists", id)));
        }
        if record.name.trim().is_empty() || record.memory_type.trim().is_empty() {
            return Err(MemoryError::invalid_argument(
                "memory name and type must not be empty",
            ));
        }
        Self::validate_observations(&record.observations)?;
        record.tags = normalize_tags(&record.tags);

        let vector = match record.embedding.take() {
            Some(vector) if vector.len() != self.engine.dimensions() => {
                return Err(MemoryError::invalid_argument(format!(
                    "embedding has {} dimensions, expected {}",
                    vector.len(),
                    self.engine.dimensions()
                )));
            }
            Some(vector) => vector,
            None => self.engine.embed(&record.name)?,
        };
        for tag in &record.tags {
            self.ensure_tag_vector(tag)?;
        }

        let mut observations = std::mem::take(&mut record.observations);
        observations.sort_by_key(|o| (o.created_at, o.id));

        self.put_json(&mem_key(&id), &record)?;
        self.put_vector(&vec_key(&id), &vector)?;
        for observation in &observations {
            self.put_json(&obs_key(&id, &observation.id), observation)?;
        }
        self.db.flush()?;

        self.memory_cache.insert(id, record.clone());
        self.vector_cache.insert(id, vector);
        if !observations.is_empty() {
            self.observation_cache.insert(id, observations.clone());
        }
        self.hnsw_dirty.store(true, Ordering::Release);
        self.reindex_fulltext(&id);

        log::debug!("Created memory {} ({})", id, record.name);
        record.observations = observations;
        Ok(record)
    }

    /// Get a memory with its observations, refreshing its last-accessed time
    pub fn get(&self, id: &MemoryId) -> Result<Option<MemoryRecord>> {
        Ok(self.materialize(std::slice::from_ref(id), true)?.pop())
    }

    /// True if a memory with this id exists
    pub fn contains(&self, id: &MemoryId) -> bool {
        self.memory_cache.contains_key(id)
    }

    /// Apply a partial update; re-embeds the name when it changes
    pub fn update_memory(&self, id: &MemoryId, update: MemoryUpdate) -> Result<MemoryRecord> {
        let _guard = self.write_lock.lock();
        let mut record = self
            .memory_cache
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| MemoryError::not_found(format!("memory {}", id)))?;

        let mut new_vector = None;
        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(MemoryError::invalid_argument("memory name must not be empty"));
            }
            if name != record.name {
                new_vector = Some(self.engine.embed(name)?);
                record.name = name.to_string();
            }
        }
        if let Some(memory_type) = update.memory_type {
            let memory_type = memory_type.trim();
            if memory_type.is_empty() {
                return Err(MemoryError::invalid_argument("memory type must not be empty"));
            }
            record.memory_type = memory_type.to_string();
        }
        if let Some(patch) = update.metadata {
            for (key, value) in patch {
                if value.is_null() {
                    record.metadata.remove(&key);
                } else {
                    record.metadata.insert(key, value);
                }
            }
        }
        if let Some(tags) = update.tags {
            let tags = normalize_tags(tags);
            for tag in &tags {
                self.ensure_tag_vector(tag)?;
            }
            record.tags = tags;
        }
        record.timestamps.mark_modified();

        self.put_json(&mem_key(id), &record)?;
        if let Some(vector) = &new_vector {
            self.put_vector(&vec_key(id), vector)?;
        }
        self.db.flush()?;

        self.memory_cache.insert(*id, record.clone());
        if let Some(vector) = new_vector {
            self.vector_cache.insert(*id, vector);
            self.hnsw_dirty.store(true, Ordering::Release);
        }
        self.reindex_fulltext(id);

        record.observations = self.observations_of(id);
        Ok(record)
    }

    /// Delete a memory with its observations, relations and vector
    pub fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        let _guard = self.write_lock.lock();
        if !self.memory_cache.contains_key(id) {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        batch.delete(mem_key(id).as_bytes());
        batch.delete(vec_key(id).as_bytes());

        let observations = self
            .observation_cache
            .remove(id)
            .map(|(_, obs)| obs)
            .unwrap_or_default();
        for observation in &observations {
            batch.delete(obs_key(id, &observation.id).as_bytes());
        }

        let outgoing = self.outgoing.remove(id).map(|(_, e)| e).unwrap_or_default();
        let incoming = self.incoming.remove(id).map(|(_, e)| e).unwrap_or_default();
        for edge in &outgoing {
            batch.delete(edge.key().storage_key().as_bytes());
            if let Some(mut edges) = self.incoming.get_mut(&edge.to) {
                edges.retain(|e| e.from != *id);
            }
        }
        for edge in &incoming {
            batch.delete(edge.key().storage_key().as_bytes());
            if let Some(mut edges) = self.outgoing.get_mut(&edge.from) {
                edges.retain(|e| e.to != *id);
            }
        }

        self.db.write(batch)?;
        self.db.flush()?;

        self.memory_cache.remove(id);
        self.vector_cache.remove(id);
        self.hnsw_dirty.store(true, Ordering::Release);
        if self.options.fulltext_index {
            self.fulltext.write().remove(id);
        }

        log::debug!(
            "Deleted memory {} ({} observations, {} relations)",
            id,
            observations.len(),
            outgoing.len() + incoming.len()
        );
        Ok(true)
    }

    /// Attach observations to an existing memory
    pub fn add_observations(
        &self,
        memory_id: &MemoryId,
        observations: Vec<Observation>,
    ) -> Result<Vec<Observation>> {
        let _guard = self.write_lock.lock();
        if !self.memory_cache.contains_key(memory_id) {
            return Err(MemoryError::not_found(format!("memory {}", memory_id)));
        }
        Self::validate_observations(&observations)?;

        for observation in &observations {
            self.put_json(&obs_key(memory_id, &observation.id), observation)?;
        }
        self.db.flush()?;

        {
            let mut cached = self.observation_cache.entry(*memory_id).or_default();
            cached.extend(observations.iter().cloned());
            cached.sort_by_key(|o| (o.created_at, o.id));
        }
        self.reindex_fulltext(memory_id);
        Ok(observations)
    }

    /// Remove observations by id; returns how many existed
    pub fn delete_observations(
        &self,
        memory_id: &MemoryId,
        ids: &[ObservationId],
    ) -> Result<usize> {
        let _guard = self.write_lock.lock();
        if !self.memory_cache.contains_key(memory_id) {
            return Err(MemoryError::not_found(format!("memory {}", memory_id)));
        }

        let removed: Vec<ObservationId> = match self.observation_cache.get_mut(memory_id) {
            Some(mut cached) => {
                let removed = cached
                    .iter()
                    .filter(|o| ids.contains(&o.id))
                    .map(|o| o.id)
                    .collect();
                cached.retain(|o| !ids.contains(&o.id));
                removed
            }
            None => Vec::new(),
        };
        if removed.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::default();
        for observation_id in &removed {
            batch.delete(obs_key(memory_id, observation_id).as_bytes());
        }
        self.db.write(batch)?;
        self.db.flush()?;

        self.reindex_fulltext(memory_id);
        Ok(removed.len())
    }

    /// Create a relation; returns false if the (from, to, type) triple exists
    pub fn create_relation(&self, relation: Relation) -> Result<bool> {
        let _guard = self.write_lock.lock();
        for endpoint in [&relation.from, &relation.to] {
            if !self.memory_cache.contains_key(endpoint) {
                return Err(MemoryError::not_found(format!("memory {}", endpoint)));
            }
        }

        let exists = self
            .outgoing
            .get(&relation.from)
            .map(|edges| {
                edges
                    .iter()
                    .any(|e| e.to == relation.to && e.relation_type == relation.relation_type)
            })
            .unwrap_or(false);
        if exists {
            return Ok(false);
        }

        self.put_json(&relation.key().storage_key(), &relation)?;
        self.db.flush()?;

        {
            let mut edges = self.outgoing.entry(relation.from).or_default();
            edges.push(relation.clone());
            sort_edges(&mut edges);
        }
        {
            let mut edges = self.incoming.entry(relation.to).or_default();
            edges.push(relation);
            sort_edges(&mut edges);
        }
        Ok(true)
    }

    /// Delete a relation; returns whether it existed
    pub fn delete_relation(&self, key: &RelationKey) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let matches = |e: &Relation| e.to == key.to && e.from == key.from && e.relation_type == key.relation_type;

        let existed = match self.outgoing.get_mut(&key.from) {
            Some(mut edges) => {
                let before = edges.len();
                edges.retain(|e| !matches(e));
                edges.len() != before
            }
            None => false,
        };
        if !existed {
            return Ok(false);
        }
        if let Some(mut edges) = self.incoming.get_mut(&key.to) {
            edges.retain(|e| !matches(e));
        }

        self.db.delete(key.storage_key().as_bytes())?;
        self.db.flush()?;
        Ok(true)
    }

    /// Outgoing and incoming relations of a memory
    pub fn relations_of(&self, id: &MemoryId) -> (Vec<Relation>, Vec<Relation>) {
        let outgoing = self.outgoing.get(id).map(|e| e.clone()).unwrap_or_default();
        let incoming = self.incoming.get(id).map(|e| e.clone()).unwrap_or_default();
        (outgoing, incoming)
    }

    /// Page through memories in creation order (without observations)
    pub fn list(
        &self,
        types: Option<&[String]>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let ids: Vec<MemoryId> = self
            .snapshot(types)
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| r.id)
            .collect();
        self.materialize(&ids, false)
    }

    /// Number of stored memories
    pub fn len(&self) -> usize {
        self.memory_cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory_cache.is_empty()
    }

    /// Get store statistics
    pub fn stats(&self) -> Value {
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_tag: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_relation_type: BTreeMap<String, usize> = BTreeMap::new();

        for entry in self.memory_cache.iter() {
            let memory = entry.value();
            *by_type.entry(memory.memory_type.clone()).or_insert(0) += 1;
            for tag in &memory.tags {
                *by_tag.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        let mut total_relations = 0;
        for entry in self.outgoing.iter() {
            for edge in entry.value() {
                total_relations += 1;
                *by_relation_type
                    .entry(edge.relation_type.clone())
                    .or_insert(0) += 1;
            }
        }
        let total_observations: usize = self.observation_cache.iter().map(|e| e.len()).sum();

        serde_json::json!({
            "totalMemories": self.memory_cache.len(),
            "totalObservations": total_observations,
            "totalRelations": total_relations,
            "byType": by_type,
            "byTag": by_tag,
            "byRelationType": by_relation_type,
            "indexes": {
                "nativeVector": self.options.native_vector_index,
                "similarityLibrary": self.options.similarity_library,
                "fulltext": self.options.fulltext_index,
                "fulltextDocuments": self.fulltext.read().len(),
            },
        })
    }

    /// Get the embedder reference
    pub fn engine(&self) -> &Arc<dyn Embedder> {
        &self.engine
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Cached records passing the type filter, in (created_at, id) order
    fn snapshot(&self, types: Option<&[String]>) -> Vec<MemoryRecord> {
        let mut records: Vec<MemoryRecord> = self
            .memory_cache
            .iter()
            .filter(|e| e.value().matches_types(types))
            .map(|e| e.value().clone())
            .collect();
        records.sort_by(|a, b| {
            a.timestamps
                .created_at
                .cmp(&b.timestamps.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    fn type_matches(&self, id: &MemoryId, types: Option<&[String]>) -> bool {
        self.memory_cache
            .get(id)
            .map(|r| r.matches_types(types))
            .unwrap_or(false)
    }

    /// Clone records in `ids` order, bumping and persisting last-accessed
    fn materialize(&self, ids: &[MemoryId], include_observations: bool) -> Result<Vec<MemoryRecord>> {
        let _guard = self.write_lock.lock();
        let mut batch = WriteBatch::default();
        let mut records = Vec::with_capacity(ids.len());

        for id in ids {
            let touched = self.memory_cache.get_mut(id).map(|mut entry| {
                entry.timestamps.touch();
                entry.clone()
            });
            let Some(mut record) = touched else {
                continue;
            };
            batch.put(mem_key(id).as_bytes(), serde_json::to_vec(&record)?);
            if include_observations {
                record.observations = self.observations_of(id);
            }
            records.push(record);
        }

        self.db.write(batch)?;
        Ok(records)
    }

    /// Clone records in `ids` order without touching them
    fn peek(&self, ids: &[MemoryId], include_observations: bool) -> Vec<MemoryRecord> {
        ids.iter()
            .filter_map(|id| {
                let mut record = self.memory_cache.get(id)?.clone();
                if include_observations {
                    record.observations = self.observations_of(id);
                }
                Some(record)
            })
            .collect()
    }

    fn require(&self, primitive: SimilarityPrimitive) -> Result<()> {
        let available = match primitive {
            SimilarityPrimitive::Native => self.options.native_vector_index,
            SimilarityPrimitive::Library => self.options.similarity_library,
        };
        if available {
            Ok(())
        } else {
            Err(MemoryError::probe(format!(
                "{} similarity primitive is not configured",
                primitive
            )))
        }
    }

    /// Rebuild the HNSW index if vectors changed since the last build
    fn ensure_hnsw_index(&self) {
        if !self.hnsw_dirty.swap(false, Ordering::AcqRel) {
            return;
        }

        let (points, ids): (Vec<MemoryPoint>, Vec<MemoryId>) = self
            .vector_cache
            .iter()
            .map(|e| (MemoryPoint { vector: e.value().clone() }, *e.key()))
            .unzip();

        if points.is_empty() {
            *self.hnsw_index.write() = None;
            return;
        }

        let count = points.len();
        let hnsw = Builder::default()
            .ef_construction(100)
            .ef_search(HNSW_EF_SEARCH)
            .build(points, ids);
        *self.hnsw_index.write() = Some(HnswIndex { hnsw });
        log::debug!("Rebuilt HNSW index over {} vectors", count);
    }

    /// Semantic search using HNSW, re-scored with exact cosine
    ///
    /// Type and threshold filters apply while the neighbour stream is
    /// consumed. The search visits at most `ef_search` neighbours, so when
    /// that stream runs dry before `limit` matches and before covering every
    /// vector, the remainder is answered by the linear scan.
    fn hnsw_nearest(
        &self,
        query: &[f32],
        limit: usize,
        threshold: f32,
        types: Option<&[String]>,
    ) -> Vec<ScoredId> {
        self.ensure_hnsw_index();
        let guard = self.hnsw_index.read();
        let Some(index) = guard.as_ref() else {
            return Vec::new();
        };

        let query_point = MemoryPoint {
            vector: query.to_vec(),
        };
        let mut search = Search::default();
        let wanted = limit.saturating_mul(4).max(HNSW_MIN_CANDIDATES);
        let max_distance = 1.0 - threshold + HNSW_DISTANCE_SLACK;

        let mut results: Vec<ScoredId> = Vec::new();
        let mut visited = 0usize;
        let mut complete = false;
        for item in index.hnsw.search(&query_point, &mut search) {
            visited += 1;
            if item.distance > max_distance {
                complete = true;
                break;
            }
            if !self.type_matches(item.value, types) {
                continue;
            }
            let Some(vector) = self.vector_cache.get(item.value) else {
                continue;
            };
            let score = cosine_similarity(query, &vector);
            if score >= threshold {
                results.push(ScoredId::new(*item.value, score));
                if results.len() >= wanted {
                    complete = true;
                    break;
                }
            }
        }
        drop(guard);

        if !complete && results.len() < limit && visited < self.vector_cache.len() {
            log::debug!(
                "HNSW yielded {} of {} requested after {} neighbours, scanning",
                results.len(),
                limit,
                visited
            );
            return self.scan_nearest(query, limit, threshold, types);
        }

        sort_scored(&mut results);
        results.truncate(limit);
        results
    }

    /// Linear cosine scan
    fn scan_nearest(
        &self,
        query: &[f32],
        limit: usize,
        threshold: f32,
        types: Option<&[String]>,
    ) -> Vec<ScoredId> {
        let mut results: Vec<ScoredId> = self
            .vector_cache
            .iter()
            .filter(|entry| self.type_matches(entry.key(), types))
            .map(|entry| ScoredId::new(*entry.key(), cosine_similarity(query, entry.value())))
            .filter(|scored| scored.score >= threshold)
            .collect();

        sort_scored(&mut results);
        results.truncate(limit);
        results
    }

    fn adjacent(&self, id: &MemoryId, direction: PathDirection) -> Vec<Relation> {
        let edges = match direction {
            PathDirection::Ancestor => self.incoming.get(id),
            PathDirection::Descendant => self.outgoing.get(id),
        };
        edges.map(|e| e.clone()).unwrap_or_default()
    }

    fn path_row(
        &self,
        anchor: MemoryId,
        direction: PathDirection,
        related: MemoryId,
        first_hop: &Relation,
        hops: u32,
    ) -> PathRow {
        let (related_name, related_type) = self
            .memory_cache
            .get(&related)
            .map(|r| (Some(r.name.clone()), Some(r.memory_type.clone())))
            .unwrap_or((None, None));

        PathRow {
            anchor,
            direction,
            related_id: Some(related),
            related_name,
            related_type,
            relation_type: Some(first_hop.relation_type.clone()),
            hops: Value::from(hops),
            strength: first_hop.strength,
            source: first_hop.source.clone(),
            created_at: Some(first_hop.created_at),
        }
    }

    /// Breadth-first walk away from `anchor`, one row per path
    fn walk_paths(
        &self,
        anchor: MemoryId,
        direction: PathDirection,
        max_hops: u32,
        rows: &mut Vec<PathRow>,
    ) {
        if max_hops == 0 {
            return;
        }

        let mut frontier: Vec<(MemoryId, Relation)> = Vec::new();
        for edge in self.adjacent(&anchor, direction) {
            let next = far_end(&edge, direction);
            rows.push(self.path_row(anchor, direction, next, &edge, 1));
            frontier.push((next, edge));
        }

        for hop in 2..=max_hops {
            let mut next_frontier = Vec::new();
            for (node, first_hop) in &frontier {
                for edge in self.adjacent(node, direction) {
                    let next = far_end(&edge, direction);
                    rows.push(self.path_row(anchor, direction, next, first_hop, hop));
                    next_frontier.push((next, first_hop.clone()));
                }
            }
            frontier = next_frontier;
        }
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn probe(&self, primitive: SimilarityPrimitive) -> Result<()> {
        self.require(primitive)
    }

    async fn nearest_memories(
        &self,
        primitive: SimilarityPrimitive,
        query: &[f32],
        limit: usize,
        threshold: f32,
        types: Option<&[String]>,
    ) -> Result<Vec<ScoredId>> {
        self.require(primitive)?;
        Ok(match primitive {
            SimilarityPrimitive::Native => self.hnsw_nearest(query, limit, threshold, types),
            SimilarityPrimitive::Library => self.scan_nearest(query, limit, threshold, types),
        })
    }

    async fn memory_embeddings(
        &self,
        types: Option<&[String]>,
    ) -> Result<Vec<(MemoryId, Vec<f32>)>> {
        let mut embeddings: Vec<(MemoryId, Vec<f32>)> = self
            .vector_cache
            .iter()
            .filter(|entry| self.type_matches(entry.key(), types))
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        embeddings.sort_by_key(|(id, _)| *id);
        Ok(embeddings)
    }

    async fn exact_metadata_matches(
        &self,
        query: &str,
        limit: usize,
        types: Option<&[String]>,
    ) -> Result<Vec<MemoryId>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .snapshot(types)
            .into_iter()
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
        if !self.options.fulltext_index {
            return Ok(None);
        }
        let index = self.fulltext.read();
        let mut matches: Vec<ScoredId> = index
            .search(query, usize::MAX)
            .into_iter()
            .filter(|scored| self.type_matches(&scored.id, types))
            .collect();
        matches.truncate(limit);
        Ok(Some(matches))
    }

    async fn tag_substring_matches(
        &self,
        tokens: &[String],
        types: Option<&[String]>,
    ) -> Result<Vec<TagMatchRow>> {
        let tokens: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let mut rows = Vec::new();
        for record in self.snapshot(types) {
            for tag in &record.tags {
                let tag_lower = tag.to_lowercase();
                if tokens.iter().any(|token| tag_lower.contains(token.as_str())) {
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
        self.require(primitive)?;
        let mut rows = Vec::new();
        for record in self.snapshot(types) {
            for tag in &record.tags {
                if let Some(vector) = self.tag_vectors.get(tag) {
                    rows.push(TagSimilarityRow {
                        memory_id: record.id,
                        tag: tag.clone(),
                        similarity: cosine_similarity(query, &vector),
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
        self.materialize(ids, include_observations)
    }

    async fn peek_memories(
        &self,
        ids: &[MemoryId],
        include_observations: bool,
    ) -> Result<Vec<MemoryRecord>> {
        Ok(self.peek(ids, include_observations))
    }

    async fn related_paths(&self, ids: &[MemoryId], max_hops: u32) -> Result<Vec<PathRow>> {
        let mut rows = Vec::new();
        for id in ids {
            self.walk_paths(*id, PathDirection::Ancestor, max_hops, &mut rows);
            self.walk_paths(*id, PathDirection::Descendant, max_hops, &mut rows);
        }
        Ok(rows)
    }

    async fn root_memories(
        &self,
        limit: usize,
        types: Option<&[String]>,
    ) -> Result<Vec<MemoryRecord>> {
        let roots: Vec<MemoryId> = self
            .snapshot(types)
            .into_iter()
            .filter(|r| {
                self.incoming
                    .get(&r.id)
                    .map(|edges| edges.is_empty())
                    .unwrap_or(true)
            })
            .take(limit)
            .map(|r| r.id)
            .collect();
        self.materialize(&roots, false)
    }

    async fn child_edges(
        &self,
        parents: &[MemoryId],
        types: Option<&[String]>,
    ) -> Result<Vec<ChildRow>> {
        let edges: Vec<Relation> = parents
            .iter()
            .flat_map(|parent| self.adjacent(parent, PathDirection::Descendant))
            .collect();

        let mut child_ids: Vec<MemoryId> = edges.iter().map(|e| e.to).collect();
        child_ids.sort();
        child_ids.dedup();
        let children: HashMap<MemoryId, MemoryRecord> = self
            .peek(&child_ids, false)
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        Ok(edges
            .into_iter()
            .filter_map(|edge| {
                let child = children.get(&edge.to)?;
                child.matches_types(types).then(|| ChildRow {
                    parent: edge.from,
                    relation_type: edge.relation_type,
                    child: child.clone(),
                })
            })
            .collect())
    }
}
