//! Memory layer integration for the MCP server
//!
//! Owns the store and the search engine once `initialize` has opened the
//! database, and exposes async wrappers the tool handlers call.

use std::sync::Arc;

use mnemograph_memory::{
    CapabilityCache, Embedder, MemoryId, MemoryRecord, MemorySearch, MemoryStore, MemoryUpdate,
    Observation, ObservationId, RankedResult, Relation, RelationKey, SearchRequest,
    VectorCapability, VectorEngine,
};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::{EmbedderKind, ServerConfig};
use crate::error::{ServerError, ServerResult};

struct Backend {
    store: Arc<MemoryStore>,
    search: MemorySearch,
}

/// Memory manager for the MCP server
pub struct MemoryManager {
    backend: RwLock<Option<Arc<Backend>>>,
    config: ServerConfig,
    capability: Arc<CapabilityCache>,
}

impl MemoryManager {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            backend: RwLock::new(None),
            config,
            capability: CapabilityCache::global(),
        }
    }

    /// Use a private capability cache instead of the process-wide one
    pub fn with_capability_cache(mut self, cache: Arc<CapabilityCache>) -> Self {
        self.capability = cache;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open the store and build the search engine
    ///
    /// A second call reopens nothing and returns immediately.
    pub async fn initialize(&self) -> ServerResult<()> {
        let mut backend = self.backend.write().await;
        if backend.is_some() {
            return Ok(());
        }

        let data_dir = &self.config.data_dir;
        tracing::info!("Opening memory store at {:?}", data_dir);
        std::fs::create_dir_all(data_dir)?;

        let engine = self.build_engine()?;
        let store = Arc::new(MemoryStore::open(
            data_dir,
            engine.clone(),
            self.config.store_options(),
        )?);

        // Backend options may differ from the last store this process opened
        self.capability.reset();
        let search = MemorySearch::new(store.clone(), engine)
            .with_config(self.config.search_config())?
            .with_capability_cache(self.capability.clone());

        tracing::info!(
            "Memory store ready: {} memories, embedder {:?}, backend {:?}",
            store.len(),
            self.config.embedder,
            self.config.vector_backend
        );
        *backend = Some(Arc::new(Backend { store, search }));
        Ok(())
    }

    fn build_engine(&self) -> ServerResult<Arc<dyn Embedder>> {
        match self.config.embedder {
            EmbedderKind::Hashed => Ok(Arc::new(VectorEngine::hashed())),
            #[cfg(feature = "fastembed")]
            EmbedderKind::Fastembed => {
                use mnemograph_memory::embedding::FastEmbedModel;
                let engine = match &self.config.models_path {
                    Some(path) => VectorEngine::new(FastEmbedModel::load(path)?),
                    None => VectorEngine::fastembed(install_root().as_deref())?,
                };
                Ok(Arc::new(engine))
            }
            #[cfg(not(feature = "fastembed"))]
            EmbedderKind::Fastembed => Err(ServerError::invalid_params(
                "this build has no fastembed support; rebuild with --features fastembed",
            )),
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.backend.read().await.is_some()
    }

    async fn backend(&self) -> ServerResult<Arc<Backend>> {
        self.backend
            .read()
            .await
            .clone()
            .ok_or(ServerError::NotInitialized)
    }

    pub async fn create(&self, record: MemoryRecord) -> ServerResult<MemoryRecord> {
        Ok(self.backend().await?.store.create_memory(record)?)
    }

    pub async fn search(&self, request: &SearchRequest) -> ServerResult<Vec<RankedResult>> {
        Ok(self.backend().await?.search.search(request).await?)
    }

    /// A memory with its observations and relations
    pub async fn get(&self, id: &MemoryId) -> ServerResult<Option<MemoryWithRelations>> {
        let backend = self.backend().await?;
        let Some(memory) = backend.store.get(id)? else {
            return Ok(None);
        };
        let (outgoing, incoming) = backend.store.relations_of(id);
        Ok(Some(MemoryWithRelations {
            memory,
            outgoing,
            incoming,
        }))
    }

    pub async fn update(&self, id: &MemoryId, update: MemoryUpdate) -> ServerResult<MemoryRecord> {
        Ok(self.backend().await?.store.update_memory(id, update)?)
    }

    pub async fn delete(&self, id: &MemoryId) -> ServerResult<bool> {
        Ok(self.backend().await?.store.delete_memory(id)?)
    }

    pub async fn list(
        &self,
        types: Option<&[String]>,
        offset: usize,
        limit: usize,
    ) -> ServerResult<Vec<MemoryRecord>> {
        Ok(self.backend().await?.store.list(types, offset, limit)?)
    }

    pub async fn add_observations(
        &self,
        id: &MemoryId,
        observations: Vec<Observation>,
    ) -> ServerResult<Vec<Observation>> {
        Ok(self
            .backend()
            .await?
            .store
            .add_observations(id, observations)?)
    }

    pub async fn delete_observations(
        &self,
        id: &MemoryId,
        ids: &[ObservationId],
    ) -> ServerResult<usize> {
        Ok(self.backend().await?.store.delete_observations(id, ids)?)
    }

    pub async fn create_relation(&self, relation: Relation) -> ServerResult<bool> {
        Ok(self.backend().await?.store.create_relation(relation)?)
    }

    pub async fn delete_relation(&self, key: &RelationKey) -> ServerResult<bool> {
        Ok(self.backend().await?.store.delete_relation(key)?)
    }

    pub async fn stats(&self) -> ServerResult<Value> {
        Ok(self.backend().await?.store.stats())
    }

    /// Detected vector capability of the open store
    pub async fn capability(&self) -> ServerResult<VectorCapability> {
        Ok(self.backend().await?.search.capability().await)
    }
}

/// `memory_get` payload
#[derive(Debug, serde::Serialize)]
pub struct MemoryWithRelations {
    #[serde(flatten)]
    pub memory: MemoryRecord,
    pub outgoing: Vec<Relation>,
    pub incoming: Vec<Relation>,
}

/// Directory holding the executable, or its parent when run from `target/`
#[cfg(feature = "fastembed")]
fn install_root() -> Option<std::path::PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let exe_dir = exe.parent()?;
    if exe_dir.ends_with("debug") || exe_dir.ends_with("release") {
        exe_dir.parent()?.parent().map(|p| p.to_path_buf())
    } else {
        exe_dir.parent().map(|p| p.to_path_buf())
    }
}
