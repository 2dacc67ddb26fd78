//! Mnemograph Memory Layer
//!
//! Knowledge-graph memory store with multi-channel search. Callers create
//! typed memories carrying metadata, tags and free-text observations, link
//! them with typed relations, and retrieve them by exact value, tag or
//! natural-language similarity.
//!
//! ## Features
//!
//! - **Multi-channel search** - vector similarity, exact/fulltext metadata and
//!   tag matching run concurrently and merge into one composite score
//! - **Capability detection** - uses the store's similarity primitive when it
//!   has one, falls back to in-process scans when it doesn't
//! - **Graph context** - ancestors and descendants within two hops of each hit
//! - **RocksDB persistence** - DashMap caches, HNSW vector index, BM25 fulltext
//!
//! ## Example
//!
//! ```ignore
//! use mnemograph_memory::{MemoryRecord, MemorySearch, MemoryStore, SearchRequest, VectorEngine};
//!
//! let engine = Arc::new(VectorEngine::hashed());
//! let store = Arc::new(MemoryStore::new(&db_path, engine.clone())?);
//!
//! let memory = MemoryRecord::builder()
//!     .name("Nginx upload limit")
//!     .memory_type("fix")
//!     .meta("port", 9000)
//!     .tag("nginx")
//!     .build()?;
//! store.create_memory(memory)?;
//!
//! let search = MemorySearch::new(store, engine);
//! let results = search.search(&SearchRequest::new("nginx body size")).await?;
//! ```

pub mod embedding;
pub mod error;
pub mod fulltext;
pub mod graph;
pub mod migration;
pub mod node;
pub mod search;
pub mod storage;
pub mod temporal;

// Re-exports for convenience
pub use embedding::{cosine_similarity, Embedder, EmbeddingModel, HashedEmbedding, VectorEngine};
pub use error::{MemoryError, Result};
pub use graph::{to_plain_int, GraphStore, SimilarityPrimitive};
pub use node::{
    MemoryId, MemoryRecord, MemoryRecordBuilder, Observation, ObservationId, Relation, RelationKey,
};
pub use search::{
    classify, CapabilityCache, GraphContext, IntentType, MatchType, MemorySearch, QueryIntent,
    RankedResult, RelatedMemory, SearchConfig, SearchRequest, VectorCapability,
};
pub use storage::{MemoryStore, MemoryUpdate, StoreOptions};
pub use temporal::Timestamps;
