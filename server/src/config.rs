//! Server configuration
//!
//! Built from the command line in `main.rs`; everything here has a usable
//! default so tests can construct a config directly.

use std::path::PathBuf;

use clap::ValueEnum;
use mnemograph_memory::{SearchConfig, StoreOptions};

/// Which similarity primitive the store exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum VectorBackend {
    /// HNSW index over name embeddings
    #[default]
    Native,
    /// Linear cosine function
    Library,
    /// No primitive; search scans embeddings in-process
    None,
}

/// Embedding model used for names, tags and queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EmbedderKind {
    /// Offline feature-hashing model
    #[default]
    Hashed,
    /// BGE-Small-EN-v1.5 (requires the `fastembed` feature)
    Fastembed,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// RocksDB directory
    pub data_dir: PathBuf,
    pub vector_backend: VectorBackend,
    pub fulltext: bool,
    /// Minimum best-tag similarity for semantic tag matches
    pub tag_threshold: f32,
    pub embedder: EmbedderKind,
    /// Model cache directory for `EmbedderKind::Fastembed`
    pub models_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            vector_backend: VectorBackend::default(),
            fulltext: true,
            tag_threshold: SearchConfig::default().tag_threshold,
            embedder: EmbedderKind::default(),
            models_path: None,
        }
    }
}

impl ServerConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            native_vector_index: self.vector_backend == VectorBackend::Native,
            similarity_library: self.vector_backend == VectorBackend::Library,
            fulltext_index: self.fulltext,
        }
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            tag_threshold: self.tag_threshold,
            ..SearchConfig::default()
        }
    }
}

/// `~/.mnemograph/memory`, or `.mnemograph/memory` when no home is set
pub fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".mnemograph")
        .join("memory")
}
