//! Vector embedding engine
//!
//! High-level API for generating and caching embeddings.

use super::{Embedder, EmbeddingModel, HashedEmbedding};
use crate::error::{MemoryError, Result};
use dashmap::DashMap;
use std::sync::Arc;

/// Vector embedding engine with caching
///
/// Wraps an [`EmbeddingModel`] with a DashMap cache for efficient repeated lookups.
pub struct VectorEngine {
    model: Arc<dyn EmbeddingModel>,
    cache: DashMap<String, Vec<f32>>,
    dimension: usize,
}

impl VectorEngine {
    /// Create a VectorEngine around any model
    pub fn new(model: impl EmbeddingModel + 'static) -> Self {
        let dimension = model.dimension();
        log::info!("VectorEngine ready ({}, {}d)", model.name(), dimension);

        Self {
            model: Arc::new(model),
            cache: DashMap::new(),
            dimension,
        }
    }

    /// VectorEngine backed by the offline hashed model
    pub fn hashed() -> Self {
        Self::new(HashedEmbedding::default())
    }

    /// VectorEngine backed by BGE-Small-EN-v1.5
    ///
    /// # Arguments
    /// * `base_path` - Optional install root used to locate bundled model files
    #[cfg(feature = "fastembed")]
    pub fn fastembed(base_path: Option<&std::path::Path>) -> Result<Self> {
        let cache_dir = super::find_models_path(base_path)?;
        let model = super::FastEmbedModel::load(&cache_dir)?;
        Ok(Self::new(model))
    }

    /// Generate embedding with caching
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::embedding("cannot embed empty text"));
        }

        // Check cache first
        if let Some(cached) = self.cache.get(text) {
            return Ok(cached.clone());
        }

        // Generate and cache
        let embedding = self
            .model
            .embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::embedding("model returned no vector"))?;
        self.check_dimension(&embedding)?;
        self.cache.insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    /// Batch embed with caching
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(MemoryError::embedding("cannot embed empty text"));
        }
        let texts: Vec<&str> = texts.iter().map(|t| t.trim()).collect();

        // Check cache for all texts
        let mut results: Vec<Option<Vec<f32>>> = texts
            .iter()
            .map(|text| self.cache.get(*text).map(|v| v.clone()))
            .collect();

        // Find uncached texts
        let uncached: Vec<(usize, &str)> = results
            .iter()
            .enumerate()
            .filter(|(_, cached)| cached.is_none())
            .map(|(i, _)| (i, texts[i]))
            .collect();

        if uncached.is_empty() {
            return Ok(results.into_iter().flatten().collect());
        }

        // Batch embed uncached texts
        let uncached_texts: Vec<&str> = uncached.iter().map(|(_, t)| *t).collect();
        let new_embeddings = self.model.embed_batch(&uncached_texts)?;
        if new_embeddings.len() != uncached_texts.len() {
            return Err(MemoryError::embedding(format!(
                "model returned {} vectors for {} texts",
                new_embeddings.len(),
                uncached_texts.len()
            )));
        }

        // Update cache and results
        for ((idx, text), emb) in uncached.iter().zip(new_embeddings.into_iter()) {
            self.check_dimension(&emb)?;
            self.cache.insert(text.to_string(), emb.clone());
            results[*idx] = Some(emb);
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Get embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Get cache size
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Clear the cache
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(MemoryError::embedding(format!(
                "expected {}d vector, got {}d",
                self.dimension,
                embedding.len()
            )));
        }
        Ok(())
    }
}

impl Embedder for VectorEngine {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        VectorEngine::embed(self, text)
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }
}
