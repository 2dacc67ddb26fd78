//! Embedding module for semantic search
//!
//! [`VectorEngine`] wraps an [`EmbeddingModel`] with a text cache and is the
//! [`Embedder`] the store and the search channels talk to. Two models ship:
//! the offline [`HashedEmbedding`] and, behind the `fastembed` feature,
//! BGE-Small-EN-v1.5.

mod discovery;
mod engine;
#[cfg(feature = "fastembed")]
mod fastembed;
mod hashed;

pub use discovery::find_models_path;
pub use engine::VectorEngine;
#[cfg(feature = "fastembed")]
pub use self::fastembed::FastEmbedModel;
pub use hashed::HashedEmbedding;

use crate::error::Result;

/// Text to fixed-length vector
pub trait Embedder: Send + Sync {
    /// Embed one text. Fails on empty input.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of every vector this embedder returns
    fn dimensions(&self) -> usize;
}

/// A raw embedding backend
pub trait EmbeddingModel: Send + Sync {
    /// Short model identifier for logs
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Cosine similarity between two vectors
///
/// Zero-magnitude or length-mismatched inputs yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}
