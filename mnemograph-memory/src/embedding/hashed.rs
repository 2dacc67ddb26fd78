//! Feature-hashing embeddings
//!
//! Deterministic, dependency-free vectors built from word and character
//! trigram hashes. Useful offline and in tests; similarity reflects lexical
//! overlap rather than meaning.

use super::EmbeddingModel;
use crate::error::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const DEFAULT_DIMENSION: usize = 256;
const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Hashed bag-of-words + trigram embedding model
#[derive(Debug, Clone)]
pub struct HashedEmbedding {
    dimension: usize,
}

impl HashedEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.accumulate(&mut embedding, word, WORD_WEIGHT);

            let padded: Vec<char> = format!("#{}#", word).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.accumulate(&mut embedding, &trigram, TRIGRAM_WEIGHT);
            }
        }

        // Normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }
        embedding
    }

    fn accumulate(&self, embedding: &mut [f32], feature: &str, weight: f32) {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        let hash = hasher.finish();

        let index = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        embedding[index] += sign * weight;
    }
}

impl Default for HashedEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl EmbeddingModel for HashedEmbedding {
    fn name(&self) -> &str {
        "hashed"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let model = HashedEmbedding::default();
        let a = model.embed_batch(&["Hello World"]).unwrap();
        let b = model.embed_batch(&["hello world"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalized() {
        let model = HashedEmbedding::new(64);
        let v = &model.embed_batch(&["rust borrow checker"]).unwrap()[0];
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert_eq!(v.len(), 64);
    }

    #[test]
    fn test_punctuation_only_is_zero_vector() {
        let model = HashedEmbedding::default();
        let v = &model.embed_batch(&["!!! ---"]).unwrap()[0];
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_shared_words_score_higher() {
        let model = HashedEmbedding::default();
        let vs = model
            .embed_batch(&["tokio runtime", "tokio runtime tuning", "garden hose"])
            .unwrap();
        assert!(cosine_similarity(&vs[0], &vs[1]) > cosine_similarity(&vs[0], &vs[2]));
    }
}
