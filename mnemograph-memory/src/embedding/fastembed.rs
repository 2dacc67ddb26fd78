//! BGE-Small-EN-v1.5 embeddings through fastembed (ONNX Runtime)

use super::EmbeddingModel;
use crate::error::{MemoryError, Result};
use fastembed::{EmbeddingModel as FastEmbedKind, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::path::Path;

const BGE_SMALL_DIMENSION: usize = 384;

/// fastembed model wrapper
pub struct FastEmbedModel {
    model: Mutex<TextEmbedding>,
}

impl FastEmbedModel {
    /// Load (downloading on first use) BGE-Small-EN-v1.5 into `cache_dir`
    pub fn load(cache_dir: &Path) -> Result<Self> {
        log::info!("Loading BGE-Small-EN-v1.5 from: {}", cache_dir.display());

        let options = InitOptions::new(FastEmbedKind::BGESmallENV15)
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(false);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| MemoryError::model(format!("Failed to load fastembed model: {}", e)))?;

        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl EmbeddingModel for FastEmbedModel {
    fn name(&self) -> &str {
        "bge-small-en-v1.5"
    }

    fn dimension(&self) -> usize {
        BGE_SMALL_DIMENSION
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        #[allow(unused_mut)]
        let mut model = self.model.lock();
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| MemoryError::embedding(format!("Failed to encode texts: {}", e)))
    }
}
