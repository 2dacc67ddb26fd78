//! Model path discovery utilities
//!
//! Finds the embedding model cache across different installation scenarios.

use crate::error::{MemoryError, Result};
use std::path::{Path, PathBuf};

/// Find the model cache directory with priority:
/// 1. MNEMOGRAPH_MODELS_PATH environment variable
/// 2. Bundled location (`<base>/models`)
/// 3. User home directory (`~/.mnemograph/models`, created if missing)
pub fn find_models_path(base_path: Option<&Path>) -> Result<PathBuf> {
    // Priority 1: explicit override
    if let Ok(models_path) = std::env::var("MNEMOGRAPH_MODELS_PATH") {
        let path = PathBuf::from(&models_path);
        if path.is_dir() {
            log::info!("Using MNEMOGRAPH_MODELS_PATH: {}", path.display());
            return Ok(path);
        }
        log::warn!(
            "MNEMOGRAPH_MODELS_PATH set but directory not found: {}",
            models_path
        );
    }

    // Priority 2: bundled next to the install
    if let Some(base) = base_path {
        let bundled = base.join("models");
        if bundled.is_dir() {
            log::info!("Using bundled models: {}", bundled.display());
            return Ok(bundled);
        }
    }

    // Priority 3: user home directory
    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        let user_path = PathBuf::from(home).join(".mnemograph").join("models");
        std::fs::create_dir_all(&user_path)?;
        log::info!("Using user model cache: {}", user_path.display());
        return Ok(user_path);
    }

    Err(MemoryError::model(
        "No model directory available. Checked:\n\
         - MNEMOGRAPH_MODELS_PATH environment variable\n\
         - Bundled location (<install>/models)\n\
         - ~/.mnemograph/models",
    ))
}
