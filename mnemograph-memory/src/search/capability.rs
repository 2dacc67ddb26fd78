//! Backend similarity capability detection
//!
//! The store is probed once for a similarity primitive and the answer is
//! cached in an atomic cell. Concurrent first use may probe more than once.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use crate::graph::{GraphStore, SimilarityPrimitive};

/// How the backend can evaluate vector similarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorCapability {
    /// Native vector function or index
    Full,
    /// Generic similarity library function
    Approximate,
    /// Nothing; similarity is computed in process
    None,
}

impl VectorCapability {
    /// Primitive to ask the store for, if any
    pub fn primitive(self) -> Option<SimilarityPrimitive> {
        match self {
            Self::Full => Some(SimilarityPrimitive::Native),
            Self::Approximate => Some(SimilarityPrimitive::Library),
            Self::None => None,
        }
    }

    fn to_state(self) -> u8 {
        match self {
            Self::None => STATE_NONE,
            Self::Approximate => STATE_APPROXIMATE,
            Self::Full => STATE_FULL,
        }
    }

    fn from_state(state: u8) -> Option<Self> {
        match state {
            STATE_NONE => Some(Self::None),
            STATE_APPROXIMATE => Some(Self::Approximate),
            STATE_FULL => Some(Self::Full),
            _ => None,
        }
    }
}

impl std::fmt::Display for VectorCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Approximate => write!(f, "approximate"),
            Self::None => write!(f, "none"),
        }
    }
}

const STATE_UNKNOWN: u8 = 0;
const STATE_NONE: u8 = 1;
const STATE_APPROXIMATE: u8 = 2;
const STATE_FULL: u8 = 3;

/// Cached capability
#[derive(Debug)]
pub struct CapabilityCache {
    state: AtomicU8,
}

impl Default for CapabilityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_UNKNOWN),
        }
    }

    /// Process-wide cache shared by every [`super::MemorySearch`] built with defaults
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<CapabilityCache>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Cached value, if a probe has completed
    pub fn get(&self) -> Option<VectorCapability> {
        VectorCapability::from_state(self.state.load(Ordering::Acquire))
    }

    pub fn set(&self, capability: VectorCapability) {
        self.state.store(capability.to_state(), Ordering::Release);
    }

    /// Forget the cached value so the next search probes again
    pub fn reset(&self) {
        self.state.store(STATE_UNKNOWN, Ordering::Release);
    }

    /// Cached capability, probing the store on first use
    pub async fn detect(&self, store: &dyn GraphStore) -> VectorCapability {
        if let Some(capability) = self.get() {
            return capability;
        }
        let capability = probe(store).await;
        self.set(capability);
        log::info!("Vector capability detected: {}", capability);
        capability
    }
}

/// Library probe first, then native; failures are never surfaced
async fn probe(store: &dyn GraphStore) -> VectorCapability {
    match store.probe(SimilarityPrimitive::Library).await {
        Ok(()) => return VectorCapability::Approximate,
        Err(e) => log::debug!("Library similarity probe failed: {}", e),
    }
    match store.probe(SimilarityPrimitive::Native).await {
        Ok(()) => VectorCapability::Full,
        Err(e) => {
            log::debug!("Native similarity probe failed: {}", e);
            VectorCapability::None
        }
    }
}
