//! Exact and fulltext metadata channel

use crate::error::{MemoryError, Result};
use crate::graph::{GraphStore, ScoredId};
use crate::node::MemoryId;

pub(crate) const CHANNEL: &str = "metadata";

/// Both halves of the metadata channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataHits {
    /// Case-insensitive equality with a top-level scalar metadata value
    pub exact: Vec<MemoryId>,
    /// Fulltext index hits, best first; empty when the store has no index
    pub fulltext: Vec<ScoredId>,
}

pub async fn search(
    store: &dyn GraphStore,
    query: &str,
    limit: usize,
    types: Option<&[String]>,
) -> Result<MetadataHits> {
    let (exact, fulltext) = tokio::join!(
        store.exact_metadata_matches(query, limit, types),
        store.fulltext_matches(query, limit, types),
    );

    let exact = exact.map_err(|e| MemoryError::channel(CHANNEL, e.to_string()))?;
    let fulltext = match fulltext {
        Ok(Some(hits)) => hits,
        Ok(None) => {
            log::debug!("Store has no fulltext index; fulltext sub-channel is empty");
            Vec::new()
        }
        Err(e) => {
            log::warn!("Fulltext lookup failed, keeping exact hits only: {}", e);
            Vec::new()
        }
    };

    Ok(MetadataHits { exact, fulltext })
}
