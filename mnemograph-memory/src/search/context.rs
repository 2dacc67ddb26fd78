//! Graph context enrichment
//!
//! One store round trip fetches every path of up to `max_hops` edges around
//! the result set; rows are then filtered, deduplicated by target and capped
//! per direction, keeping the store's order.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{MemoryError, Result};
use crate::graph::{to_plain_int, GraphStore, PathDirection};
use crate::node::MemoryId;

/// A memory reachable from a result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedMemory {
    pub id: MemoryId,
    pub name: String,
    #[serde(rename = "type")]
    pub memory_type: String,
    /// Type of the relation touching the result memory
    pub relation_type: String,
    pub hop_distance: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Ancestors and descendants of one result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphContext {
    pub ancestors: Vec<RelatedMemory>,
    pub descendants: Vec<RelatedMemory>,
}

/// Context for every id in `ids`; ids without relations get an empty context
pub async fn enrich(
    store: &dyn GraphStore,
    ids: &[MemoryId],
    max_hops: u32,
    per_direction: usize,
) -> Result<HashMap<MemoryId, GraphContext>> {
    let mut contexts: HashMap<MemoryId, GraphContext> =
        ids.iter().map(|id| (*id, GraphContext::default())).collect();
    if ids.is_empty() {
        return Ok(contexts);
    }

    let rows = store
        .related_paths(ids, max_hops)
        .await
        .map_err(|e| MemoryError::enrichment(e.to_string()))?;

    let mut seen: HashSet<(MemoryId, PathDirection, MemoryId)> = HashSet::new();
    for row in rows {
        let Some(related_id) = row.related_id else {
            continue;
        };
        if related_id == row.anchor {
            continue;
        }
        let Some(context) = contexts.get_mut(&row.anchor) else {
            continue;
        };
        let list = match row.direction {
            PathDirection::Ancestor => &mut context.ancestors,
            PathDirection::Descendant => &mut context.descendants,
        };
        if list.len() >= per_direction {
            continue;
        }
        let Some(hops) = to_plain_int(&row.hops).and_then(|h| u32::try_from(h).ok()) else {
            log::warn!(
                "Skipping path row {} -> {} with unreadable hop count {}",
                row.anchor,
                related_id,
                row.hops
            );
            continue;
        };
        if !seen.insert((row.anchor, row.direction, related_id)) {
            continue;
        }

        list.push(RelatedMemory {
            id: related_id,
            name: row.related_name.unwrap_or_default(),
            memory_type: row.related_type.unwrap_or_default(),
            relation_type: row.relation_type.unwrap_or_default(),
            hop_distance: hops,
            strength: row.strength,
            source: row.source,
            created_at: row.created_at,
        });
    }

    Ok(contexts)
}
