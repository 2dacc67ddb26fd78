//! MCP Resource Definitions
//!
//! Read-only JSON views over the memory store.

use super::protocol::{Resource, ResourceContent, ResourceReadResult};
use crate::memory::MemoryManager;
use serde_json::{json, Value};

pub const MEMORY_STATS_URI: &str = "mnemograph://memory/stats";
pub const SEARCH_CAPABILITY_URI: &str = "mnemograph://search/capability";

/// Get all available resources
pub fn get_all_resources() -> Vec<Resource> {
    vec![
        Resource {
            uri: MEMORY_STATS_URI.to_string(),
            name: "Memory Statistics".to_string(),
            description: "Memory, observation and relation counts by type and tag".to_string(),
            mime_type: "application/json".to_string(),
        },
        Resource {
            uri: SEARCH_CAPABILITY_URI.to_string(),
            name: "Search Capability".to_string(),
            description: "Vector search capability detected for the open store".to_string(),
            mime_type: "application/json".to_string(),
        },
    ]
}

/// Read a resource by URI; `None` for unknown URIs
pub async fn read_resource(uri: &str, manager: &MemoryManager) -> Option<ResourceReadResult> {
    let body = match uri {
        MEMORY_STATS_URI => memory_stats(manager).await,
        SEARCH_CAPABILITY_URI => search_capability(manager).await,
        _ => return None,
    };

    Some(ResourceReadResult {
        contents: vec![ResourceContent {
            uri: uri.to_string(),
            mime_type: "application/json".to_string(),
            text: serde_json::to_string_pretty(&body).unwrap_or_default(),
        }],
    })
}

async fn memory_stats(manager: &MemoryManager) -> Value {
    match manager.stats().await {
        Ok(stats) => stats,
        Err(e) => json!({ "error": format!("Failed to get memory stats: {}", e) }),
    }
}

async fn search_capability(manager: &MemoryManager) -> Value {
    match manager.capability().await {
        Ok(capability) => json!({
            "capability": capability,
            "backend": format!("{:?}", manager.config().vector_backend).to_lowercase(),
            "fulltext": manager.config().fulltext,
            "tagThreshold": manager.config().tag_threshold,
        }),
        Err(e) => json!({ "error": format!("Failed to detect capability: {}", e) }),
    }
}
