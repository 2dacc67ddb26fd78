//! MCP Tool Definitions
//!
//! Schemas for the eleven memory tools and the typed arguments each one
//! accepts.

use super::protocol::{PropertySchema, Tool, ToolInputSchema};
use mnemograph_memory::{MemoryId, ObservationId};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Get all available memory tools
pub fn get_all_tools() -> Vec<Tool> {
    vec![
        memory_create_tool(),
        memory_search_tool(),
        memory_get_tool(),
        memory_update_tool(),
        memory_delete_tool(),
        memory_list_tool(),
        observation_add_tool(),
        observation_delete_tool(),
        relation_create_tool(),
        relation_delete_tool(),
        memory_stats_tool(),
    ]
}

fn prop(property_type: &str, description: &str) -> PropertySchema {
    PropertySchema {
        property_type: property_type.to_string(),
        description: Some(description.to_string()),
        ..Default::default()
    }
}

fn string_prop(description: &str) -> PropertySchema {
    prop("string", description)
}

fn number_prop(
    description: &str,
    default: f64,
    minimum: f64,
    maximum: Option<f64>,
) -> PropertySchema {
    PropertySchema {
        default: Some(serde_json::json!(default)),
        minimum: Some(minimum),
        maximum,
        ..prop("number", description)
    }
}

fn boolean_prop(description: &str, default: bool) -> PropertySchema {
    PropertySchema {
        default: Some(serde_json::json!(default)),
        ..prop("boolean", description)
    }
}

fn string_array_prop(description: &str) -> PropertySchema {
    PropertySchema {
        items: Some(Box::new(PropertySchema {
            property_type: "string".to_string(),
            ..Default::default()
        })),
        ..prop("array", description)
    }
}

fn tool(
    name: &str,
    description: &str,
    properties: Vec<(&str, PropertySchema)>,
    required: &[&str],
) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: ToolInputSchema {
            schema_type: "object".to_string(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
            required: required.iter().map(|s| s.to_string()).collect(),
        },
    }
}

fn memory_create_tool() -> Tool {
    tool(
        "memory_create",
        "Store a new memory. The name is embedded for semantic search; metadata values \
         are matched exactly and indexed for fulltext search.",
        vec![
            ("name", string_prop("Short descriptive name")),
            ("type", string_prop("Free-text category, e.g. 'fix', 'decision', 'person'")),
            ("metadata", prop("object", "Arbitrary key/value properties")),
            ("tags", string_array_prop("Tags (normalized to lowercase)")),
            ("observations", string_array_prop("Initial free-text facts")),
        ],
        &["name", "type"],
    )
}

fn memory_search_tool() -> Tool {
    tool(
        "memory_search",
        "Search memories by meaning, exact value or tag. Use '*' for an overview of \
         top-level memories. Results carry a score in [0, 1], a match type and nearby \
         graph context.",
        vec![
            ("query", string_prop("Natural language, an exact value, or '*'")),
            ("limit", number_prop("Maximum results", 10.0, 1.0, Some(100.0))),
            ("threshold", number_prop("Minimum score", 0.1, 0.0, Some(1.0))),
            ("types", string_array_prop("Only return memories of these types")),
            (
                "includeGraphContext",
                boolean_prop("Attach related ancestors and descendants", true),
            ),
        ],
        &["query"],
    )
}

fn memory_get_tool() -> Tool {
    tool(
        "memory_get",
        "Get a memory with its observations and relations.",
        vec![("id", string_prop("Memory ID"))],
        &["id"],
    )
}

fn memory_update_tool() -> Tool {
    tool(
        "memory_update",
        "Update a memory. Metadata is merged key by key; a null value removes the key. \
         Tags, when given, replace the existing set.",
        vec![
            ("id", string_prop("Memory ID")),
            ("name", string_prop("New name (re-embedded)")),
            ("type", string_prop("New type")),
            ("metadata", prop("object", "Metadata changes")),
            ("tags", string_array_prop("Replacement tags")),
        ],
        &["id"],
    )
}

fn memory_delete_tool() -> Tool {
    tool(
        "memory_delete",
        "Delete a memory together with its observations and relations.",
        vec![("id", string_prop("Memory ID"))],
        &["id"],
    )
}

fn memory_list_tool() -> Tool {
    tool(
        "memory_list",
        "Page through memories in creation order.",
        vec![
            ("types", string_array_prop("Only list memories of these types")),
            ("offset", number_prop("Memories to skip", 0.0, 0.0, None)),
            ("limit", number_prop("Page size", 50.0, 1.0, Some(500.0))),
        ],
        &[],
    )
}

fn observation_add_tool() -> Tool {
    tool(
        "observation_add",
        "Attach free-text observations to a memory.",
        vec![
            ("memoryId", string_prop("Memory ID")),
            ("observations", string_array_prop("Observation texts (non-empty)")),
            ("source", string_prop("Where the observations came from")),
            (
                "confidence",
                number_prop("Confidence in the observations", 1.0, 0.0, Some(1.0)),
            ),
        ],
        &["memoryId", "observations"],
    )
}

fn observation_delete_tool() -> Tool {
    tool(
        "observation_delete",
        "Remove observations from a memory by ID.",
        vec![
            ("memoryId", string_prop("Memory ID")),
            ("observationIds", string_array_prop("Observation IDs")),
        ],
        &["memoryId", "observationIds"],
    )
}

fn relation_create_tool() -> Tool {
    tool(
        "relation_create",
        "Link two memories with a typed, directed relation. Creating an existing \
         (from, to, type) relation is a no-op.",
        vec![
            ("from", string_prop("Source memory ID")),
            ("to", string_prop("Target memory ID")),
            ("relationType", string_prop("Relation type, e.g. 'contains', 'depends_on'")),
            ("strength", number_prop("Relation strength", 1.0, 0.0, Some(1.0))),
            ("source", string_prop("Where the relation came from")),
            ("context", string_array_prop("Free-text context")),
        ],
        &["from", "to", "relationType"],
    )
}

fn relation_delete_tool() -> Tool {
    tool(
        "relation_delete",
        "Remove a relation.",
        vec![
            ("from", string_prop("Source memory ID")),
            ("to", string_prop("Target memory ID")),
            ("relationType", string_prop("Relation type")),
        ],
        &["from", "to", "relationType"],
    )
}

fn memory_stats_tool() -> Tool {
    tool(
        "memory_stats",
        "Counts of memories, observations and relations, and index status.",
        vec![],
        &[],
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateArgs {
    pub name: String,
    #[serde(rename = "type")]
    pub memory_type: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub observations: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchArgs {
    pub query: String,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
    pub types: Option<Vec<String>>,
    pub include_graph_context: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct IdArgs {
    pub id: MemoryId,
}

#[derive(Debug, Deserialize)]
pub struct UpdateArgs {
    pub id: MemoryId,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub memory_type: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListArgs {
    pub types: Option<Vec<String>>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationAddArgs {
    pub memory_id: MemoryId,
    pub observations: Vec<String>,
    pub source: Option<String>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationDeleteArgs {
    pub memory_id: MemoryId,
    pub observation_ids: Vec<ObservationId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationArgs {
    pub from: MemoryId,
    pub to: MemoryId,
    pub relation_type: String,
    pub strength: Option<f32>,
    pub source: Option<String>,
    #[serde(default)]
    pub context: Vec<String>,
}
