//! Memory graph node and edge types
//!
//! A [`MemoryRecord`] is a named, typed node carrying arbitrary JSON metadata,
//! tags and free-text [`Observation`]s. [`Relation`]s are directed, typed edges
//! between two records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::temporal::Timestamps;

/// Unique identifier for memory nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random MemoryId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Unique identifier for observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationId(pub Uuid);

impl ObservationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ObservationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// A free-text fact attached to exactly one memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: ObservationId,
    /// Non-empty text
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Confidence in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Observation {
    /// Create an observation, rejecting blank content
    pub fn new(content: impl Into<String>) -> Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(MemoryError::invalid_argument(
                "observation content must not be empty",
            ));
        }
        Ok(Self {
            id: ObservationId::new(),
            content,
            created_at: Utc::now(),
            source: None,
            confidence: None,
            embedding: None,
        })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(clamp_unit(confidence));
        self
    }
}

/// Identity of a relation: at most one edge per (from, to, type)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationKey {
    pub from: MemoryId,
    pub to: MemoryId,
    pub relation_type: String,
}

impl RelationKey {
    /// RocksDB key for this relation
    pub fn storage_key(&self) -> String {
        format!("rel:{}:{}:{}", self.from, self.to, self.relation_type)
    }
}

/// Directed, typed edge between two memories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub from: MemoryId,
    pub to: MemoryId,
    pub relation_type: String,
    /// Strength in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Relation {
    /// Create a relation; the type is trimmed and must not be blank
    pub fn new(from: MemoryId, to: MemoryId, relation_type: impl Into<String>) -> Result<Self> {
        let relation_type = relation_type.into().trim().to_string();
        if relation_type.is_empty() {
            return Err(MemoryError::invalid_argument(
                "relation type must not be empty",
            ));
        }
        Ok(Self {
            from,
            to,
            relation_type,
            strength: None,
            context: Vec::new(),
            source: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = Some(clamp_unit(strength));
        self
    }

    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn key(&self) -> RelationKey {
        RelationKey {
            from: self.from,
            to: self.to,
            relation_type: self.relation_type.clone(),
        }
    }
}

/// A memory node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Unique identifier, immutable once assigned
    pub id: MemoryId,
    pub name: String,
    /// Free-text category
    pub memory_type: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
    /// Name embedding, never serialized
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Attached observations in creation order (only populated on reads that ask for them)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<Observation>,
}

impl MemoryRecord {
    /// Create a new builder for MemoryRecord
    pub fn builder() -> MemoryRecordBuilder {
        MemoryRecordBuilder::new()
    }

    /// True if no type filter is given or the record's type is in it
    pub fn matches_types(&self, types: Option<&[String]>) -> bool {
        match types {
            None => true,
            Some([]) => true,
            Some(types) => types.iter().any(|t| t == &self.memory_type),
        }
    }

    /// Top-level scalar metadata values rendered as text
    pub fn metadata_scalars(&self) -> impl Iterator<Item = String> + '_ {
        self.metadata.values().filter_map(|value| match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Text indexed for fulltext search: metadata values and observations
    pub fn fulltext_document(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        collect_text(&Value::Object(self.metadata.clone()), &mut parts);
        parts.extend(self.observations.iter().map(|o| o.content.clone()));
        parts.join(" ")
    }

    /// Copy without observations or embedding, as persisted under `mem:`
    pub fn stored_form(&self) -> Self {
        Self {
            embedding: None,
            observations: Vec::new(),
            ..self.clone()
        }
    }
}

fn collect_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_text(v, out)),
        Value::Null => {}
    }
}

/// Lowercase, trim and de-duplicate tags, keeping first-seen order
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Builder for MemoryRecord with fluent API
#[derive(Debug, Default)]
pub struct MemoryRecordBuilder {
    id: Option<MemoryId>,
    name: Option<String>,
    memory_type: Option<String>,
    metadata: Map<String, Value>,
    timestamps: Option<Timestamps>,
    embedding: Option<Vec<f32>>,
    tags: Vec<String>,
}

impl MemoryRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memory ID (auto-generated if not set)
    pub fn id(mut self, id: MemoryId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn memory_type(mut self, memory_type: impl Into<String>) -> Self {
        self.memory_type = Some(memory_type.into());
        self
    }

    /// Set a single metadata field
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace all metadata
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn timestamps(mut self, timestamps: Timestamps) -> Self {
        self.timestamps = Some(timestamps);
        self
    }

    /// Set embedding vector
    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set multiple tags
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Build the MemoryRecord
    pub fn build(self) -> std::result::Result<MemoryRecord, MemoryRecordBuilderError> {
        let name = self.name.ok_or(MemoryRecordBuilderError::MissingName)?;
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(MemoryRecordBuilderError::EmptyName);
        }
        let memory_type = self
            .memory_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(MemoryRecordBuilderError::MissingType)?;

        Ok(MemoryRecord {
            id: self.id.unwrap_or_default(),
            name,
            memory_type,
            metadata: self.metadata,
            timestamps: self.timestamps.unwrap_or_default(),
            embedding: self.embedding,
            tags: normalize_tags(self.tags),
            observations: Vec::new(),
        })
    }
}

/// Errors that can occur when building a MemoryRecord
#[derive(Debug, thiserror::Error)]
pub enum MemoryRecordBuilderError {
    #[error("Missing required field: name")]
    MissingName,
    #[error("Name must not be blank")]
    EmptyName,
    #[error("Missing required field: memoryType")]
    MissingType,
}
