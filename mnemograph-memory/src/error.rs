//! Error types for mnemograph-memory

use thiserror::Error;

/// Errors that can occur in the memory system
#[derive(Debug, Error)]
pub enum MemoryError {
    /// RocksDB error
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// Serialization error (bincode)
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UUID parsing error
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Model loading error
    #[error("Model error: {0}")]
    Model(String),

    /// Embedding generation error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Memory, observation or relation not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record with this identity already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Caller supplied a bad query, limit, threshold or field
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A single search channel failed; never escapes a search call
    #[error("Channel '{channel}' failed: {message}")]
    Channel {
        channel: &'static str,
        message: String,
    },

    /// A capability probe failed; resolves to a weaker capability
    #[error("Capability probe failed: {0}")]
    Probe(String),

    /// Graph context lookup failed; results are returned without context
    #[error("Enrichment error: {0}")]
    Enrichment(String),

    /// Aggregation, scoring or materialization failed
    #[error("Search pipeline error: {0}")]
    Pipeline(String),

    /// On-disk format is newer than this build understands
    #[error("Unsupported database version {found} (newest supported: {supported})")]
    Version { found: u32, supported: u32 },

    /// Builder error
    #[error("Builder error: {0}")]
    Builder(#[from] crate::node::MemoryRecordBuilderError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl MemoryError {
    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create an embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a channel failure for the named channel
    pub fn channel(channel: &'static str, msg: impl Into<String>) -> Self {
        Self::Channel {
            channel,
            message: msg.into(),
        }
    }

    /// Create a probe error
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create an enrichment error
    pub fn enrichment(msg: impl Into<String>) -> Self {
        Self::Enrichment(msg.into())
    }

    /// Create a pipeline error
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for errors caused by the caller rather than the environment
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::NotFound(_)
                | Self::Conflict(_)
                | Self::Builder(_)
                | Self::Uuid(_)
        )
    }
}

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;
