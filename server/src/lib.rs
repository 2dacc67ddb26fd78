//! Mnemograph MCP Server Library
//!
//! Serves the Mnemograph memory store over the Model Context Protocol:
//! line-delimited JSON-RPC 2.0 on stdio, with tools for creating, linking,
//! searching and deleting memories.

pub mod config;
pub mod error;
pub mod mcp;
pub mod memory;

pub use config::{EmbedderKind, ServerConfig, VectorBackend};
pub use error::{ServerError, ServerResult};
pub use mcp::McpServer;
pub use memory::MemoryManager;
