//! MCP (Model Context Protocol) Server Module
//!
//! Lets MCP clients store, link and query memories.
//!
//! ## Usage
//!
//! ```bash
//! mnemograph --data-dir ~/.mnemograph/memory
//! ```
//!
//! The server communicates via stdio using JSON-RPC 2.0.

pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::*;
pub use server::McpServer;
