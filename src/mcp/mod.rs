//! MCP (Model Context Protocol) surface: JSON-RPC over stdio exposing the CRUD tools,
//! registered business actions and read-only documents.

pub mod actions;
pub mod documents;
pub mod server;
pub mod tools;

pub use actions::{Action, ActionParameter};
pub use documents::{DocumentError, DocumentStore};
pub use server::{JsonRpcError, JsonRpcMessage, McpServer};
pub use tools::{ToolCallError, ToolContent, ToolDefinition, ToolRegistry, ToolResult};

use crate::config::ServerConfig;
use serde::{Deserialize, Serialize};

/// MCP protocol version supported.
pub const MCP_VERSION: &str = "2024-11-05";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl From<&ServerConfig> for ServerInfo {
    fn from(c: &ServerConfig) -> Self {
        ServerInfo {
            name: c.name.clone(),
            version: c.version.clone(),
        }
    }
}
