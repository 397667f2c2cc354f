//! Platform MCP: configuration-driven CRUD tools over JSON:API-style queries, served via MCP.

pub mod config;
pub mod error;
pub mod mcp;
pub mod query;
pub mod response;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{load_from_path, resolve, FullConfig, ResolvedEntity, ResourceRegistry, Settings, StoreBackend, ValidationRule};
pub use error::{AppError, ConfigError};
pub use mcp::{Action, ActionParameter, DocumentStore, McpServer};
pub use query::QueryRequest;
pub use response::ResultEnvelope;
pub use service::CrudService;
pub use state::AppState;
pub use store::{EntityStore, MemoryStore, PgStore};
