//! Example consumer: an MCP stdio server over the demo configuration.
//!
//! Run from repo root: `PLATFORM_MCP_CONFIG=example_consumer/platform-mcp.json cargo run -p example-consumer`

use async_trait::async_trait;
use platform_mcp::config::ValidationRule;
use platform_mcp::{
    load_from_path, resolve, Action, ActionParameter, AppError, AppState, CrudService, DocumentStore, McpServer,
    MemoryStore, PgStore, ResultEnvelope, Settings, StoreBackend,
};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Marks a user inactive by email.
struct DeactivateUser;

#[async_trait]
impl Action for DeactivateUser {
    fn identifier(&self) -> &str {
        "deactivate-user"
    }

    fn name(&self) -> &str {
        "Deactivate User"
    }

    fn description(&self) -> &str {
        "Sets a user's status to inactive"
    }

    fn parameters(&self) -> Vec<ActionParameter> {
        vec![ActionParameter::new("email", "The email address of the user", "string").rules(ValidationRule {
            required: Some(true),
            format: Some("email".into()),
            ..Default::default()
        })]
    }

    async fn handle(&self, state: &AppState, attributes: Map<String, Value>) -> Result<ResultEnvelope, AppError> {
        let crud = CrudService::new(state.clone());
        let email = attributes.get("email").cloned().unwrap_or(Value::Null);
        let request = platform_mcp::QueryRequest::new("users").filter("email", email).page(1, 1);
        let found = crud.read(&request).await;
        let Some(id) = found
            .data
            .as_ref()
            .and_then(|d| d.get(0))
            .and_then(|u| u.get("id"))
            .cloned()
        else {
            return Ok(ResultEnvelope::error("No user with that email address exists."));
        };
        let updated = crud.update("users", &id, &json!({"status": "inactive"})).await;
        if !updated.success {
            return Ok(updated);
        }
        Ok(ResultEnvelope::success(json!({"id": id}), Map::new()).with_message("User deactivated successfully"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("platform_mcp=info,example_consumer=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let config = load_from_path(&settings.config_path).await?;
    let registry = resolve(&config)?;
    tracing::info!(resources = ?registry.list_available(), "resources resolved");

    let state = match &settings.store {
        StoreBackend::Postgres { database_url } => AppState::new(registry, PgStore::connect(database_url).await?),
        StoreBackend::Memory => {
            tracing::warn!("no DATABASE_URL set; using the in-memory store");
            AppState::new(registry, MemoryStore::new())
        }
    };

    let base_dir = settings.config_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let documents = DocumentStore::new(config.documents.clone(), base_dir);
    let mut server = McpServer::new(state, &config.server, documents);
    server.register_action(Arc::new(DeactivateUser))?;
    server.run_stdio().await?;
    Ok(())
}
