//! Runtime settings from the environment, with `.env` loaded through dotenvy.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Which `EntityStore` backs the tools.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    Memory,
}

#[derive(Clone, Debug)]
pub struct Settings {
    /// Path of the JSON configuration (`PLATFORM_MCP_CONFIG`, default `platform-mcp.json`).
    pub config_path: PathBuf,
    pub store: StoreBackend,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `PLATFORM_MCP_STORE` selects `postgres` or `memory`; unset means postgres when
    /// `DATABASE_URL` is present, memory otherwise.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config_path = lookup("PLATFORM_MCP_CONFIG")
            .unwrap_or_else(|| "platform-mcp.json".into())
            .into();
        let database_url = lookup("DATABASE_URL");
        let store = match lookup("PLATFORM_MCP_STORE").as_deref().map(str::to_lowercase).as_deref() {
            Some("memory") => StoreBackend::Memory,
            Some("postgres") => StoreBackend::Postgres {
                database_url: database_url.ok_or_else(|| {
                    ConfigError::Validation("PLATFORM_MCP_STORE=postgres requires DATABASE_URL".into())
                })?,
            },
            Some(other) => {
                return Err(ConfigError::Validation(format!(
                    "PLATFORM_MCP_STORE must be 'postgres' or 'memory', got '{}'",
                    other
                )))
            }
            None => match database_url {
                Some(database_url) => StoreBackend::Postgres { database_url },
                None => StoreBackend::Memory,
            },
        };
        Ok(Settings { config_path, store })
    }
}
