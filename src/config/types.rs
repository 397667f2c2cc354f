//! Raw config types matching the JSON configuration file (entities, resources, documents).

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_server_version")]
    pub version: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: default_server_name(),
            version: default_server_version(),
            instructions: None,
        }
    }
}

fn default_server_name() -> String {
    "Platform Server".into()
}

fn default_server_version() -> String {
    "1.0.0".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type", default = "default_column_type")]
    pub type_: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Literal default applied when an insert omits the column.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

fn default_column_type() -> String {
    "text".into()
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Exact,
    Partial,
}

/// A filterable field: either a bare column name (exact match) or `{ "name", "match" }`.
#[derive(Clone, Debug, Serialize)]
pub struct FilterableConfig {
    pub name: String,
    #[serde(rename = "match")]
    pub mode: MatchMode,
}

impl<'de> Deserialize<'de> for FilterableConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Detailed {
                name: String,
                #[serde(default, rename = "match")]
                mode: MatchMode,
            },
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Name(name) => FilterableConfig { name, mode: MatchMode::Exact },
            Raw::Detailed { name, mode } => FilterableConfig { name, mode },
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeOp {
    Eq,
    Partial,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
    Null,
    NotNull,
}

/// Named filter predicate. With `value` set the scope is fixed; otherwise the filter argument is used.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub name: String,
    pub column: String,
    pub op: ScopeOp,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// Named sort predicate ordering by several columns in the requested direction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortScopeConfig {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// We hold the foreign key (`foreign_key` is our column).
    BelongsTo,
    /// They hold the foreign key (`foreign_key` is their column).
    HasMany,
    HasOne,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    pub name: String,
    /// Public key of the related resource.
    pub resource: String,
    pub kind: RelationKind,
    pub foreign_key: String,
    /// Defaults to the primary key of the side that does not hold the foreign key.
    #[serde(default)]
    pub owner_key: Option<String>,
}

/// Computed attribute built from a `{column}` template.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendConfig {
    pub name: String,
    pub template: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    /// `pattern` compiled once when the configuration is resolved.
    #[serde(skip)]
    pub compiled_pattern: Option<regex::Regex>,
}

impl ValidationRule {
    /// Compile `pattern` ahead of use so a bad expression fails at startup.
    pub fn compile(&mut self) -> Result<(), regex::Error> {
        self.compiled_pattern = match &self.pattern {
            Some(pattern) => Some(regex::Regex::new(pattern)?),
            None => None,
        };
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub id: String,
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    pub columns: Vec<ColumnConfig>,
    #[serde(default = "default_true")]
    pub timestamps: bool,
    #[serde(default)]
    pub soft_deletes: bool,
    /// Omitted: every column is filterable by exact match.
    #[serde(default)]
    pub filterable: Option<Vec<FilterableConfig>>,
    /// Omitted: every column is sortable.
    #[serde(default)]
    pub sortable: Option<Vec<String>>,
    #[serde(default)]
    pub scopes: Vec<ScopeConfig>,
    #[serde(default)]
    pub sort_scopes: Vec<SortScopeConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
    #[serde(default)]
    pub appends: Vec<AppendConfig>,
    /// Omitted: the entity has no validation support and cannot be written through the tools.
    #[serde(default)]
    pub validation: Option<HashMap<String, ValidationRule>>,
}

fn default_primary_key() -> String {
    "id".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub uri_key: String,
    pub entity_id: String,
    #[serde(default = "default_operations")]
    pub operations: Vec<String>,
    /// Attributes that must never be exposed (e.g. password hashes, secrets).
    #[serde(default)]
    pub hidden: Vec<String>,
}

fn default_operations() -> Vec<String> {
    ["create", "read", "update", "delete"].iter().map(|s| s.to_string()).collect()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    Path(String),
    Text(String),
}

/// A read-only document exposed as an MCP resource (e.g. `domain://dbml`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentConfig {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    pub source: DocumentSource,
}

fn default_mime_type() -> String {
    "text/plain".into()
}

/// All config types in one struct, as read from the configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    #[serde(default)]
    pub documents: Vec<DocumentConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filterable_accepts_name_or_object() {
        let v: Vec<FilterableConfig> =
            serde_json::from_str(r#"["email", {"name": "name", "match": "partial"}]"#).unwrap();
        assert_eq!(v[0].mode, MatchMode::Exact);
        assert_eq!(v[1].name, "name");
        assert_eq!(v[1].mode, MatchMode::Partial);
    }

    #[test]
    fn test_resource_defaults_to_all_operations() {
        let r: ResourceConfig = serde_json::from_str(r#"{"uri_key": "users", "entity_id": "user"}"#).unwrap();
        assert_eq!(r.operations, vec!["create", "read", "update", "delete"]);
        assert!(r.hidden.is_empty());
    }

    #[test]
    fn test_document_source_is_tagged() {
        let d: DocumentConfig = serde_json::from_str(
            r#"{"uri": "domain://dbml", "name": "Domain", "source": {"text": "Table users {}"}}"#,
        )
        .unwrap();
        assert_eq!(d.mime_type, "text/plain");
        assert!(matches!(d.source, DocumentSource::Text(ref t) if t.starts_with("Table")));
    }
}
