//! Resolved resource model: config validated and flattened for runtime use.

use crate::config::{MatchMode, RelationKind, ValidationRule};
use crate::error::{AppError, ConfigError};
use crate::store::{Predicate, Record, SortDirection, SortKey};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Builds the predicate of a named filter scope from the caller's filter value.
pub type ScopeFn = Arc<dyn Fn(&Value) -> Predicate + Send + Sync>;
/// Builds the sort keys of a named sort scope for the requested direction.
pub type SortScopeFn = Arc<dyn Fn(SortDirection) -> Vec<SortKey> + Send + Sync>;
/// Computes an appended attribute from a stored record.
pub type AppendFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Name → function table. Lookups are by exact name.
#[derive(Clone)]
pub struct FnTable<F> {
    entries: HashMap<String, F>,
}

impl<F> Default for FnTable<F> {
    fn default() -> Self {
        FnTable { entries: HashMap::new() }
    }
}

impl<F> FnTable<F> {
    pub fn insert(&mut self, name: impl Into<String>, f: F) {
        self.entries.insert(name.into(), f);
    }

    pub fn get(&self, name: &str) -> Option<&F> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<F> fmt::Debug for FnTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Primary key type for parsing caller-supplied ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyType {
    Uuid,
    BigInt,
    Int,
    Text,
}

impl KeyType {
    pub fn is_generated(self) -> bool {
        !matches!(self, KeyType::Text)
    }
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub nullable: bool,
    pub default: Option<Value>,
    /// PostgreSQL type name for SQL casts (e.g. "timestamptz") when binding string values.
    pub pg_type: Option<String>,
}

/// A relation usable in `include`. Key columns are already resolved to names on each side.
#[derive(Clone, Debug)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    /// Public key of the related resource.
    pub resource: String,
    /// Our column used in the join (our FK for belongs_to; our owner key otherwise).
    pub our_key: String,
    /// Their column used in the join (their owner key for belongs_to; their FK otherwise).
    pub their_key: String,
}

/// Another table pointing at this one through a foreign key.
#[derive(Clone, Debug)]
pub struct Reference {
    pub table_id: String,
    pub column: String,
    /// Our column the foreign key targets.
    pub target: String,
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub entity_id: String,
    /// Public key this entity is exposed under.
    pub uri_key: String,
    /// Storage identity; rows of one table are shared by every resource exposing it.
    pub table_id: String,
    pub schema_name: String,
    pub table_name: String,
    pub primary_key: String,
    pub key_type: KeyType,
    pub columns: Vec<ColumnInfo>,
    pub operations: Vec<String>,
    pub timestamps: bool,
    pub soft_deletes: bool,
    pub supports_validation: bool,
    pub validation: HashMap<String, ValidationRule>,
    pub hidden: HashSet<String>,
    pub filterable: HashMap<String, MatchMode>,
    pub sortable: HashSet<String>,
    pub scopes: FnTable<ScopeFn>,
    pub sort_scopes: FnTable<SortScopeFn>,
    pub appends: FnTable<AppendFn>,
    pub relations: Vec<Relation>,
    pub references: Vec<Reference>,
    pub referenced_by: Vec<Reference>,
}

impl ResolvedEntity {
    pub fn allows(&self, operation: &str) -> bool {
        self.operations.iter().any(|o| o == operation)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Columns maintained by the store rather than the caller.
    pub fn is_managed_column(&self, name: &str) -> bool {
        (self.timestamps && (name == "created_at" || name == "updated_at"))
            || (self.soft_deletes && name == "deleted_at")
    }

    /// Columns a caller may write. Generated primary keys are excluded.
    pub fn is_fillable(&self, name: &str) -> bool {
        if name == self.primary_key {
            return !self.key_type.is_generated();
        }
        self.column(name).is_some() && !self.is_managed_column(name)
    }

    /// Convert a caller-supplied id into the key value stored for this entity.
    pub fn parse_id(&self, raw: &Value) -> Option<Value> {
        let s = match raw {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        match self.key_type {
            KeyType::Uuid => uuid::Uuid::parse_str(&s).ok().map(|u| Value::String(u.to_string())),
            KeyType::BigInt | KeyType::Int => s.parse::<i64>().ok().map(|n| Value::Number(n.into())),
            KeyType::Text if s.is_empty() => None,
            KeyType::Text => Some(Value::String(s)),
        }
    }
}

/// Static public-key → entity table, built once at startup.
#[derive(Clone, Debug, Default)]
pub struct ResourceRegistry {
    entities: Vec<ResolvedEntity>,
    by_key: HashMap<String, usize>,
}

impl ResourceRegistry {
    pub(crate) fn from_entities(entities: Vec<ResolvedEntity>) -> Self {
        let by_key = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.uri_key.clone(), i))
            .collect();
        ResourceRegistry { entities, by_key }
    }

    pub fn get(&self, uri_key: &str) -> Option<&ResolvedEntity> {
        self.by_key.get(uri_key).map(|&i| &self.entities[i])
    }

    /// Exact lookup; the error names every available resource.
    pub fn resolve(&self, uri_key: &str) -> Result<&ResolvedEntity, AppError> {
        self.get(uri_key).ok_or_else(|| AppError::ResourceNotFound {
            resource: uri_key.to_string(),
            available: self.list_available(),
        })
    }

    /// Public keys in configuration order.
    pub fn list_available(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.uri_key.clone()).collect()
    }

    pub fn entities(&self) -> &[ResolvedEntity] {
        &self.entities
    }

    fn entity_mut(&mut self, uri_key: &str) -> Result<&mut ResolvedEntity, ConfigError> {
        let i = *self.by_key.get(uri_key).ok_or_else(|| ConfigError::MissingReference {
            kind: "resource",
            id: uri_key.to_string(),
        })?;
        Ok(&mut self.entities[i])
    }

    /// Register a filter scope in code, in addition to those declared in config.
    pub fn register_scope(&mut self, uri_key: &str, name: &str, f: ScopeFn) -> Result<(), ConfigError> {
        self.entity_mut(uri_key)?.scopes.insert(name, f);
        Ok(())
    }

    pub fn register_sort_scope(&mut self, uri_key: &str, name: &str, f: SortScopeFn) -> Result<(), ConfigError> {
        self.entity_mut(uri_key)?.sort_scopes.insert(name, f);
        Ok(())
    }

    pub fn register_append(&mut self, uri_key: &str, name: &str, f: AppendFn) -> Result<(), ConfigError> {
        self.entity_mut(uri_key)?.appends.insert(name, f);
        Ok(())
    }
}
