//! Load config from a JSON file and resolve it into the runtime registry.

use crate::config::resolved::{
    AppendFn, ColumnInfo, FnTable, KeyType, Reference, Relation, ResolvedEntity, ResourceRegistry, ScopeFn,
    SortScopeFn,
};
use crate::config::types::*;
use crate::config::{validate, FullConfig};
use crate::error::ConfigError;
use crate::store::{CompareOp, Predicate, SortDirection, SortKey};
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Build the resource registry from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResourceRegistry, ConfigError> {
    validate(config)?;

    let entities_by_id: HashMap<_, _> = config.entities.iter().map(|e| (e.id.as_str(), e)).collect();
    let entity_of_resource: HashMap<&str, &EntityConfig> = config
        .resources
        .iter()
        .map(|r| (r.uri_key.as_str(), entities_by_id[r.entity_id.as_str()]))
        .collect();

    // Foreign keys pointing at each table, from every belongs_to / has_many declaration.
    let mut referenced_by: HashMap<&str, Vec<Reference>> = HashMap::new();
    let mut references: HashMap<&str, Vec<Reference>> = HashMap::new();
    let mut seen = HashSet::new();
    for e in &config.entities {
        for rel in &e.relations {
            let related = entity_of_resource[rel.resource.as_str()];
            let (child, parent, owner_key) = match rel.kind {
                RelationKind::BelongsTo => (e, related, rel.owner_key.as_deref().unwrap_or(&related.primary_key)),
                RelationKind::HasMany | RelationKind::HasOne => {
                    (related, e, rel.owner_key.as_deref().unwrap_or(&e.primary_key))
                }
            };
            if !seen.insert((child.id.clone(), rel.foreign_key.clone(), parent.id.clone())) {
                continue;
            }
            referenced_by.entry(parent.id.as_str()).or_default().push(Reference {
                table_id: child.id.clone(),
                column: rel.foreign_key.clone(),
                target: owner_key.to_string(),
            });
            references.entry(child.id.as_str()).or_default().push(Reference {
                table_id: parent.id.clone(),
                column: rel.foreign_key.clone(),
                target: owner_key.to_string(),
            });
        }
    }

    let mut entities = Vec::with_capacity(config.resources.len());
    for resource in &config.resources {
        let e = entities_by_id[resource.entity_id.as_str()];
        let pk_col = e
            .columns
            .iter()
            .find(|c| c.name == e.primary_key)
            .ok_or_else(|| ConfigError::InvalidPrimaryKey {
                entity_id: e.id.clone(),
                column: e.primary_key.clone(),
            })?;

        let mut columns: Vec<ColumnInfo> = e
            .columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                nullable: c.nullable,
                default: c.default.clone(),
                pg_type: column_pg_type_name(&c.type_),
            })
            .collect();
        let mut managed = Vec::new();
        if e.timestamps {
            managed.extend(["created_at", "updated_at"]);
        }
        if e.soft_deletes {
            managed.push("deleted_at");
        }
        for name in managed {
            if !columns.iter().any(|c| c.name == name) {
                columns.push(ColumnInfo {
                    name: name.to_string(),
                    nullable: true,
                    default: None,
                    pg_type: Some("timestamptz".into()),
                });
            }
        }

        let filterable = match &e.filterable {
            Some(list) => list.iter().map(|f| (f.name.clone(), f.mode)).collect(),
            None => columns.iter().map(|c| (c.name.clone(), MatchMode::Exact)).collect(),
        };
        let sortable = match &e.sortable {
            Some(list) => list.iter().cloned().collect(),
            None => columns.iter().map(|c| c.name.clone()).collect(),
        };

        let mut scopes: FnTable<ScopeFn> = FnTable::default();
        for s in &e.scopes {
            scopes.insert(s.name.clone(), scope_fn(s));
        }
        let mut sort_scopes: FnTable<SortScopeFn> = FnTable::default();
        for s in &e.sort_scopes {
            let cols = s.columns.clone();
            sort_scopes.insert(
                s.name.clone(),
                Arc::new(move |dir: SortDirection| cols.iter().map(|c| SortKey { field: c.clone(), direction: dir }).collect()),
            );
        }
        let mut appends: FnTable<AppendFn> = FnTable::default();
        for a in &e.appends {
            appends.insert(a.name.clone(), template_fn(&a.template)?);
        }

        let relations = e
            .relations
            .iter()
            .map(|rel| {
                let related = entity_of_resource[rel.resource.as_str()];
                let (our_key, their_key) = match rel.kind {
                    RelationKind::BelongsTo => (
                        rel.foreign_key.clone(),
                        rel.owner_key.clone().unwrap_or_else(|| related.primary_key.clone()),
                    ),
                    RelationKind::HasMany | RelationKind::HasOne => (
                        rel.owner_key.clone().unwrap_or_else(|| e.primary_key.clone()),
                        rel.foreign_key.clone(),
                    ),
                };
                Relation {
                    name: rel.name.clone(),
                    kind: rel.kind,
                    resource: rel.resource.clone(),
                    our_key,
                    their_key,
                }
            })
            .collect();

        entities.push(ResolvedEntity {
            entity_id: e.id.clone(),
            uri_key: resource.uri_key.clone(),
            table_id: e.id.clone(),
            schema_name: e.schema.clone().unwrap_or_else(|| "public".into()),
            table_name: e.table.clone(),
            primary_key: e.primary_key.clone(),
            key_type: infer_key_type(&pk_col.type_),
            columns,
            operations: resource.operations.clone(),
            timestamps: e.timestamps,
            soft_deletes: e.soft_deletes,
            supports_validation: e.validation.is_some(),
            validation: compile_rules(&e.id, e.validation.clone().unwrap_or_default())?,
            hidden: resource.hidden.iter().cloned().collect(),
            filterable,
            sortable,
            scopes,
            sort_scopes,
            appends,
            relations,
            references: references.get(e.id.as_str()).cloned().unwrap_or_default(),
            referenced_by: referenced_by.get(e.id.as_str()).cloned().unwrap_or_default(),
        });
        tracing::debug!(resource = %resource.uri_key, entity = %e.id, "resolved resource");
    }

    Ok(ResourceRegistry::from_entities(entities))
}

fn scope_fn(s: &ScopeConfig) -> ScopeFn {
    let field = s.column.clone();
    let op = s.op;
    let fixed = s.value.clone();
    Arc::new(move |arg: &Value| {
        let value = fixed.clone().unwrap_or_else(|| arg.clone());
        let field = field.clone();
        match op {
            ScopeOp::Eq => Predicate::Eq { field, value },
            ScopeOp::Partial => Predicate::Contains {
                field,
                needle: match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                },
            },
            ScopeOp::In => Predicate::In {
                field,
                values: match value {
                    Value::Array(values) => values,
                    Value::String(s) => s.split(',').map(|v| Value::String(v.trim().to_string())).collect(),
                    other => vec![other],
                },
            },
            ScopeOp::Gt => Predicate::Compare { field, op: CompareOp::Gt, value },
            ScopeOp::Gte => Predicate::Compare { field, op: CompareOp::Gte, value },
            ScopeOp::Lt => Predicate::Compare { field, op: CompareOp::Lt, value },
            ScopeOp::Lte => Predicate::Compare { field, op: CompareOp::Lte, value },
            ScopeOp::Null => Predicate::IsNull { field },
            ScopeOp::NotNull => Predicate::NotNull { field },
        }
    })
}

fn compile_rules(
    entity_id: &str,
    mut rules: HashMap<String, ValidationRule>,
) -> Result<HashMap<String, ValidationRule>, ConfigError> {
    for (column, rule) in rules.iter_mut() {
        rule.compile().map_err(|e| {
            ConfigError::Validation(format!(
                "entity '{}': invalid validation pattern for '{}': {}",
                entity_id, column, e
            ))
        })?;
    }
    Ok(rules)
}

/// `"{first_name} {last_name}"` → function substituting record attributes (null renders empty).
fn template_fn(template: &str) -> Result<AppendFn, ConfigError> {
    let re = Regex::new(r"\{([A-Za-z0-9_]+)\}").map_err(|e| ConfigError::Validation(e.to_string()))?;
    let template = template.to_string();
    Ok(Arc::new(move |record: &crate::store::Record| {
        let out = re.replace_all(&template, |caps: &regex::Captures<'_>| match record.get(&caps[1]) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        });
        Value::String(out.into_owned())
    }))
}

fn column_pg_type_name(ty: &str) -> Option<String> {
    let lower = ty.to_lowercase();
    if lower == "timestamptz" || lower == "timestamp with time zone" {
        Some("timestamptz".into())
    } else if lower == "timestamp" || lower.starts_with("timestamp ") {
        Some("timestamp".into())
    } else if lower == "date" {
        Some("date".into())
    } else if lower.contains("uuid") {
        Some("uuid".into())
    } else if matches!(lower.as_str(), "bigint" | "bigserial" | "int8") {
        Some("int8".into())
    } else if matches!(lower.as_str(), "int" | "integer" | "serial" | "int4") {
        Some("int4".into())
    } else if matches!(lower.as_str(), "smallint" | "smallserial" | "int2") {
        Some("int2".into())
    } else if matches!(lower.as_str(), "bool" | "boolean") {
        Some("bool".into())
    } else if lower.starts_with("numeric") || lower.starts_with("decimal") {
        Some("numeric".into())
    } else if matches!(lower.as_str(), "real" | "float4" | "double precision" | "float8") {
        Some("float8".into())
    } else if lower == "json" || lower == "jsonb" {
        Some(lower)
    } else if ty.contains('.') {
        // Schema-qualified custom type (e.g. sample.order_status); cast so text binds correctly
        Some(ty.to_string())
    } else {
        None
    }
}

fn infer_key_type(ty: &str) -> KeyType {
    let lower = ty.to_lowercase();
    if lower.contains("uuid") {
        KeyType::Uuid
    } else if lower.contains("bigserial") || lower.contains("bigint") {
        KeyType::BigInt
    } else if lower.contains("serial") || lower.contains("int") {
        KeyType::Int
    } else {
        KeyType::Text
    }
}

/// Read and resolve a JSON configuration file.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    tracing::info!(path = %path.display(), "loading configuration");
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}
