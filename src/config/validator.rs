//! Config validation: referential integrity and resource consistency.

use crate::config::{EntityConfig, FullConfig, RelationKind};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

/// Declared columns plus the timestamp columns the store maintains.
fn column_names(entity: &EntityConfig) -> HashSet<&str> {
    let mut names: HashSet<&str> = entity.columns.iter().map(|c| c.name.as_str()).collect();
    if entity.timestamps {
        names.extend(["created_at", "updated_at"]);
    }
    if entity.soft_deletes {
        names.insert("deleted_at");
    }
    names
}

fn require_column(entity: &EntityConfig, columns: &HashSet<&str>, column: &str) -> Result<(), ConfigError> {
    if columns.contains(column) {
        Ok(())
    } else {
        Err(ConfigError::UnknownColumn {
            entity_id: entity.id.clone(),
            column: column.to_string(),
        })
    }
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut entities_by_id: HashMap<&str, &EntityConfig> = HashMap::new();
    for e in &config.entities {
        if entities_by_id.insert(e.id.as_str(), e).is_some() {
            return Err(ConfigError::Validation(format!("duplicate entity id: {}", e.id)));
        }
        let columns = column_names(e);
        if !columns.contains(e.primary_key.as_str()) {
            return Err(ConfigError::InvalidPrimaryKey {
                entity_id: e.id.clone(),
                column: e.primary_key.clone(),
            });
        }
        for f in e.filterable.iter().flatten() {
            require_column(e, &columns, &f.name)?;
        }
        for s in e.sortable.iter().flatten() {
            require_column(e, &columns, s)?;
        }
        for s in &e.scopes {
            require_column(e, &columns, &s.column)?;
        }
        for s in &e.sort_scopes {
            for c in &s.columns {
                require_column(e, &columns, c)?;
            }
        }
        for c in e.validation.iter().flat_map(|v| v.keys()) {
            require_column(e, &columns, c)?;
        }
    }

    let mut uri_keys = HashMap::new();
    for r in &config.resources {
        if !entities_by_id.contains_key(r.entity_id.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "entity",
                id: r.entity_id.clone(),
            });
        }
        if uri_keys.insert(r.uri_key.as_str(), r.entity_id.as_str()).is_some() {
            return Err(ConfigError::DuplicateUriKey(r.uri_key.clone()));
        }
        for op in &r.operations {
            if !matches!(op.as_str(), "create" | "read" | "update" | "delete") {
                return Err(ConfigError::Validation(format!(
                    "resource {}: unknown operation '{}'",
                    r.uri_key, op
                )));
            }
        }
    }

    for e in &config.entities {
        let columns = column_names(e);
        for rel in &e.relations {
            let related_id = uri_keys.get(rel.resource.as_str()).ok_or_else(|| ConfigError::MissingReference {
                kind: "resource",
                id: rel.resource.clone(),
            })?;
            let related = entities_by_id[related_id];
            let related_columns = column_names(related);
            let (ours, theirs) = match rel.kind {
                RelationKind::BelongsTo => (
                    (e, &columns, rel.foreign_key.as_str()),
                    (related, &related_columns, rel.owner_key.as_deref().unwrap_or(&related.primary_key)),
                ),
                RelationKind::HasMany | RelationKind::HasOne => (
                    (e, &columns, rel.owner_key.as_deref().unwrap_or(&e.primary_key)),
                    (related, &related_columns, rel.foreign_key.as_str()),
                ),
            };
            require_column(ours.0, ours.1, ours.2)?;
            require_column(theirs.0, theirs.1, theirs.2)?;
        }
    }

    let mut document_uris = HashSet::new();
    for d in &config.documents {
        if !document_uris.insert(d.uri.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate document uri: {}", d.uri)));
        }
    }

    Ok(())
}
