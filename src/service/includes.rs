//! Eager loading of `include` paths after the primary page has been fetched.

use crate::config::{RelationKind, ResolvedEntity, ResourceRegistry};
use crate::error::AppError;
use crate::query::IncludePath;
use crate::service::representation::present;
use crate::store::{key_string, EntityStore, Predicate, Record, Selection, SortKey};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Include paths folded into a tree: `posts,posts.comments` → `posts { comments {} }`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IncludeTree {
    pub children: BTreeMap<String, IncludeTree>,
}

impl IncludeTree {
    pub fn from_paths(paths: &[IncludePath]) -> Self {
        let mut root = IncludeTree::default();
        for path in paths {
            let mut node = &mut root;
            for segment in &path.segments {
                node = node.children.entry(segment.clone()).or_default();
            }
        }
        root
    }

    pub fn names(&self) -> Vec<&str> {
        self.children.keys().map(String::as_str).collect()
    }
}

/// Attach each relation in `tree` to `rows` (recursively). Related rows are presented with
/// their own resource's hidden attributes and sparse fieldset.
pub fn load<'a>(
    store: &'a dyn EntityStore,
    registry: &'a ResourceRegistry,
    entity: &'a ResolvedEntity,
    rows: &'a mut [Record],
    tree: &'a IncludeTree,
    fields: &'a BTreeMap<String, Vec<String>>,
) -> BoxFuture<'a, Result<(), AppError>> {
    Box::pin(async move {
        for (name, subtree) in &tree.children {
            let relation = entity.relation(name).ok_or_else(|| {
                AppError::InvalidInclude(format!(
                    "Relationship `{}` is not defined on `{}`.",
                    name, entity.uri_key
                ))
            })?;
            let related = registry.resolve(&relation.resource)?;

            let mut seen = HashSet::new();
            let keys: Vec<Value> = rows
                .iter()
                .filter_map(|r| r.get(&relation.our_key))
                .filter(|v| key_string(v).map_or(false, |k| seen.insert(k)))
                .cloned()
                .collect();

            let mut fetched = if keys.is_empty() {
                Vec::new()
            } else {
                let selection = Selection {
                    predicates: vec![Predicate::In { field: relation.their_key.clone(), values: keys }],
                    sorts: vec![SortKey::asc(related.primary_key.clone())],
                    window: None,
                };
                store.select(related, &selection).await?.rows
            };
            // Recurse even when nothing matched so deeper segments are still checked.
            load(store, registry, related, &mut fetched, subtree, fields).await?;

            let keep = subtree.names();
            let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
            for row in &fetched {
                let Some(k) = row.get(&relation.their_key).and_then(key_string) else { continue };
                let item = present(related, row, fields.get(&related.uri_key), &keep);
                grouped.entry(k).or_default().push(Value::Object(item));
            }
            tracing::debug!(relation = %name, resource = %related.uri_key, groups = grouped.len(), "loaded include");

            for row in rows.iter_mut() {
                let group = row
                    .get(&relation.our_key)
                    .and_then(key_string)
                    .and_then(|k| grouped.get(&k));
                let value = match relation.kind {
                    RelationKind::HasMany => Value::Array(group.cloned().unwrap_or_default()),
                    RelationKind::BelongsTo | RelationKind::HasOne => {
                        group.and_then(|g| g.first().cloned()).unwrap_or(Value::Null)
                    }
                };
                row.insert(name.clone(), value);
            }
        }
        Ok(())
    })
}
