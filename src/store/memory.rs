//! In-process entity store. Enforces the same primary key, not-null and foreign key rules
//! as the relational backend so both behave alike behind the CRUD layer.

use crate::config::{KeyType, ResolvedEntity};
use crate::store::{
    compare_values, key_string, DeleteMode, EntityStore, Record, Selected, Selection, SortDirection, StoreError,
    StoreErrorKind, Trashed,
};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Record>,
    next_id: i64,
}

type Tables = HashMap<String, Table>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::other("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::other("memory store lock poisoned"))
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn same_key(a: Option<&Value>, b: &Value) -> bool {
    match (a.and_then(key_string), key_string(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn is_live(entity: &ResolvedEntity, row: &Record) -> bool {
    !entity.soft_deletes || row.get("deleted_at").map_or(true, Value::is_null)
}

fn position(entity: &ResolvedEntity, table: &Table, id: &Value, trashed: Trashed) -> Option<usize> {
    table
        .rows
        .iter()
        .position(|r| same_key(r.get(&entity.primary_key), id) && (trashed == Trashed::Include || is_live(entity, r)))
}

fn check_not_null(entity: &ResolvedEntity, row: &Record) -> Result<(), StoreError> {
    for c in &entity.columns {
        if !c.nullable && row.get(&c.name).map_or(true, Value::is_null) {
            return Err(StoreError::other(format!(
                "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                c.name, entity.table_name
            )));
        }
    }
    Ok(())
}

/// Every non-null outgoing foreign key must point at an existing row.
fn check_references(entity: &ResolvedEntity, tables: &Tables, row: &Record) -> Result<(), StoreError> {
    for r in &entity.references {
        let Some(value) = row.get(&r.column).filter(|v| !v.is_null()) else { continue };
        let exists = tables
            .get(&r.table_id)
            .is_some_and(|t| t.rows.iter().any(|p| same_key(p.get(&r.target), value)));
        if !exists {
            return Err(StoreError::new(
                StoreErrorKind::ForeignKey,
                format!(
                    "insert or update on table \"{}\" violates foreign key constraint on \"{}\"",
                    entity.table_name, r.column
                ),
            ));
        }
    }
    Ok(())
}

fn generate_key(entity: &ResolvedEntity, table: &mut Table) -> Result<Value, StoreError> {
    match entity.key_type {
        KeyType::Int | KeyType::BigInt => {
            table.next_id += 1;
            Ok(Value::Number(table.next_id.into()))
        }
        KeyType::Uuid => Ok(Value::String(uuid::Uuid::new_v4().to_string())),
        KeyType::Text => Err(StoreError::other(format!(
            "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
            entity.primary_key, entity.table_name
        ))),
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find(&self, entity: &ResolvedEntity, id: &Value, trashed: Trashed) -> Result<Option<Record>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .get(&entity.table_id)
            .and_then(|t| position(entity, t, id, trashed).map(|i| t.rows[i].clone())))
    }

    async fn select(&self, entity: &ResolvedEntity, selection: &Selection) -> Result<Selected, StoreError> {
        let tables = self.read()?;
        let Some(table) = tables.get(&entity.table_id) else { return Ok(Selected::default()) };
        let mut rows: Vec<&Record> = table
            .rows
            .iter()
            .filter(|r| is_live(entity, r))
            .filter(|r| selection.predicates.iter().all(|p| p.matches(r)))
            .collect();
        rows.sort_by(|a, b| {
            for key in &selection.sorts {
                let ord = compare_values(
                    a.get(&key.field).unwrap_or(&Value::Null),
                    b.get(&key.field).unwrap_or(&Value::Null),
                );
                let ord = match key.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        let total = rows.len() as u64;
        let rows = match selection.window {
            Some(w) => rows.into_iter().skip(w.offset as usize).take(w.limit as usize).cloned().collect(),
            None => rows.into_iter().cloned().collect(),
        };
        Ok(Selected { rows, total })
    }

    async fn insert(&self, entity: &ResolvedEntity, attributes: &Record) -> Result<Record, StoreError> {
        let mut tables = self.write()?;
        let mut row = Record::new();
        for c in &entity.columns {
            let value = attributes
                .get(&c.name)
                .cloned()
                .or_else(|| c.default.clone())
                .unwrap_or(Value::Null);
            row.insert(c.name.clone(), value);
        }
        if entity.timestamps {
            let ts = now();
            row.insert("created_at".into(), ts.clone());
            row.insert("updated_at".into(), ts);
        }
        if entity.soft_deletes {
            row.insert("deleted_at".into(), Value::Null);
        }
        check_references(entity, &tables, &row)?;

        let table = tables.entry(entity.table_id.clone()).or_default();
        let key = match row.get(&entity.primary_key) {
            Some(v) if !v.is_null() => v.clone(),
            _ => generate_key(entity, table)?,
        };
        if let Some(n) = key.as_i64() {
            table.next_id = table.next_id.max(n);
        }
        if table.rows.iter().any(|r| same_key(r.get(&entity.primary_key), &key)) {
            return Err(StoreError::new(
                StoreErrorKind::UniqueViolation,
                format!("duplicate key value violates unique constraint on \"{}\"", entity.primary_key),
            ));
        }
        row.insert(entity.primary_key.clone(), key);
        check_not_null(entity, &row)?;
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, entity: &ResolvedEntity, id: &Value, attributes: &Record) -> Result<Option<Record>, StoreError> {
        let mut tables = self.write()?;
        let Some(table) = tables.get(&entity.table_id) else { return Ok(None) };
        let Some(i) = position(entity, table, id, Trashed::Exclude) else { return Ok(None) };

        let mut row = table.rows[i].clone();
        for (k, v) in attributes {
            if *k != entity.primary_key && !entity.is_managed_column(k) && entity.column(k).is_some() {
                row.insert(k.clone(), v.clone());
            }
        }
        if entity.timestamps {
            row.insert("updated_at".into(), now());
        }
        check_not_null(entity, &row)?;
        check_references(entity, &tables, &row)?;

        let Some(table) = tables.get_mut(&entity.table_id) else { return Ok(None) };
        table.rows[i] = row.clone();
        Ok(Some(row))
    }

    async fn delete(&self, entity: &ResolvedEntity, id: &Value, mode: DeleteMode) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let soft = mode == DeleteMode::Soft && entity.soft_deletes;
        let trashed = if soft { Trashed::Exclude } else { Trashed::Include };
        let Some(table) = tables.get(&entity.table_id) else { return Ok(false) };
        let Some(i) = position(entity, table, id, trashed) else { return Ok(false) };

        if !soft {
            let row = &table.rows[i];
            for r in &entity.referenced_by {
                let Some(target) = row.get(&r.target).filter(|v| !v.is_null()) else { continue };
                let referenced = tables
                    .get(&r.table_id)
                    .is_some_and(|t| t.rows.iter().any(|c| same_key(c.get(&r.column), target)));
                if referenced {
                    return Err(StoreError::new(
                        StoreErrorKind::ForeignKey,
                        format!(
                            "update or delete on table \"{}\" violates foreign key constraint on \"{}\"",
                            entity.table_name, r.column
                        ),
                    ));
                }
            }
        }

        let Some(table) = tables.get_mut(&entity.table_id) else { return Ok(false) };
        if soft {
            table.rows[i].insert("deleted_at".into(), now());
        } else {
            table.rows.remove(i);
        }
        Ok(true)
    }
}
