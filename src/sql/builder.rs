//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a resolved entity and a
//! backend-neutral selection.

use crate::config::ResolvedEntity;
use crate::store::{Predicate, Record, Selection, SortDirection, Trashed};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(entity: &ResolvedEntity) -> String {
    format!("{}.{}", quoted(&entity.schema_name), quoted(&entity.table_name))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// Bind `v` and return its placeholder, cast to the column type when one is known.
    fn placeholder(&mut self, entity: &ResolvedEntity, column: &str, v: Value) -> String {
        let n = self.push_param(v);
        match entity.column(column).and_then(|c| c.pg_type.as_deref()) {
            Some(t) => format!("${}::{}", n, t),
            None => format!("${}", n),
        }
    }
}

/// SELECT list: custom enums (schema.typename) and numeric come back as text.
fn select_column_list(entity: &ResolvedEntity) -> String {
    entity
        .columns
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            let pg_type = c.pg_type.as_deref().unwrap_or("");
            if pg_type.contains('.') || pg_type == "numeric" {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn live_condition(entity: &ResolvedEntity) -> Option<String> {
    entity.soft_deletes.then(|| format!("{} IS NULL", quoted("deleted_at")))
}

fn render_predicate(entity: &ResolvedEntity, p: &Predicate, q: &mut QueryBuf) -> String {
    match p {
        Predicate::Eq { field, value } if value.is_null() => format!("{} IS NULL", quoted(field)),
        Predicate::Eq { field, value } => {
            let ph = q.placeholder(entity, field, value.clone());
            format!("{} = {}", quoted(field), ph)
        }
        Predicate::In { values, .. } if values.is_empty() => "FALSE".to_string(),
        Predicate::In { field, values } => {
            let phs: Vec<String> = values.iter().map(|v| q.placeholder(entity, field, v.clone())).collect();
            format!("{} IN ({})", quoted(field), phs.join(", "))
        }
        Predicate::Contains { field, needle } => {
            let escaped = needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
            let n = q.push_param(Value::String(format!("%{}%", escaped)));
            format!("{}::text ILIKE ${}", quoted(field), n)
        }
        Predicate::Compare { field, op, value } => {
            let ph = q.placeholder(entity, field, value.clone());
            format!("{} {} {}", quoted(field), op.sql(), ph)
        }
        Predicate::IsNull { field } => format!("{} IS NULL", quoted(field)),
        Predicate::NotNull { field } => format!("{} IS NOT NULL", quoted(field)),
        Predicate::All(ps) if ps.is_empty() => "TRUE".to_string(),
        Predicate::All(ps) => {
            let parts: Vec<String> = ps.iter().map(|p| render_predicate(entity, p, q)).collect();
            format!("({})", parts.join(" AND "))
        }
        Predicate::Any(ps) if ps.is_empty() => "FALSE".to_string(),
        Predicate::Any(ps) => {
            let parts: Vec<String> = ps.iter().map(|p| render_predicate(entity, p, q)).collect();
            format!("({})", parts.join(" OR "))
        }
    }
}

fn where_clause(entity: &ResolvedEntity, predicates: &[Predicate], q: &mut QueryBuf) -> String {
    let mut parts: Vec<String> = live_condition(entity).into_iter().collect();
    parts.extend(predicates.iter().map(|p| render_predicate(entity, p, q)));
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT by primary key.
pub fn select_by_id(entity: &ResolvedEntity, id: &Value, trashed: Trashed) -> QueryBuf {
    let mut q = QueryBuf::default();
    let ph = q.placeholder(entity, &entity.primary_key, id.clone());
    let mut sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_column_list(entity),
        qualified_table(entity),
        quoted(&entity.primary_key),
        ph
    );
    if let (Trashed::Exclude, Some(live)) = (trashed, live_condition(entity)) {
        sql.push_str(" AND ");
        sql.push_str(&live);
    }
    q.sql = sql;
    q
}

/// SELECT one window of live rows matching every predicate, in `sorts` order.
pub fn select_page(entity: &ResolvedEntity, selection: &Selection) -> QueryBuf {
    let mut q = QueryBuf::default();
    let where_sql = where_clause(entity, &selection.predicates, &mut q);
    let order_sql = if selection.sorts.is_empty() {
        format!(" ORDER BY {}", quoted(&entity.primary_key))
    } else {
        let keys: Vec<String> = selection
            .sorts
            .iter()
            .map(|s| match s.direction {
                SortDirection::Asc => format!("{} ASC NULLS FIRST", quoted(&s.field)),
                SortDirection::Desc => format!("{} DESC NULLS LAST", quoted(&s.field)),
            })
            .collect();
        format!(" ORDER BY {}", keys.join(", "))
    };
    let window_sql = selection
        .window
        .map(|w| format!(" LIMIT {} OFFSET {}", w.limit, w.offset))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_column_list(entity),
        qualified_table(entity),
        where_sql,
        order_sql,
        window_sql
    );
    q
}

/// COUNT of live rows matching every predicate (window ignored).
pub fn count(entity: &ResolvedEntity, selection: &Selection) -> QueryBuf {
    let mut q = QueryBuf::default();
    let where_sql = where_clause(entity, &selection.predicates, &mut q);
    q.sql = format!("SELECT COUNT(*) AS total FROM {}{}", qualified_table(entity), where_sql);
    q
}

/// INSERT the supplied attributes. Configured defaults fill missing columns; managed
/// timestamps are set by the database.
pub fn insert(entity: &ResolvedEntity, attributes: &Record) -> QueryBuf {
    let mut q = QueryBuf::default();
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for c in &entity.columns {
        if entity.is_managed_column(&c.name) {
            if entity.timestamps && (c.name == "created_at" || c.name == "updated_at") {
                cols.push(quoted(&c.name));
                values.push("NOW()".to_string());
            }
            continue;
        }
        let Some(v) = attributes.get(&c.name).or(c.default.as_ref()) else { continue };
        let ph = q.placeholder(entity, &c.name, v.clone());
        cols.push(quoted(&c.name));
        values.push(ph);
    }
    q.sql = if cols.is_empty() {
        format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING {}",
            qualified_table(entity),
            select_column_list(entity)
        )
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            qualified_table(entity),
            cols.join(", "),
            values.join(", "),
            select_column_list(entity)
        )
    };
    q
}

/// UPDATE one live row by id: SET only known, non-managed columns present in `attributes`.
pub fn update(entity: &ResolvedEntity, id: &Value, attributes: &Record) -> QueryBuf {
    let mut q = QueryBuf::default();
    let mut sets = Vec::new();
    for (k, v) in attributes {
        if *k == entity.primary_key || entity.is_managed_column(k) || entity.column(k).is_none() {
            continue;
        }
        let ph = q.placeholder(entity, k, v.clone());
        sets.push(format!("{} = {}", quoted(k), ph));
    }
    if entity.timestamps {
        sets.push(format!("{} = NOW()", quoted("updated_at")));
    }
    if sets.is_empty() {
        return select_by_id(entity, id, Trashed::Exclude);
    }
    let id_ph = q.placeholder(entity, &entity.primary_key, id.clone());
    let mut sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        qualified_table(entity),
        sets.join(", "),
        quoted(&entity.primary_key),
        id_ph
    );
    if let Some(live) = live_condition(entity) {
        sql.push_str(" AND ");
        sql.push_str(&live);
    }
    sql.push_str(" RETURNING ");
    sql.push_str(&select_column_list(entity));
    q.sql = sql;
    q
}

/// Mark one live row deleted.
pub fn soft_delete(entity: &ResolvedEntity, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::default();
    let id_ph = q.placeholder(entity, &entity.primary_key, id.clone());
    q.sql = format!(
        "UPDATE {} SET {} = NOW() WHERE {} = {} AND {} IS NULL",
        qualified_table(entity),
        quoted("deleted_at"),
        quoted(&entity.primary_key),
        id_ph,
        quoted("deleted_at")
    );
    q
}

/// DELETE by id, trashed or not.
pub fn delete(entity: &ResolvedEntity, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::default();
    let id_ph = q.placeholder(entity, &entity.primary_key, id.clone());
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        qualified_table(entity),
        quoted(&entity.primary_key),
        id_ph
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use crate::store::{SortKey, Window};
    use serde_json::json;

    fn registry() -> crate::config::ResourceRegistry {
        let config: FullConfig = serde_json::from_value(json!({
            "entities": [{
                "id": "user", "table": "users",
                "columns": [
                    {"name": "id", "type": "bigserial"},
                    {"name": "name", "type": "text"},
                    {"name": "status", "type": "text", "default": "active"}
                ],
                "soft_deletes": true,
                "validation": {}
            }],
            "resources": [{"uri_key": "users", "entity_id": "user"}]
        }))
        .unwrap();
        resolve(&config).unwrap()
    }

    #[test]
    fn test_select_page_renders_predicates_sorts_and_window() {
        let registry = registry();
        let users = registry.resolve("users").unwrap();
        let selection = Selection {
            predicates: vec![
                Predicate::Contains { field: "name".into(), needle: "a_b".into() },
                Predicate::In { field: "id".into(), values: vec![json!(1), json!(2)] },
            ],
            sorts: vec![SortKey::desc("name"), SortKey::asc("id")],
            window: Some(Window { offset: 15, limit: 15 }),
        };
        let q = select_page(users, &selection);
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"name\", \"status\", \"created_at\", \"updated_at\", \"deleted_at\" \
             FROM \"public\".\"users\" WHERE \"deleted_at\" IS NULL AND \"name\"::text ILIKE $1 \
             AND \"id\" IN ($2::int8, $3::int8) ORDER BY \"name\" DESC NULLS LAST, \"id\" ASC NULLS FIRST \
             LIMIT 15 OFFSET 15"
        );
        assert_eq!(q.params, vec![json!("%a\\_b%"), json!(1), json!(2)]);
    }

    #[test]
    fn test_insert_applies_defaults_and_timestamps() {
        let registry = registry();
        let users = registry.resolve("users").unwrap();
        let attrs = json!({"name": "Ann"}).as_object().cloned().unwrap();
        let q = insert(users, &attrs);
        assert!(q.sql.starts_with(
            "INSERT INTO \"public\".\"users\" (\"name\", \"status\", \"created_at\", \"updated_at\") VALUES ($1, $2, NOW(), NOW())"
        ));
        assert_eq!(q.params, vec![json!("Ann"), json!("active")]);
    }

    #[test]
    fn test_update_skips_managed_columns_and_keeps_live_guard() {
        let registry = registry();
        let users = registry.resolve("users").unwrap();
        let attrs = json!({"name": "Bo", "deleted_at": "x"}).as_object().cloned().unwrap();
        let q = update(users, &json!(4), &attrs);
        assert!(q.sql.contains("SET \"name\" = $1, \"updated_at\" = NOW() WHERE \"id\" = $2::int8 AND \"deleted_at\" IS NULL"));
        assert_eq!(q.params, vec![json!("Bo"), json!(4)]);
    }
}
