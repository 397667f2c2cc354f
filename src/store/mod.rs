//! Entity store boundary: the query vocabulary shared by every backend and the
//! `EntityStore` trait the CRUD layer talks to.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::config::ResolvedEntity;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;

/// One stored row as a JSON object keyed by column name.
pub type Record = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        SortKey { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortKey { field: field.into(), direction: SortDirection::Desc }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Gte => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Lte => ord != Ordering::Greater,
        }
    }
}

/// Backend-neutral filter predicate. Field names always come from resolved config.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    /// Case-insensitive substring match.
    Contains { field: String, needle: String },
    Compare { field: String, op: CompareOp, value: Value },
    IsNull { field: String },
    NotNull { field: String },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    /// Evaluate against an in-memory record.
    pub fn matches(&self, record: &Record) -> bool {
        let get = |f: &str| record.get(f).unwrap_or(&Value::Null);
        match self {
            Predicate::Eq { field, value } => loose_eq(get(field), value),
            Predicate::In { field, values } => values.iter().any(|v| loose_eq(get(field), v)),
            Predicate::Contains { field, needle } => match get(field) {
                Value::Null => false,
                Value::String(s) => s.to_lowercase().contains(&needle.to_lowercase()),
                other => other.to_string().to_lowercase().contains(&needle.to_lowercase()),
            },
            Predicate::Compare { field, op, value } => {
                let v = get(field);
                !v.is_null() && op.holds(compare_values(v, value))
            }
            Predicate::IsNull { field } => get(field).is_null(),
            Predicate::NotNull { field } => !get(field).is_null(),
            Predicate::All(ps) => ps.iter().all(|p| p.matches(record)),
            Predicate::Any(ps) => ps.iter().any(|p| p.matches(record)),
        }
    }
}

/// Equality that tolerates the string/number/bool spelling differences of caller input.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            matches!((*b, s.as_str()), (true, "true" | "1") | (false, "false" | "0"))
        }
        (Value::Bool(b), Value::Number(n)) | (Value::Number(n), Value::Bool(b)) => {
            n.as_i64() == Some(*b as i64)
        }
        _ => a == b,
    }
}

/// Total order over JSON values used for in-memory sorting. Nulls sort first.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n
            .as_f64()
            .partial_cmp(&m.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Number(n), Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(f) => n.as_f64().partial_cmp(&Some(f)).unwrap_or(Ordering::Equal),
            Err(_) => Ordering::Less,
        },
        (Value::String(s), Value::Number(_)) => compare_values(b, &Value::String(s.clone())).reverse(),
        (Value::String(s), Value::String(t)) => s.cmp(t),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Normalized identity of a key value so `1` and `"1"` group together.
pub fn key_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Offset window for paginated selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

/// What to select: all predicates must hold; rows ordered by `sorts`.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    pub predicates: Vec<Predicate>,
    pub sorts: Vec<SortKey>,
    pub window: Option<Window>,
}

/// Rows of one window plus the number of rows matching without the window.
#[derive(Clone, Debug, Default)]
pub struct Selected {
    pub rows: Vec<Record>,
    pub total: u64,
}

/// Whether lookups see soft-deleted rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trashed {
    Exclude,
    Include,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteMode {
    /// Mark the row deleted and keep it.
    Soft,
    /// Remove the row.
    Hard,
}

/// Store failure classes the CRUD layer reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreErrorKind {
    ForeignKey,
    UniqueViolation,
    Other,
}

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        StoreError { kind, message: message.into() }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Other, message)
    }

    pub fn is_foreign_key(&self) -> bool {
        self.kind == StoreErrorKind::ForeignKey
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let kind = match &e {
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::ForeignKeyViolation => StoreErrorKind::ForeignKey,
                sqlx::error::ErrorKind::UniqueViolation => StoreErrorKind::UniqueViolation,
                _ => StoreErrorKind::Other,
            },
            _ => StoreErrorKind::Other,
        };
        StoreError::new(kind, e.to_string())
    }
}

/// Persistence collaborator. Every call is self-contained; implementations own all rows.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch one row by primary key.
    async fn find(
        &self,
        entity: &ResolvedEntity,
        id: &Value,
        trashed: Trashed,
    ) -> Result<Option<Record>, StoreError>;

    /// Select live (not soft-deleted) rows.
    async fn select(&self, entity: &ResolvedEntity, selection: &Selection) -> Result<Selected, StoreError>;

    /// Insert one row and return it as stored.
    async fn insert(&self, entity: &ResolvedEntity, attributes: &Record) -> Result<Record, StoreError>;

    /// Overwrite the given attributes of one live row. `None` when the row does not exist.
    async fn update(
        &self,
        entity: &ResolvedEntity,
        id: &Value,
        attributes: &Record,
    ) -> Result<Option<Record>, StoreError>;

    /// Delete one row. `false` when nothing was deleted.
    async fn delete(&self, entity: &ResolvedEntity, id: &Value, mode: DeleteMode) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_loose_eq_accepts_string_spelling_of_numbers_and_bools() {
        assert!(loose_eq(&json!(1), &json!("1")));
        assert!(loose_eq(&json!(true), &json!("true")));
        assert!(!loose_eq(&json!(2), &json!("two")));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let r = record(json!({"name": "Ann Smith"}));
        let p = Predicate::Contains { field: "name".into(), needle: "SMI".into() };
        assert!(p.matches(&r));
    }

    #[test]
    fn test_compare_skips_null_fields() {
        let r = record(json!({"age": null}));
        let p = Predicate::Compare { field: "age".into(), op: CompareOp::Lt, value: json!(10) };
        assert!(!p.matches(&r));
    }

    #[test]
    fn test_compare_values_orders_nulls_first() {
        assert_eq!(compare_values(&Value::Null, &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(10), &json!(9)), Ordering::Greater);
    }
}
