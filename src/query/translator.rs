//! Translates a `QueryRequest` into an executable selection, enforcing the entity's allow-lists.

use crate::config::{MatchMode, ResolvedEntity};
use crate::error::{AppError, FieldErrors};
use crate::query::{PageParams, QueryRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::store::{Predicate, Selection, SortDirection, SortKey, Window};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Validated page coordinates (1-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u64,
    pub size: u64,
}

impl PageRequest {
    /// Defaults apply only to absent values; out-of-range values are rejected.
    pub fn from_params(params: &PageParams) -> Result<Self, AppError> {
        let mut errors = FieldErrors::new();
        let number = params.number.unwrap_or(1);
        let size = params.size.unwrap_or(DEFAULT_PAGE_SIZE as i64);
        if number < 1 {
            errors.add("page.number", "The page.number field must be at least 1.");
        }
        if size < 1 {
            errors.add("page.size", "The page.size field must be at least 1.");
        } else if size > MAX_PAGE_SIZE as i64 {
            errors.add(
                "page.size",
                format!("The page.size field must not be greater than {}.", MAX_PAGE_SIZE),
            );
        }
        // The row offset must fit a signed 64-bit OFFSET.
        if number >= 1 && (1..=MAX_PAGE_SIZE as i64).contains(&size) && (number - 1).checked_mul(size).is_none() {
            errors.add("page.number", "The page.number field is too large.");
        }
        errors.into_result()?;
        Ok(PageRequest { number: number as u64, size: size as u64 })
    }

    pub fn window(&self) -> Window {
        Window {
            offset: self.number.saturating_sub(1).saturating_mul(self.size),
            limit: self.size,
        }
    }
}

/// A relation path such as `posts.comments`. Only the first segment is checked up front.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludePath {
    pub segments: Vec<String>,
}

impl IncludePath {
    pub fn head(&self) -> &str {
        &self.segments[0]
    }
}

impl fmt::Display for IncludePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

#[derive(Clone, Debug)]
pub struct ExecutableQuery {
    pub selection: Selection,
    pub includes: Vec<IncludePath>,
    /// Sparse fieldsets keyed by resource public key, applied after execution.
    pub fields: BTreeMap<String, Vec<String>>,
    /// Computed attributes added to each primary item after execution.
    pub appends: Vec<String>,
    pub page: PageRequest,
}

pub fn translate(entity: &ResolvedEntity, request: &QueryRequest) -> Result<ExecutableQuery, AppError> {
    let page = PageRequest::from_params(&request.page)?;
    let predicates = translate_filters(entity, request)?;
    let sorts = translate_sorts(entity, request)?;
    let includes = translate_includes(entity, request)?;
    let fields = request
        .fields
        .iter()
        .map(|(resource, list)| (resource.clone(), list.items()))
        .collect();

    tracing::debug!(
        resource = %entity.uri_key,
        predicates = predicates.len(),
        sorts = sorts.len(),
        includes = includes.len(),
        page = page.number,
        size = page.size,
        "translated query"
    );

    Ok(ExecutableQuery {
        selection: Selection {
            predicates,
            sorts,
            window: Some(page.window()),
        },
        includes,
        fields,
        appends: request.append.items(),
        page,
    })
}

fn allowed_list<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let mut names: Vec<&str> = names.collect();
    names.sort_unstable();
    names.dedup();
    names.join(", ")
}

fn translate_filters(entity: &ResolvedEntity, request: &QueryRequest) -> Result<Vec<Predicate>, AppError> {
    let mut predicates = Vec::new();
    let mut unknown = Vec::new();
    for (field, value) in &request.filter {
        if let Some(scope) = entity.scopes.get(field) {
            predicates.push(scope(value));
            continue;
        }
        let Some(mode) = entity.filterable.get(field) else {
            unknown.push(field.as_str());
            continue;
        };
        predicates.push(field_predicate(field, *mode, value)?);
    }
    if !unknown.is_empty() {
        let allowed = allowed_list(
            entity
                .filterable
                .keys()
                .map(String::as_str)
                .chain(entity.scopes.names()),
        );
        return Err(AppError::InvalidFilter(format!(
            "Requested filter(s) `{}` are not allowed. Allowed filter(s) are `{}`.",
            unknown.join(", "),
            allowed
        )));
    }
    Ok(predicates)
}

fn field_predicate(field: &str, mode: MatchMode, value: &Value) -> Result<Predicate, AppError> {
    let field = field.to_string();
    Ok(match (mode, value) {
        (_, Value::Null) => Predicate::IsNull { field },
        (_, Value::Object(_)) => {
            return Err(AppError::InvalidFilter(format!(
                "Filter `{}` expects a value or a list of values.",
                field
            )))
        }
        (MatchMode::Exact, Value::Array(values)) => Predicate::In { field, values: values.clone() },
        (MatchMode::Exact, v) => Predicate::Eq { field, value: v.clone() },
        (MatchMode::Partial, Value::Array(values)) => Predicate::Any(
            values
                .iter()
                .map(|v| Predicate::Contains { field: field.clone(), needle: needle(v) })
                .collect(),
        ),
        (MatchMode::Partial, v) => Predicate::Contains { field, needle: needle(v) },
    })
}

fn needle(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn translate_sorts(entity: &ResolvedEntity, request: &QueryRequest) -> Result<Vec<SortKey>, AppError> {
    let mut sorts = Vec::new();
    let mut unknown = Vec::new();
    for item in request.sort.items() {
        let (direction, name) = match item.strip_prefix('-') {
            Some(rest) => (SortDirection::Desc, rest),
            None => (SortDirection::Asc, item.as_str()),
        };
        if let Some(scope) = entity.sort_scopes.get(name) {
            sorts.extend(scope(direction));
        } else if entity.sortable.contains(name) {
            sorts.push(SortKey { field: name.to_string(), direction });
        } else {
            unknown.push(name.to_string());
        }
    }
    if !unknown.is_empty() {
        let allowed = allowed_list(
            entity
                .sortable
                .iter()
                .map(String::as_str)
                .chain(entity.sort_scopes.names()),
        );
        return Err(AppError::InvalidSort(format!(
            "Requested sort(s) `{}` is not allowed. Allowed sort(s) are `{}`.",
            unknown.join(", "),
            allowed
        )));
    }
    if !sorts.iter().any(|s| s.field == entity.primary_key) {
        sorts.push(SortKey::asc(entity.primary_key.clone()));
    }
    Ok(sorts)
}

fn translate_includes(entity: &ResolvedEntity, request: &QueryRequest) -> Result<Vec<IncludePath>, AppError> {
    let mut includes = Vec::new();
    let mut unknown = Vec::new();
    for item in request.include.items() {
        let segments: Vec<String> = item.split('.').map(|s| s.trim().to_string()).collect();
        if segments.iter().any(String::is_empty) || entity.relation(&segments[0]).is_none() {
            unknown.push(item);
            continue;
        }
        let path = IncludePath { segments };
        if !includes.contains(&path) {
            includes.push(path);
        }
    }
    if !unknown.is_empty() {
        let allowed = allowed_list(entity.relations.iter().map(|r| r.name.as_str()));
        return Err(AppError::InvalidInclude(format!(
            "Requested include(s) `{}` are not allowed. Allowed include(s) are `{}`.",
            unknown.join(", "),
            allowed
        )));
    }
    Ok(includes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig, ResourceRegistry};
    use serde_json::json;

    fn registry() -> ResourceRegistry {
        let config: FullConfig = serde_json::from_value(json!({
            "entities": [
                {
                    "id": "user", "table": "users",
                    "columns": [
                        {"name": "id", "type": "bigserial"},
                        {"name": "name"}, {"name": "email"}, {"name": "status"}
                    ],
                    "filterable": ["email", {"name": "name", "match": "partial"}],
                    "sortable": ["name", "created_at"],
                    "scopes": [{"name": "active", "column": "status", "op": "eq", "value": "active"}],
                    "sort_scopes": [{"name": "identity", "columns": ["name", "email"]}],
                    "relations": [{"name": "posts", "resource": "posts", "kind": "has_many", "foreign_key": "user_id"}]
                },
                {"id": "post", "table": "posts", "columns": [{"name": "id", "type": "bigserial"}, {"name": "user_id"}]}
            ],
            "resources": [
                {"uri_key": "users", "entity_id": "user"},
                {"uri_key": "posts", "entity_id": "post"}
            ]
        }))
        .unwrap();
        resolve(&config).unwrap()
    }

    #[test]
    fn test_defaults_to_first_page_of_fifteen() {
        let r = registry();
        let q = translate(r.resolve("users").unwrap(), &QueryRequest::new("users")).unwrap();
        assert_eq!(q.page, PageRequest { number: 1, size: 15 });
        assert_eq!(q.selection.window, Some(Window { offset: 0, limit: 15 }));
        assert_eq!(q.selection.sorts, vec![SortKey::asc("id")]);
    }

    #[test]
    fn test_page_size_over_limit_is_rejected_not_clamped() {
        let r = registry();
        let err = translate(r.resolve("users").unwrap(), &QueryRequest::new("users").page(1, 101)).unwrap_err();
        match err {
            AppError::ValidationFailed(errors) => assert!(errors.get("page.size").is_some()),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_page_number_below_one_is_rejected() {
        let r = registry();
        let err = translate(r.resolve("users").unwrap(), &QueryRequest::new("users").page(0, 10)).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }

    #[test]
    fn test_page_number_overflowing_offset_is_rejected() {
        let r = registry();
        let err = translate(r.resolve("users").unwrap(), &QueryRequest::new("users").page(i64::MAX, 100)).unwrap_err();
        match err {
            AppError::ValidationFailed(errors) => assert!(errors.get("page.number").is_some()),
            other => panic!("unexpected error: {:?}", other),
        }
        let q = translate(r.resolve("users").unwrap(), &QueryRequest::new("users").page(i64::MAX, 1)).unwrap();
        assert_eq!(q.selection.window.map(|w| w.offset), Some(i64::MAX as u64 - 1));
    }

    #[test]
    fn test_window_offsets_by_page() {
        let r = registry();
        let q = translate(r.resolve("users").unwrap(), &QueryRequest::new("users").page(3, 10)).unwrap();
        assert_eq!(q.selection.window, Some(Window { offset: 20, limit: 10 }));
    }

    #[test]
    fn test_filters_use_scope_then_declared_mode() {
        let r = registry();
        let req = QueryRequest::new("users")
            .filter("active", json!(true))
            .filter("email", json!("ann@x.io"))
            .filter("name", json!("an"));
        let q = translate(r.resolve("users").unwrap(), &req).unwrap();
        let p = &q.selection.predicates;
        assert!(p.contains(&Predicate::Eq { field: "status".into(), value: json!("active") }));
        assert!(p.contains(&Predicate::Eq { field: "email".into(), value: json!("ann@x.io") }));
        assert!(p.contains(&Predicate::Contains { field: "name".into(), needle: "an".into() }));
    }

    #[test]
    fn test_exact_filter_with_list_becomes_membership() {
        let r = registry();
        let req = QueryRequest::new("users").filter("email", json!(["a@x.io", "b@x.io"]));
        let q = translate(r.resolve("users").unwrap(), &req).unwrap();
        assert_eq!(
            q.selection.predicates,
            vec![Predicate::In { field: "email".into(), values: vec![json!("a@x.io"), json!("b@x.io")] }]
        );
    }

    #[test]
    fn test_undeclared_filter_is_invalid_query() {
        let r = registry();
        let err = translate(
            r.resolve("users").unwrap(),
            &QueryRequest::new("users").filter("status", json!("x")),
        )
        .unwrap_err();
        assert!(err.is_invalid_query());
        assert!(matches!(err, AppError::InvalidFilter(ref m) if m.contains("`status`")));
    }

    #[test]
    fn test_sort_parses_direction_and_scopes() {
        let r = registry();
        let q = translate(
            r.resolve("users").unwrap(),
            &QueryRequest::new("users").sort("-identity,created_at"),
        )
        .unwrap();
        assert_eq!(
            q.selection.sorts,
            vec![
                SortKey::desc("name"),
                SortKey::desc("email"),
                SortKey::asc("created_at"),
                SortKey::asc("id"),
            ]
        );
    }

    #[test]
    fn test_unknown_sort_is_rejected() {
        let r = registry();
        let err = translate(r.resolve("users").unwrap(), &QueryRequest::new("users").sort("-email")).unwrap_err();
        assert!(matches!(err, AppError::InvalidSort(_)));
    }

    #[test]
    fn test_include_checks_first_segment_only() {
        let r = registry();
        let q = translate(
            r.resolve("users").unwrap(),
            &QueryRequest::new("users").include("posts.comments,posts"),
        )
        .unwrap();
        assert_eq!(q.includes.len(), 2);
        assert_eq!(q.includes[0].to_string(), "posts.comments");

        let err = translate(r.resolve("users").unwrap(), &QueryRequest::new("users").include("profile")).unwrap_err();
        assert!(matches!(err, AppError::InvalidInclude(ref m) if m.contains("`posts`")));
    }

    #[test]
    fn test_fields_and_appends_pass_through() {
        let r = registry();
        let q = translate(
            r.resolve("users").unwrap(),
            &QueryRequest::new("users").fields("users", "id,name").append("nope"),
        )
        .unwrap();
        assert_eq!(q.fields["users"], vec!["id", "name"]);
        assert_eq!(q.appends, vec!["nope"]);
    }
}
