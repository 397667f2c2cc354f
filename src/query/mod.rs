//! JSON:API-style read requests: parsing, translation against an entity's allow-lists, pagination.

mod pagination;
mod translator;

pub use pagination::{Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use translator::{translate, ExecutableQuery, IncludePath, PageRequest};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A comma-separated list, accepted either as `"a,b"` or `["a", "b"]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommaList {
    Joined(String),
    Items(Vec<String>),
}

impl Default for CommaList {
    fn default() -> Self {
        CommaList::Joined(String::new())
    }
}

impl CommaList {
    /// Trimmed, non-empty items.
    pub fn items(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            CommaList::Joined(s) => s.split(',').collect(),
            CommaList::Items(v) => v.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn joined(&self) -> String {
        self.items().join(",")
    }
}

impl From<&str> for CommaList {
    fn from(s: &str) -> Self {
        CommaList::Joined(s.to_string())
    }
}

/// Raw page parameters. Signed so out-of-range input fails validation instead of parsing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
}

/// One read call as supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub resource: String,
    #[serde(default)]
    pub filter: Map<String, Value>,
    #[serde(default)]
    pub sort: CommaList,
    #[serde(default)]
    pub include: CommaList,
    #[serde(default)]
    pub fields: BTreeMap<String, CommaList>,
    #[serde(default)]
    pub page: PageParams,
    #[serde(default)]
    pub append: CommaList,
}

impl QueryRequest {
    pub fn new(resource: impl Into<String>) -> Self {
        QueryRequest {
            resource: resource.into(),
            ..Default::default()
        }
    }

    pub fn filter(mut self, field: &str, value: Value) -> Self {
        self.filter.insert(field.to_string(), value);
        self
    }

    pub fn sort(mut self, sort: &str) -> Self {
        self.sort = sort.into();
        self
    }

    pub fn include(mut self, include: &str) -> Self {
        self.include = include.into();
        self
    }

    pub fn fields(mut self, resource: &str, fields: &str) -> Self {
        self.fields.insert(resource.to_string(), fields.into());
        self
    }

    pub fn page(mut self, number: i64, size: i64) -> Self {
        self.page = PageParams { number: Some(number), size: Some(size) };
        self
    }

    pub fn append(mut self, append: &str) -> Self {
        self.append = append.into();
        self
    }
}
