//! Pagination counters and JSON:API links, derived from one executed page.

use crate::query::{PageRequest, QueryRequest};
use serde_json::{json, Map, Value};

pub const DEFAULT_PAGE_SIZE: u64 = 15;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    pub last_page: u64,
    /// 1-based index of the first item on this page; `None` when the page is empty.
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl Pagination {
    pub fn new(page: PageRequest, total: u64, items_on_page: u64) -> Self {
        let last_page = total.div_ceil(page.size).max(1);
        let (from, to) = if items_on_page == 0 {
            (None, None)
        } else {
            let from = page.number.saturating_sub(1).saturating_mul(page.size).saturating_add(1);
            (Some(from), Some(from.saturating_add(items_on_page - 1)))
        };
        Pagination {
            current_page: page.number,
            per_page: page.size,
            total,
            last_page,
            from,
            to,
        }
    }

    pub fn metadata(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("current_page".into(), json!(self.current_page));
        m.insert("per_page".into(), json!(self.per_page));
        m.insert("total".into(), json!(self.total));
        m.insert("last_page".into(), json!(self.last_page));
        m.insert("from".into(), json!(self.from));
        m.insert("to".into(), json!(self.to));
        m
    }

    /// `first`, `last`, `prev`, `next` as relative URLs repeating the request's parameters.
    pub fn links(&self, request: &QueryRequest) -> Map<String, Value> {
        let link = |number: u64| Value::String(page_url(request, number, self.per_page));
        let mut m = Map::new();
        m.insert("first".into(), link(1));
        m.insert("last".into(), link(self.last_page));
        m.insert(
            "prev".into(),
            if self.current_page > 1 { link(self.current_page - 1) } else { Value::Null },
        );
        m.insert(
            "next".into(),
            if self.current_page < self.last_page { link(self.current_page + 1) } else { Value::Null },
        );
        m
    }
}

fn filter_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(filter_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn page_url(request: &QueryRequest, number: u64, size: u64) -> String {
    let mut params: Vec<(String, String)> = Vec::new();
    for (field, value) in &request.filter {
        params.push((format!("filter[{}]", field), filter_value(value)));
    }
    for (key, list) in [("sort", &request.sort), ("include", &request.include), ("append", &request.append)] {
        let joined = list.joined();
        if !joined.is_empty() {
            params.push((key.to_string(), joined));
        }
    }
    for (resource, list) in &request.fields {
        params.push((format!("fields[{}]", resource), list.joined()));
    }
    params.push(("page[number]".into(), number.to_string()));
    params.push(("page[size]".into(), size.to_string()));

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("/{}?{}", urlencoding::encode(&request.resource), query)
}
