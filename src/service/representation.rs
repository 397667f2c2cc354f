//! Caller-facing representation of stored records.

use crate::config::ResolvedEntity;
use crate::store::Record;
use serde_json::Value;

/// Strip hidden attributes and, when a sparse fieldset is given, keep only those fields
/// (plus the loaded relations named in `keep`).
pub fn present(entity: &ResolvedEntity, record: &Record, fields: Option<&Vec<String>>, keep: &[&str]) -> Record {
    record
        .iter()
        .filter(|(k, _)| !entity.hidden.contains(k.as_str()))
        .filter(|(k, _)| match fields {
            Some(fields) => fields.iter().any(|f| f == *k) || keep.contains(&k.as_str()),
            None => true,
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Add computed attributes; names without a registered accessor resolve to `null`.
pub fn append(entity: &ResolvedEntity, source: &Record, target: &mut Record, names: &[String]) {
    for name in names {
        let value = entity.appends.get(name).map(|f| f(source)).unwrap_or(Value::Null);
        target.insert(name.clone(), value);
    }
}

/// Attributes whose values differ between two representations, in `after` order,
/// followed by attributes that disappeared.
pub fn changed_fields(before: &Record, after: &Record) -> Vec<String> {
    let mut changed: Vec<String> = after
        .iter()
        .filter(|(k, v)| before.get(k.as_str()) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    changed.extend(before.keys().filter(|k| !after.contains_key(k.as_str())).cloned());
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_changed_fields_is_exact_difference() {
        let before = record(json!({"id": 1, "name": "Ann", "email": "ann@x.io", "nick": "a"}));
        let after = record(json!({"id": 1, "name": "Anna", "email": "ann@x.io", "age": 3}));
        assert_eq!(changed_fields(&before, &after), vec!["name", "age", "nick"]);
    }

    #[test]
    fn test_changed_fields_empty_when_equal() {
        let r = record(json!({"id": 1, "name": "Ann"}));
        assert!(changed_fields(&r, &r.clone()).is_empty());
    }
}
