//! Payload validation from config rules. Collects every field error before failing.

use crate::config::{ResolvedEntity, ValidationRule};
use crate::error::{AppError, FieldErrors};
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a full payload: required fields must be present and non-null.
    pub fn validate(body: &Map<String, Value>, rules: &HashMap<String, ValidationRule>) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        for (col, rule) in sorted(rules) {
            let val = body.get(col);
            if rule.required == Some(true) && val.map_or(true, Value::is_null) {
                errors.add(col, format!("The {} field is required.", col));
                continue;
            }
            if let Some(v) = val {
                validate_field(col, v, rule, &mut errors);
            }
        }
        errors.into_result()
    }

    /// Validate only the fields present in body (partial update). A required field may not be nulled.
    pub fn validate_partial(
        body: &Map<String, Value>,
        rules: &HashMap<String, ValidationRule>,
    ) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        for (col, v) in body {
            let Some(rule) = rules.get(col) else { continue };
            if rule.required == Some(true) && v.is_null() {
                errors.add(col, format!("The {} field is required.", col));
                continue;
            }
            validate_field(col, v, rule, &mut errors);
        }
        errors.into_result()
    }

    /// Reject attributes the entity does not accept from callers.
    pub fn validate_attributes(entity: &ResolvedEntity, body: &Map<String, Value>) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        for key in body.keys() {
            if !entity.is_fillable(key) {
                errors.add(key, format!("The {} field is not a writable attribute of {}.", key, entity.uri_key));
            }
        }
        errors.into_result()
    }
}

fn sorted(rules: &HashMap<String, ValidationRule>) -> Vec<(&str, &ValidationRule)> {
    let mut v: Vec<_> = rules.iter().map(|(k, r)| (k.as_str(), r)).collect();
    v.sort_by(|a, b| a.0.cmp(b.0));
    v
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule, errors: &mut FieldErrors) {
    if v.is_null() {
        return;
    }
    if let Some(format) = &rule.format {
        if let Some(message) = check_format(col, v, format) {
            errors.add(col, message);
        }
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                errors.add(col, format!("The {} field must not be greater than {} characters.", col, max));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                errors.add(col, format!("The {} field must be at least {} characters.", col, min));
            }
        }
        if let Some(pattern) = &rule.pattern {
            // Rules built in code may not have been compiled yet.
            let re = match &rule.compiled_pattern {
                Some(re) => Some(Cow::Borrowed(re)),
                None => Regex::new(pattern).ok().map(Cow::Owned),
            };
            match re {
                Some(re) if !re.is_match(s) => errors.add(col, format!("The {} field format is invalid.", col)),
                Some(_) => {}
                None => errors.add(col, format!("The {} field has an invalid validation pattern.", col)),
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            errors.add(
                col,
                format!(
                    "The selected {} is invalid. Allowed: {}",
                    col,
                    allowed.iter().take(5).map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
                ),
            );
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                errors.add(col, format!("The {} field must be at least {}.", col, min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                errors.add(col, format!("The {} field must not be greater than {}.", col, max));
            }
        }
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn check_format(col: &str, v: &Value, format: &str) -> Option<String> {
    let s = v.as_str()?;
    match format.to_lowercase().as_str() {
        "email" => {
            let valid = s
                .split_once('@')
                .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'))
                .unwrap_or(false);
            (!valid).then(|| format!("The {} field must be a valid email address.", col))
        }
        "uuid" => uuid::Uuid::parse_str(s)
            .is_err()
            .then(|| format!("The {} field must be a valid UUID.", col)),
        "date" => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .is_err()
            .then(|| format!("The {} field must be a valid date.", col)),
        "datetime" => chrono::DateTime::parse_from_rfc3339(s)
            .is_err()
            .then(|| format!("The {} field must be a valid date-time.", col)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(v: Value) -> HashMap<String, ValidationRule> {
        serde_json::from_value(v).unwrap()
    }

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_collects_all_field_errors() {
        let rules = rules(json!({
            "name": {"required": true},
            "email": {"required": true, "format": "email"},
            "age": {"minimum": 18}
        }));
        let err = RequestValidator::validate(&body(json!({"email": "nope", "age": 3})), &rules).unwrap_err();
        let AppError::ValidationFailed(errors) = err else { panic!("expected validation failure") };
        assert!(errors.get("name").is_some());
        assert!(errors.get("email").is_some());
        assert!(errors.get("age").is_some());
    }

    #[test]
    fn test_partial_ignores_missing_required_fields() {
        let rules = rules(json!({"name": {"required": true}, "email": {"format": "email"}}));
        assert!(RequestValidator::validate_partial(&body(json!({"email": "ann@x.io"})), &rules).is_ok());
        assert!(RequestValidator::validate_partial(&body(json!({"name": null})), &rules).is_err());
    }

    #[test]
    fn test_allowed_and_pattern() {
        let rules = rules(json!({
            "status": {"allowed": ["active", "inactive"]},
            "code": {"pattern": "^[A-Z]{3}$"}
        }));
        assert!(RequestValidator::validate(&body(json!({"status": "active", "code": "ABC"})), &rules).is_ok());
        assert!(RequestValidator::validate(&body(json!({"status": "gone"})), &rules).is_err());
        assert!(RequestValidator::validate(&body(json!({"code": "abc"})), &rules).is_err());
    }

    #[test]
    fn test_compiled_pattern_is_used() {
        let mut rules = rules(json!({"code": {"pattern": "^[A-Z]{3}$"}}));
        for rule in rules.values_mut() {
            rule.compile().unwrap();
        }
        assert!(RequestValidator::validate(&body(json!({"code": "ABC"})), &rules).is_ok());
        assert!(RequestValidator::validate(&body(json!({"code": "AB"})), &rules).is_err());
    }

    #[test]
    fn test_length_counts_characters() {
        let rules = rules(json!({"name": {"max_length": 3}}));
        assert!(RequestValidator::validate(&body(json!({"name": "äöü"})), &rules).is_ok());
        assert!(RequestValidator::validate(&body(json!({"name": "abcd"})), &rules).is_err());
    }
}
