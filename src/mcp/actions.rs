//! Business actions exposed as tools beside the CRUD tools.

use crate::config::ValidationRule;
use crate::error::{AppError, FieldErrors};
use crate::response::ResultEnvelope;
use crate::service::RequestValidator;
use crate::state::AppState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// One named input of an action, with the rules its value must satisfy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionParameter {
    pub name: String,
    pub description: String,
    /// JSON schema type: string, integer, number, boolean, object or array.
    #[serde(rename = "type", default = "default_type")]
    pub type_: String,
    #[serde(default)]
    pub rules: ValidationRule,
}

fn default_type() -> String {
    "string".into()
}

impl ActionParameter {
    pub fn new(name: &str, description: &str, type_: &str) -> Self {
        ActionParameter {
            name: name.to_string(),
            description: description.to_string(),
            type_: type_.to_string(),
            rules: ValidationRule::default(),
        }
    }

    pub fn rules(mut self, rules: ValidationRule) -> Self {
        self.rules = rules;
        self
    }

    pub fn required(mut self) -> Self {
        self.rules.required = Some(true);
        self
    }

    fn accepts(&self, v: &Value) -> bool {
        match self.type_.as_str() {
            _ if v.is_null() => true,
            "string" => v.is_string(),
            "integer" => v.is_i64() || v.is_u64(),
            "number" => v.is_number(),
            "boolean" => v.is_boolean(),
            "object" => v.is_object(),
            "array" => v.is_array(),
            _ => true,
        }
    }
}

#[async_trait]
pub trait Action: Send + Sync {
    /// Tool name, e.g. `reset-password`.
    fn identifier(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Vec<ActionParameter>;

    /// Run with attributes that already passed parameter validation.
    async fn handle(&self, state: &AppState, attributes: Map<String, Value>) -> Result<ResultEnvelope, AppError>;
}

/// JSON schema of an action's parameters.
pub fn input_schema(action: &dyn Action) -> Value {
    let params = action.parameters();
    let properties: Map<String, Value> = params
        .iter()
        .map(|p| (p.name.clone(), json!({"type": p.type_, "description": p.description})))
        .collect();
    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.rules.required == Some(true))
        .map(|p| p.name.as_str())
        .collect();
    json!({"type": "object", "properties": properties, "required": required})
}

/// Validate `arguments` against the declared parameters, then run the action.
pub async fn run(action: &dyn Action, state: &AppState, arguments: &Value) -> ResultEnvelope {
    let result = async {
        let attributes = validate_arguments(action, arguments)?;
        action.handle(state, attributes).await
    }
    .await;
    match result {
        Ok(envelope) => {
            tracing::info!(action = %action.identifier(), success = envelope.success, "action finished");
            envelope
        }
        Err(e) => {
            tracing::warn!(action = %action.identifier(), code = e.code(), error = %e, "action failed");
            ResultEnvelope::error(format!("Unable to complete '{}': {}", action.name(), e))
        }
    }
}

fn validate_arguments(action: &dyn Action, arguments: &Value) -> Result<Map<String, Value>, AppError> {
    let attributes = match arguments {
        Value::Object(m) => m.clone(),
        Value::Null => Map::new(),
        _ => return Err(AppError::ValidationFailed(FieldErrors::single("arguments", "The arguments must be an object."))),
    };
    let params = action.parameters();

    let mut errors = FieldErrors::new();
    for p in &params {
        if let Some(v) = attributes.get(&p.name) {
            if !p.accepts(v) {
                errors.add(&p.name, format!("The {} field must be of type {}.", p.name, p.type_));
            }
        }
    }
    errors.into_result()?;

    let rules: HashMap<String, ValidationRule> = params.into_iter().map(|p| (p.name, p.rules)).collect();
    RequestValidator::validate(&attributes, &rules)?;
    Ok(attributes
        .into_iter()
        .filter(|(k, _)| rules.contains_key(k))
        .collect())
}
