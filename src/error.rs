//! Typed errors and their conversion into caller-facing error envelopes.

use crate::response::ResultEnvelope;
use crate::store::StoreError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} id '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: entity {entity_id} column {column}")]
    InvalidPrimaryKey { entity_id: String, column: String },
    #[error("unknown column: entity {entity_id} column {column}")]
    UnknownColumn { entity_id: String, column: String },
    #[error("duplicate uri key: {0}")]
    DuplicateUriKey(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Per-field validation messages, serialized as `{"field": ["message", ...]}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::ValidationFailed(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// The operation an error surfaced from; selects the wording of the envelope message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown resource: {resource}")]
    ResourceNotFound { resource: String, available: Vec<String> },
    #[error("record '{id}' not found in {resource}")]
    RecordNotFound { resource: String, id: String },
    #[error("validation failed: {0}")]
    ValidationFailed(FieldErrors),
    #[error("{0}")]
    InvalidFilter(String),
    #[error("{0}")]
    InvalidSort(String),
    #[error("{0}")]
    InvalidInclude(String),
    #[error("record '{id}' in {resource} is still referenced")]
    ConstraintViolation { resource: String, id: String },
    #[error("{resource}: {detail}")]
    UnsupportedOperation { resource: String, detail: Unsupported },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why an entity cannot serve an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unsupported {
    /// The entity declares no validation rules.
    Validation,
    /// The operation is not in the resource's allow-list.
    NotAllowed(Operation),
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unsupported::Validation => f.write_str("validation not supported"),
            Unsupported::NotAllowed(op) => write!(f, "{} not allowed", op),
        }
    }
}

impl AppError {
    /// Whether the error belongs to the invalid-query class (filter, sort, include).
    pub fn is_invalid_query(&self) -> bool {
        matches!(
            self,
            AppError::InvalidFilter(_) | AppError::InvalidSort(_) | AppError::InvalidInclude(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::ResourceNotFound { .. } | AppError::RecordNotFound { .. } => "not_found",
            AppError::ValidationFailed(_) => "validation_failed",
            AppError::InvalidFilter(_) | AppError::InvalidSort(_) | AppError::InvalidInclude(_) => "invalid_query",
            AppError::ConstraintViolation { .. } => "constraint_violation",
            AppError::UnsupportedOperation { .. } => "unsupported_operation",
            AppError::Store(_) => "store_failure",
        }
    }

    /// Caller-facing message for an error raised while serving `op`.
    pub fn message(&self, op: Operation) -> String {
        match self {
            AppError::ResourceNotFound { resource, available } => {
                let verb = match op {
                    Operation::Create => "add to",
                    Operation::Read => "access",
                    Operation::Update => "modify",
                    Operation::Delete => "remove from",
                };
                let suggestion = if available.is_empty() {
                    " No collections are currently configured.".to_string()
                } else {
                    format!(" Available collections: {}", available.join(", "))
                };
                format!(
                    "The collection '{}' you're trying to {} doesn't exist in the system.{}",
                    resource, verb, suggestion
                )
            }
            AppError::RecordNotFound { resource, id } => {
                format!("The item with ID '{}' could not be found in '{}'.", id, resource)
            }
            AppError::ValidationFailed(errors) => {
                let lead = match op {
                    Operation::Create => "Some required information is missing or incorrect",
                    Operation::Read => "The search criteria provided is invalid",
                    Operation::Update => "Some of the changes you made are invalid",
                    Operation::Delete => "The deletion request is invalid",
                };
                format!("{}: {}", lead, errors)
            }
            AppError::InvalidFilter(detail) => format!(
                "The filter you specified cannot be applied (JSON:API filter format required): {}",
                detail
            ),
            AppError::InvalidSort(detail) => format!(
                "The sorting option you chose is not available (JSON:API sort format required): {}",
                detail
            ),
            AppError::InvalidInclude(detail) => format!(
                "The related information you requested is not available (JSON:API include format required): {}",
                detail
            ),
            AppError::ConstraintViolation { resource, id } => format!(
                "Cannot remove the item with ID '{}' from '{}' because it's connected to other items in your system. Please remove the related items first.",
                id, resource
            ),
            AppError::UnsupportedOperation { resource, detail } => match detail {
                Unsupported::Validation => format!(
                    "The collection '{}' doesn't support automatic data validation. Please contact your system administrator.",
                    resource
                ),
                Unsupported::NotAllowed(op) => {
                    format!("The collection '{}' does not allow {} operations.", resource, op)
                }
            },
            AppError::Store(e) => {
                let lead = match op {
                    Operation::Create => "Unable to add your item",
                    Operation::Read => "Unable to retrieve your items",
                    Operation::Update => "Unable to update your item",
                    Operation::Delete => "A system error occurred while removing this item",
                };
                format!("{}: {}", lead, e)
            }
            AppError::Config(e) => format!("The system is not properly configured: {}", e),
        }
    }

    pub fn into_envelope(self, op: Operation) -> ResultEnvelope {
        ResultEnvelope::error(self.message(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_render_as_json() {
        let mut errors = FieldErrors::new();
        errors.add("email", "email is required");
        errors.add("email", "email must be a valid email");
        assert_eq!(
            errors.to_string(),
            r#"{"email":["email is required","email must be a valid email"]}"#
        );
    }

    #[test]
    fn test_resource_not_found_names_alternatives() {
        let e = AppError::ResourceNotFound {
            resource: "orders".into(),
            available: vec!["users".into(), "posts".into()],
        };
        let msg = e.message(Operation::Delete);
        assert!(msg.contains("trying to remove from"));
        assert!(msg.ends_with("Available collections: users, posts"));
    }

    #[test]
    fn test_resource_not_found_without_resources() {
        let e = AppError::ResourceNotFound { resource: "orders".into(), available: vec![] };
        assert!(e.message(Operation::Read).ends_with("No collections are currently configured."));
    }

    #[test]
    fn test_constraint_violation_guides_caller() {
        let e = AppError::ConstraintViolation { resource: "users".into(), id: "1".into() };
        assert_eq!(e.code(), "constraint_violation");
        assert!(e.message(Operation::Delete).contains("Please remove the related items first."));
    }

    #[test]
    fn test_store_failure_surfaces_raw_text() {
        let e = AppError::Store(StoreError::other("connection refused"));
        assert_eq!(e.message(Operation::Read), "Unable to retrieve your items: connection refused");
    }
}
