//! Tool registry: the four generic CRUD tools plus registered business actions.

use crate::error::{AppError, ConfigError, FieldErrors, Operation};
use crate::mcp::actions::{self, Action};
use crate::query::QueryRequest;
use crate::response::ResultEnvelope;
use crate::service::CrudService;
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

pub const CREATE_TOOL: &str = "create-resource";
pub const READ_TOOL: &str = "read-resource";
pub const UPDATE_TOOL: &str = "update-resource";
pub const DELETE_TOOL: &str = "delete-resource";

/// Tool definition for `tools/list`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// `tools/call` result: the envelope as JSON text, flagged as an error when it failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl From<ResultEnvelope> for ToolResult {
    fn from(envelope: ResultEnvelope) -> Self {
        ToolResult {
            content: vec![ToolContent {
                content_type: "text".into(),
                text: envelope.to_value().to_string(),
            }],
            is_error: !envelope.success,
        }
    }
}

/// Protocol-level failures of `tools/call`; tool-level failures are error envelopes.
#[derive(Error, Debug)]
pub enum ToolCallError {
    #[error("missing tool name")]
    MissingName,
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

#[derive(Deserialize)]
struct CreateArgs {
    #[serde(default)]
    resource: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct UpdateArgs {
    #[serde(default)]
    resource: String,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct DeleteArgs {
    #[serde(default)]
    resource: String,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    force: bool,
}

pub struct ToolRegistry {
    crud: CrudService,
    actions: Vec<Arc<dyn Action>>,
}

impl ToolRegistry {
    pub fn new(state: AppState) -> Self {
        ToolRegistry {
            crud: CrudService::new(state),
            actions: Vec::new(),
        }
    }

    pub fn register_action(&mut self, action: Arc<dyn Action>) -> Result<(), ConfigError> {
        let id = action.identifier();
        let taken = [CREATE_TOOL, READ_TOOL, UPDATE_TOOL, DELETE_TOOL].contains(&id)
            || self.actions.iter().any(|a| a.identifier() == id);
        if taken {
            return Err(ConfigError::Validation(format!("duplicate tool name '{}'", id)));
        }
        for p in action.parameters() {
            let mut rules = p.rules;
            rules.compile().map_err(|e| {
                ConfigError::Validation(format!("tool '{}': invalid pattern for '{}': {}", id, p.name, e))
            })?;
        }
        tracing::debug!(tool = %id, "registering action");
        self.actions.push(action);
        Ok(())
    }

    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut tools = crud_tools();
        tools.extend(self.actions.iter().map(|a| ToolDefinition {
            name: a.identifier().to_string(),
            title: Some(a.name().to_string()),
            description: a.description().to_string(),
            input_schema: actions::input_schema(a.as_ref()),
        }));
        tools
    }

    pub async fn call_tool(&self, params: &Value) -> Result<ToolResult, ToolCallError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or(ToolCallError::MissingName)?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        tracing::debug!(tool = %name, "calling tool");

        let envelope = match name {
            CREATE_TOOL => self.create(arguments).await,
            READ_TOOL => self.read(arguments).await,
            UPDATE_TOOL => self.update(arguments).await,
            DELETE_TOOL => self.delete(arguments).await,
            other => {
                let action = self
                    .actions
                    .iter()
                    .find(|a| a.identifier() == other)
                    .ok_or_else(|| ToolCallError::UnknownTool(other.to_string()))?;
                actions::run(action.as_ref(), self.crud.state(), &arguments).await
            }
        };
        Ok(envelope.into())
    }

    async fn create(&self, arguments: Value) -> ResultEnvelope {
        let args: CreateArgs = match parse_args(arguments, Operation::Create) {
            Ok(a) => a,
            Err(envelope) => return envelope,
        };
        if let Err(envelope) = require_resource(&args.resource, Operation::Create) {
            return envelope;
        }
        self.crud.create(&args.resource, &args.payload).await
    }

    async fn read(&self, arguments: Value) -> ResultEnvelope {
        let request: QueryRequest = match parse_args(arguments, Operation::Read) {
            Ok(r) => r,
            Err(envelope) => return envelope,
        };
        if let Err(envelope) = require_resource(&request.resource, Operation::Read) {
            return envelope;
        }
        self.crud.read(&request).await
    }

    async fn update(&self, arguments: Value) -> ResultEnvelope {
        let args: UpdateArgs = match parse_args(arguments, Operation::Update) {
            Ok(a) => a,
            Err(envelope) => return envelope,
        };
        if let Err(envelope) = require_resource(&args.resource, Operation::Update).and_then(|_| require_id(&args.id, Operation::Update)) {
            return envelope;
        }
        self.crud.update(&args.resource, &args.id, &args.payload).await
    }

    async fn delete(&self, arguments: Value) -> ResultEnvelope {
        let args: DeleteArgs = match parse_args(arguments, Operation::Delete) {
            Ok(a) => a,
            Err(envelope) => return envelope,
        };
        if let Err(envelope) = require_resource(&args.resource, Operation::Delete).and_then(|_| require_id(&args.id, Operation::Delete)) {
            return envelope;
        }
        self.crud.delete(&args.resource, &args.id, args.force).await
    }
}

fn invalid(op: Operation, field: &str, message: String) -> ResultEnvelope {
    AppError::ValidationFailed(FieldErrors::single(field, message)).into_envelope(op)
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value, op: Operation) -> Result<T, ResultEnvelope> {
    serde_json::from_value(arguments).map_err(|e| invalid(op, "arguments", e.to_string()))
}

fn require_resource(resource: &str, op: Operation) -> Result<(), ResultEnvelope> {
    if resource.trim().is_empty() {
        return Err(invalid(op, "resource", "The resource field is required.".into()));
    }
    Ok(())
}

fn require_id(id: &Value, op: Operation) -> Result<(), ResultEnvelope> {
    match id {
        Value::String(s) if !s.trim().is_empty() => Ok(()),
        Value::Number(_) => Ok(()),
        _ => Err(invalid(op, "id", "The id field is required.".into())),
    }
}

fn crud_tools() -> Vec<ToolDefinition> {
    let resource = |verb: &str| {
        json!({
            "type": "string",
            "description": format!("The type of item you want to {} (e.g., \"users\", \"posts\", \"orders\")", verb)
        })
    };
    vec![
        ToolDefinition {
            name: CREATE_TOOL.into(),
            title: Some("Create Resource".into()),
            description: "Add a new item to your collection. Your data will be automatically checked for correctness before saving.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "resource": resource("add"),
                    "payload": {
                        "type": "object",
                        "description": "The information for your new item. Each field should have its corresponding value. Example: {\"name\": \"John Doe\", \"email\": \"john@example.com\"}"
                    }
                },
                "required": ["resource", "payload"]
            }),
        },
        ToolDefinition {
            name: READ_TOOL.into(),
            title: Some("Read Resource".into()),
            description: "Search and view your items with flexible filtering, sorting, and relationship options. Uses JSON:API conventions for querying. Specify what you want to find and how you want to see it.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "resource": resource("view"),
                    "filter": {
                        "type": "object",
                        "description": "Narrow down your results by specific criteria (JSON:API filter format). Example: {\"email\": \"john@example.com\", \"status\": \"active\"}",
                        "default": {}
                    },
                    "sort": {
                        "type": "string",
                        "description": "Order your results by specific fields (JSON:API sort format). Use \"-\" before a field name for newest-first. Example: \"-created_at,name\"",
                        "default": ""
                    },
                    "include": {
                        "type": "string",
                        "description": "Include related information in your results (JSON:API include format). Example: \"posts,posts.comments,profile\"",
                        "default": ""
                    },
                    "fields": {
                        "type": "object",
                        "description": "Choose which specific fields to show (JSON:API sparse fieldsets). Example: {\"users\": \"id,name,email\"}",
                        "default": {}
                    },
                    "page": {
                        "type": "object",
                        "description": "Split your results into pages for easier viewing (JSON:API pagination)",
                        "properties": {
                            "number": {
                                "type": "integer", "minimum": 1, "default": 1,
                                "description": "Which page of results to show (JSON:API page[number])"
                            },
                            "size": {
                                "type": "integer", "minimum": 1, "maximum": 100, "default": 15,
                                "description": "How many items to show per page (JSON:API page[size], maximum 100)"
                            }
                        },
                        "default": {"number": 1, "size": 15}
                    },
                    "append": {
                        "type": "string",
                        "description": "Add computed information to your results. Example: \"full_name,avatar_url\"",
                        "default": ""
                    }
                },
                "required": ["resource"]
            }),
        },
        ToolDefinition {
            name: UPDATE_TOOL.into(),
            title: Some("Update Resource".into()),
            description: "Modify an existing item in your collection. Your changes will be automatically checked for correctness before saving.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "resource": resource("modify"),
                    "id": {"type": "string", "description": "The unique identifier of the item you want to update"},
                    "payload": {
                        "type": "object",
                        "description": "The new information for this item. Only include the fields you want to change. Example: {\"name\": \"Jane Doe\", \"email\": \"jane@example.com\"}"
                    }
                },
                "required": ["resource", "id", "payload"]
            }),
        },
        ToolDefinition {
            name: DELETE_TOOL.into(),
            title: Some("Delete Resource".into()),
            description: "Remove an item from your collection. This action cannot be undone unless the item is archived (soft delete).".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "resource": resource("remove"),
                    "id": {"type": "string", "description": "The unique identifier of the item you want to remove"},
                    "force": {
                        "type": "boolean",
                        "description": "If true, permanently delete the item even if it was previously archived. Use with caution.",
                        "default": false
                    }
                },
                "required": ["resource", "id"]
            }),
        },
    ]
}
