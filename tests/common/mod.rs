#![allow(dead_code)]

use platform_mcp::{resolve, AppState, CrudService, DocumentStore, FullConfig, McpServer, MemoryStore, ResultEnvelope};
use serde_json::{json, Value};

pub fn config() -> FullConfig {
    serde_json::from_value(json!({
        "server": {"name": "Test Platform", "version": "0.0.1", "instructions": "Read domain://dbml first."},
        "entities": [
            {
                "id": "user", "table": "users",
                "columns": [
                    {"name": "id", "type": "bigserial"},
                    {"name": "name", "type": "text", "nullable": false},
                    {"name": "email", "type": "text", "nullable": false},
                    {"name": "status", "type": "text", "default": "active"},
                    {"name": "password", "type": "text"}
                ],
                "soft_deletes": true,
                "filterable": ["id", "email", "status", {"name": "name", "match": "partial"}],
                "sortable": ["id", "name", "created_at"],
                "scopes": [{"name": "active", "column": "status", "op": "eq", "value": "active"}],
                "appends": [{"name": "display_name", "template": "{name} <{email}>"}],
                "relations": [{"name": "posts", "resource": "posts", "kind": "has_many", "foreign_key": "user_id"}],
                "validation": {
                    "name": {"required": true, "max_length": 50},
                    "email": {"required": true, "format": "email"},
                    "status": {"allowed": ["active", "inactive"]}
                }
            },
            {
                "id": "post", "table": "posts",
                "columns": [
                    {"name": "id", "type": "bigserial"},
                    {"name": "user_id", "type": "bigint", "nullable": false},
                    {"name": "title", "type": "text", "nullable": false}
                ],
                "relations": [
                    {"name": "author", "resource": "users", "kind": "belongs_to", "foreign_key": "user_id"},
                    {"name": "comments", "resource": "comments", "kind": "has_many", "foreign_key": "post_id"}
                ],
                "validation": {"user_id": {"required": true}, "title": {"required": true}}
            },
            {
                "id": "comment", "table": "comments",
                "columns": [
                    {"name": "id", "type": "bigserial"},
                    {"name": "post_id", "type": "bigint", "nullable": false},
                    {"name": "body", "type": "text", "nullable": false}
                ],
                "relations": [{"name": "post", "resource": "posts", "kind": "belongs_to", "foreign_key": "post_id"}],
                "validation": {"post_id": {"required": true}, "body": {"required": true}}
            },
            {
                "id": "tag", "table": "tags",
                "columns": [{"name": "id", "type": "bigserial"}, {"name": "label", "type": "text"}]
            },
            {
                "id": "audit", "table": "audits",
                "columns": [{"name": "id", "type": "uuid"}, {"name": "event", "type": "text"}],
                "timestamps": false,
                "validation": {}
            }
        ],
        "resources": [
            {"uri_key": "users", "entity_id": "user", "hidden": ["password"]},
            {"uri_key": "posts", "entity_id": "post"},
            {"uri_key": "comments", "entity_id": "comment"},
            {"uri_key": "tags", "entity_id": "tag"},
            {"uri_key": "audits", "entity_id": "audit", "operations": ["read"]}
        ],
        "documents": [
            {"uri": "domain://dbml", "name": "Domain DBML", "source": {"text": "Table users {\n  id bigserial [pk]\n}"}}
        ]
    }))
    .expect("test config parses")
}

pub fn state() -> AppState {
    let registry = resolve(&config()).expect("test config resolves");
    AppState::new(registry, MemoryStore::new())
}

pub fn service() -> CrudService {
    CrudService::new(state())
}

pub fn server() -> McpServer {
    let config = config();
    let documents = DocumentStore::new(config.documents.clone(), ".");
    McpServer::new(state(), &config.server, documents)
}

/// Create a user and return its id.
pub async fn create_user(crud: &CrudService, name: &str, email: &str) -> Value {
    let out = crud.create("users", &json!({"name": name, "email": email, "password": "hunter22"})).await;
    assert!(out.success, "create failed: {:?}", out.error);
    out.meta("id").cloned().expect("id in metadata")
}

pub fn error_text(envelope: &ResultEnvelope) -> &str {
    assert!(!envelope.success, "expected failure, got {:?}", envelope);
    envelope.error.as_deref().unwrap_or_default()
}
