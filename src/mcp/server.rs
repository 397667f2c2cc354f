//! MCP server: newline-delimited JSON-RPC 2.0.

use crate::config::ServerConfig;
use crate::error::ConfigError;
use crate::mcp::actions::Action;
use crate::mcp::documents::{DocumentError, DocumentStore};
use crate::mcp::tools::ToolRegistry;
use crate::mcp::{ServerInfo, MCP_VERSION};
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
const RESOURCE_NOT_FOUND: i32 = -32002;

/// MCP JSON-RPC message
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcMessage {
    fn result(id: Option<Value>, result: Value) -> Self {
        JsonRpcMessage {
            jsonrpc: "2.0".into(),
            id,
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: &str, data: Option<Value>) -> Self {
        JsonRpcMessage {
            jsonrpc: "2.0".into(),
            id,
            method: None,
            params: None,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
                data,
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub struct McpServer {
    tools: ToolRegistry,
    documents: DocumentStore,
    server_info: ServerInfo,
    instructions: Option<String>,
}

impl McpServer {
    pub fn new(state: AppState, server: &ServerConfig, documents: DocumentStore) -> Self {
        McpServer {
            tools: ToolRegistry::new(state),
            documents,
            server_info: ServerInfo::from(server),
            instructions: server.instructions.clone(),
        }
    }

    pub fn register_action(&mut self, action: Arc<dyn Action>) -> Result<(), ConfigError> {
        self.tools.register_action(action)
    }

    pub async fn run_stdio(&self) -> std::io::Result<()> {
        self.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
    }

    /// Serve one message per line until EOF.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(name = %self.server_info.name, version = %self.server_info.version, "serving MCP on stdio");
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                tracing::debug!("EOF reached, shutting down");
                return Ok(());
            }
            let Some(response) = self.handle_message(&line).await else { continue };
            let out = serde_json::to_string(&response)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writer.write_all(out.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    /// Handle one raw message. `None` for blank lines, notifications and responses.
    pub async fn handle_message(&self, line: &str) -> Option<JsonRpcMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let message: JsonRpcMessage = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable message");
                return Some(JsonRpcMessage::error(
                    Some(Value::Null),
                    PARSE_ERROR,
                    "Parse error",
                    Some(json!({"details": e.to_string()})),
                ));
            }
        };
        let Some(method) = message.method.as_deref() else {
            tracing::debug!("ignoring response message");
            return None;
        };
        if message.id.is_none() {
            tracing::debug!(method = %method, "notification");
            return None;
        }
        let id = message.id.clone();
        let params = message.params.clone().unwrap_or_else(|| json!({}));

        let response = match method {
            "initialize" => JsonRpcMessage::result(id, self.initialize()),
            "ping" => JsonRpcMessage::result(id, json!({})),
            "tools/list" => JsonRpcMessage::result(id, json!({"tools": self.tools.list_tools()})),
            "tools/call" => match self.tools.call_tool(&params).await {
                Ok(result) => JsonRpcMessage::result(id, json!(result)),
                Err(e) => {
                    tracing::warn!(error = %e, "tool call rejected");
                    JsonRpcMessage::error(id, INVALID_PARAMS, "Invalid params", Some(json!({"details": e.to_string()})))
                }
            },
            "resources/list" => JsonRpcMessage::result(id, json!({"resources": self.documents.list()})),
            "resources/read" => self.read_resource(id, &params).await,
            other => {
                tracing::warn!(method = %other, "unknown method");
                JsonRpcMessage::error(id, METHOD_NOT_FOUND, "Method not found", None)
            }
        };
        Some(response)
    }

    fn initialize(&self) -> Value {
        let mut capabilities = json!({"tools": {}});
        if !self.documents.is_empty() {
            capabilities["resources"] = json!({});
        }
        let mut result = json!({
            "protocolVersion": MCP_VERSION,
            "capabilities": capabilities,
            "serverInfo": self.server_info,
        });
        if let Some(instructions) = &self.instructions {
            result["instructions"] = json!(instructions);
        }
        result
    }

    async fn read_resource(&self, id: Option<Value>, params: &Value) -> JsonRpcMessage {
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return JsonRpcMessage::error(id, INVALID_PARAMS, "Invalid params", Some(json!({"details": "missing uri"})));
        };
        match self.documents.read(uri).await {
            Ok(body) => JsonRpcMessage::result(id, body),
            Err(e @ DocumentError::NotFound(_)) => {
                JsonRpcMessage::error(id, RESOURCE_NOT_FOUND, "Resource not found", Some(json!({"uri": uri, "details": e.to_string()})))
            }
            Err(e) => {
                tracing::error!(uri = %uri, error = %e, "document read failed");
                JsonRpcMessage::error(id, INTERNAL_ERROR, "Internal error", Some(json!({"details": e.to_string()})))
            }
        }
    }
}
